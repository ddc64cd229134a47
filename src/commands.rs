//! Control commands typed on stdin while following a file

use anyhow::{Result, anyhow, bail};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Include(String),
    Exclude(String),
    Regex(bool),
    Capacity(usize),
    Topic(String),
    Clear,
    Pause,
    Resume,
    Toggle,
    Status,
    Quit,
}

impl Command {
    /// Parse one command line. Patterns keep everything after the first
    /// space, so `include` alone clears the include pattern.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (word, rest) = match line.trim_start().split_once(' ') {
            Some((word, rest)) => (word, rest),
            None => (line.trim(), ""),
        };

        let command = match word {
            "include" | "i" => Command::Include(rest.to_string()),
            "exclude" | "e" => Command::Exclude(rest.to_string()),
            "regex" => match rest.trim() {
                "on" | "true" | "1" => Command::Regex(true),
                "off" | "false" | "0" => Command::Regex(false),
                other => bail!("regex expects on|off, got '{}'", other),
            },
            "capacity" => {
                let value = rest.trim();
                let capacity = value
                    .parse()
                    .map_err(|_| anyhow!("capacity expects a number, got '{}'", value))?;
                Command::Capacity(capacity)
            }
            "topic" => Command::Topic(rest.trim().to_string()),
            "clear" => Command::Clear,
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "toggle" => Command::Toggle,
            "status" => Command::Status,
            "quit" | "q" | "exit" => Command::Quit,
            "" => bail!("empty command"),
            other => bail!("unknown command '{}'", other),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_keep_inner_spaces() {
        assert_eq!(
            Command::parse("include motor fault").unwrap(),
            Command::Include("motor fault".to_string())
        );
        assert_eq!(Command::parse("include").unwrap(), Command::Include(String::new()));
        assert_eq!(
            Command::parse("e heartbeat\n").unwrap(),
            Command::Exclude("heartbeat".to_string())
        );
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(Command::parse("regex on").unwrap(), Command::Regex(true));
        assert_eq!(Command::parse("regex off").unwrap(), Command::Regex(false));
        assert_eq!(Command::parse("capacity 25").unwrap(), Command::Capacity(25));
        assert_eq!(Command::parse("capacity 0").unwrap(), Command::Capacity(0));
        assert_eq!(
            Command::parse("topic /diag").unwrap(),
            Command::Topic("/diag".to_string())
        );
        assert_eq!(Command::parse("  quit  ").unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("").is_err());
        assert!(Command::parse("regex maybe").is_err());
        assert!(Command::parse("capacity lots").is_err());
        assert!(Command::parse("frobnicate").is_err());
    }
}
