mod commands;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use commands::Command;
use logpane_logs::{Config, IngestionHandle, IngestionLoop, LogReader, ViewVersion, format_line, spawn};
use logpane_transport::LineTransport;
use logpane_types::Severity;

/// Logpane - follow a log stream through a bounded, filtered view
#[derive(Parser, Debug)]
#[command(name = "logpane")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (CLI flags override its values)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// File to read records from ("-" or absent reads stdin)
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Maximum number of records kept
    #[arg(long)]
    capacity: Option<usize>,

    /// Only show records containing this pattern
    #[arg(long)]
    include: Option<String>,

    /// Hide records containing this pattern
    #[arg(long)]
    exclude: Option<String>,

    /// Treat include/exclude as regular expressions
    #[arg(long)]
    regex: bool,

    /// Topic to follow
    #[arg(long)]
    topic: Option<String>,

    /// Ingestion tick period in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Quiet time after a filter edit before the view is rebuilt
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Start with ingestion disabled
    #[arg(long)]
    paused: bool,

    /// Read control commands from stdin (needs --input)
    #[arg(long)]
    commands: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run_app(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

/// File config with CLI overrides applied
fn build_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(capacity) = args.capacity {
        config.capacity = capacity;
    }
    if let Some(include) = &args.include {
        config.include = include.clone();
    }
    if let Some(exclude) = &args.exclude {
        config.exclude = exclude.clone();
    }
    if args.regex {
        config.use_regex = true;
    }
    if let Some(topic) = &args.topic {
        config.topic = topic.clone();
    }
    if let Some(tick_ms) = args.tick_ms {
        config.tick_ms = tick_ms;
    }
    if let Some(debounce_ms) = args.debounce_ms {
        config.debounce_ms = debounce_ms;
    }
    if args.paused {
        config.enabled = false;
    }

    config.validate().context("invalid settings")?;
    Ok(config)
}

async fn run_app(args: Args) -> Result<()> {
    let config = build_config(&args)?;

    let input = args.input.clone().filter(|path| path.as_os_str() != "-");
    if args.commands && input.is_none() {
        anyhow::bail!("--commands reads stdin, so records must come from --input");
    }

    // Subscribe before the reader starts so no line is missed
    let transport = Arc::new(LineTransport::new(config.topic.clone()));
    let ingestion =
        IngestionLoop::new(transport.clone(), &config).context("failed to start ingestion")?;
    let handle = spawn(ingestion, config.tick_period());

    match &input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            transport.start(file);
        }
        None => transport.start(tokio::io::stdin()),
    }

    let mut printer = Printer::new(handle.reader().clone());
    let mut changes = handle.changes();
    let mut commands = args
        .commands
        .then(|| BufReader::new(tokio::io::stdin()).lines());
    let mut poll = tokio::time::interval(config.tick_period());
    // Ticks left before exiting once the input has ended
    let mut drain_ticks: Option<u8> = None;

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let version = *changes.borrow_and_update();
                printer.update(version)?;
            }

            line = next_command(&mut commands) => {
                let Some(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => handle_command(&handle, command),
                    Err(e) => eprintln!("{:#}", e),
                }
            }

            _ = poll.tick() => {
                if args.commands || !transport.is_finished() {
                    continue;
                }
                match drain_ticks {
                    None => drain_ticks = Some(2),
                    Some(0) => break,
                    Some(n) => drain_ticks = Some(n - 1),
                }
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    printer.update(*changes.borrow())?;
    tracing::debug!(lines = transport.lines_read(), "input closed");

    transport.stop();
    handle.shutdown().await;

    Ok(())
}

/// Next line from the command input; never resolves without one
async fn next_command(commands: &mut Option<Lines<BufReader<Stdin>>>) -> Option<String> {
    let Some(lines) = commands else {
        return std::future::pending().await;
    };
    match lines.next_line().await {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read command");
            None
        }
    }
}

fn handle_command(handle: &IngestionHandle, command: Command) {
    let filter = handle.filter();
    let result = match command {
        Command::Include(text) => {
            let status = filter.set_include(&text);
            if !status.include_valid {
                eprintln!("include pattern is invalid, nothing will match");
            }
            Ok(())
        }
        Command::Exclude(text) => {
            let status = filter.set_exclude(&text);
            if !status.exclude_valid {
                eprintln!("exclude pattern is invalid, nothing will be excluded");
            }
            Ok(())
        }
        Command::Regex(on) => {
            filter.set_use_regex(on);
            Ok(())
        }
        Command::Capacity(capacity) => handle.set_capacity(capacity),
        Command::Topic(topic) => handle.set_topic(&topic),
        Command::Clear => handle.clear(),
        Command::Pause => handle.disable(),
        Command::Resume => handle.enable(),
        Command::Toggle => handle.toggle_pause().map(|enabled| {
            eprintln!("{}", if enabled { "resumed" } else { "paused" });
        }),
        Command::Status => {
            print_status(handle);
            Ok(())
        }
        Command::Quit => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("{:#}", e);
    }
}

fn print_status(handle: &IngestionHandle) {
    let reader = handle.reader();
    let filter = handle.filter().snapshot();
    let counts = reader.severity_counts();

    let by_severity: Vec<String> = Severity::ALL
        .iter()
        .map(|severity| format!("{}={}", severity.as_str(), counts.get(*severity)))
        .collect();

    eprintln!(
        "shown {} of {} (capacity {}) | {}",
        reader.len(),
        reader.stored_len(),
        reader.capacity(),
        by_severity.join(" ")
    );
    eprintln!(
        "include '{}'{} | exclude '{}'{} | regex {}",
        filter.include_pattern(),
        filter.include_error().map(|e| format!(" ({})", e)).unwrap_or_default(),
        filter.exclude_pattern(),
        filter.exclude_error().map(|e| format!(" ({})", e)).unwrap_or_default(),
        if filter.use_regex() { "on" } else { "off" },
    );
}

/// Prints records as they become visible. A rebuild reprints the whole view.
struct Printer {
    reader: LogReader,
    last_printed: Option<u64>,
    rebuilds: u64,
}

impl Printer {
    fn new(reader: LogReader) -> Self {
        Self {
            reader,
            last_printed: None,
            rebuilds: 0,
        }
    }

    fn update(&mut self, version: ViewVersion) -> std::io::Result<()> {
        if version.rebuilds != self.rebuilds {
            self.rebuilds = version.rebuilds;
            self.last_printed = None;
            eprintln!("-- filter applied, {} records shown", self.reader.len());
        }

        let records = self.reader.newer_than(self.last_printed);
        if records.is_empty() {
            return Ok(());
        }

        let mut out = std::io::stdout().lock();
        for record in &records {
            writeln!(out, "{}", format_line(record))?;
        }
        out.flush()?;

        self.last_printed = records.last().map(|r| r.id);
        Ok(())
    }
}
