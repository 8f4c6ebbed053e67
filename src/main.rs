//! CLI entry point for `imapindexer`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};

use imapindexer::config::{self, Config};
use imapindexer::mail::imap::ImapConnector;
use imapindexer::pipeline::{Pipeline, PipelineSettings, RunReport, WorkerOutcome};
use imapindexer::progress::{NoopProgress, ProgressSink, TerminalProgress};
use imapindexer::search::ZincClient;

/// Read all the mailboxes of an IMAP account and index the messages on a ZincSearch instance.
#[derive(Parser)]
#[command(name = "imapindexer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: $IMAPINDEXER_CONFIG or ~/.config/imapindexer/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(flatten)]
    run: RunArgs,
}

/// Overrides for values from the config file.
#[derive(clap::Args, Default)]
struct RunArgs {
    /// IMAP server address (host[:port])
    #[arg(long)]
    imap_address: Option<String>,
    /// IMAP username
    #[arg(long)]
    imap_username: Option<String>,
    /// IMAP password
    #[arg(long, env = "IMAPINDEXER_IMAP_PASSWORD", hide_env_values = true)]
    imap_password: Option<String>,
    /// IMAP mailbox pattern
    #[arg(long)]
    mailbox: Option<String>,
    /// Hash subject and body of every message
    #[arg(long)]
    use_hash: bool,
    /// ZincSearch server address
    #[arg(long)]
    zinc_address: Option<String>,
    /// ZincSearch username
    #[arg(long)]
    zinc_username: Option<String>,
    /// ZincSearch password
    #[arg(long, env = "IMAPINDEXER_ZINC_PASSWORD", hide_env_values = true)]
    zinc_password: Option<String>,
    /// ZincSearch index name
    #[arg(long)]
    zinc_index: Option<String>,
    /// Number of IMAP workers to use
    #[arg(long)]
    workers: Option<usize>,
    /// Size of buffer for the message queue
    #[arg(long)]
    buffer: Option<usize>,
    /// Number of messages to send to ZincSearch in a single batch
    #[arg(long)]
    batch: Option<usize>,
    /// Show progress bars instead of logging to the terminal
    #[arg(long)]
    progress: bool,
    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index all matching mailboxes (default)
    Run,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(shell),
        Some(Commands::Manpage) => return cmd_manpage(),
        Some(Commands::Init { force }) => return cmd_init(cli.config.as_deref(), force),
        Some(Commands::Run) | None => {}
    }

    let mut config = config::load_config(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli.run);

    let log_level = match (cli.debug, cli.verbose) {
        (true, _) => "debug",
        (false, 0) => config.general.log_level.as_str(),
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    cmd_run(&config, cli.run.json)
}

fn apply_overrides(config: &mut Config, args: &RunArgs) {
    let set = |slot: &mut String, value: &Option<String>| {
        if let Some(v) = value {
            *slot = v.clone();
        }
    };
    set(&mut config.imap.address, &args.imap_address);
    set(&mut config.imap.username, &args.imap_username);
    set(&mut config.imap.password, &args.imap_password);
    set(&mut config.imap.mailbox, &args.mailbox);
    set(&mut config.zinc.address, &args.zinc_address);
    set(&mut config.zinc.username, &args.zinc_username);
    set(&mut config.zinc.password, &args.zinc_password);
    set(&mut config.zinc.index, &args.zinc_index);

    if args.use_hash {
        config.imap.use_hash = true;
    }
    if args.progress {
        config.general.progress = true;
    }
    if let Some(n) = args.workers {
        config.indexer.workers = n;
    }
    if let Some(n) = args.buffer {
        config.indexer.buffer = n;
    }
    if let Some(n) = args.batch {
        config.indexer.batch = n;
    }
}

/// Set up tracing with stderr output and optional file logging.
///
/// With progress bars on, stderr belongs to the bars and only the file
/// layer is installed.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = (!config.general.progress)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    let log_dir = config::log_dir(config);
    let file_layer = std::fs::create_dir_all(&log_dir).is_ok().then(|| {
        let file_appender = tracing_appender::rolling::never(&log_dir, "imapindexer.log");
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

/// Run the pipeline and print the summary.
fn cmd_run(config: &Config, json: bool) -> anyhow::Result<()> {
    config.validate()?;
    tracing::info!(
        workers = config.indexer.workers,
        buffer = config.indexer.buffer,
        batch = config.indexer.batch,
        "Starting imapindexer"
    );

    let connector = ImapConnector::new(&config.imap)?;
    let backend = ZincClient::new(&config.zinc).context("cannot build ZincSearch client")?;
    if let Err(e) = backend.healthcheck() {
        tracing::warn!(address = backend.base_url(), error = %e, "ZincSearch health check failed");
    }

    let progress: Box<dyn ProgressSink> = if config.general.progress {
        Box::new(TerminalProgress::new())
    } else {
        Box::new(NoopProgress)
    };

    let start = Instant::now();
    let report = Pipeline::new(
        &connector,
        &backend,
        progress.as_ref(),
        PipelineSettings::from_config(config),
    )
    .run()
    .context("indexing run failed")?;
    let elapsed = start.elapsed();

    if json {
        print_report_json(&report, elapsed)?;
    } else {
        print_report_table(&report, elapsed);
    }
    Ok(())
}

/// Write the default configuration.
fn cmd_init(explicit: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => config::config_file_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?,
    };
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    config::save_config(&Config::default(), &path)?;
    println!("  Wrote {}", path.display());
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "imapindexer", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Print the run summary in a human-readable table.
fn print_report_table(report: &RunReport, elapsed: std::time::Duration) {
    use humansize::{format_size, BINARY};

    let index = &report.index;
    println!();
    println!("  {:<20} {}", "Mailboxes", report.mailboxes.len());
    println!("  {:<20} {}", "Waves", report.waves);
    println!("  {:<20} {}", "Messages fetched", report.emitted());
    println!("  {:<20} {}", "Body data", format_size(report.body_bytes(), BINARY));
    println!(
        "  {:<20} {} ({} failed)",
        "Bulk requests", index.batches, index.failed_batches
    );
    println!("  {:<20} {}", "Documents indexed", index.accepted);
    if index.dropped > 0 {
        println!("  {:<20} {}", "Not convertible", index.dropped);
    }
    if index.lost > 0 {
        println!("  {:<20} {}", "Lost in failed bulk", index.lost);
    }
    println!("  {:<20} {:.2?}", "Elapsed", elapsed);

    let problems: Vec<_> = report
        .workers
        .iter()
        .filter(|w| w.outcome != WorkerOutcome::Completed || w.body_failures > 0)
        .collect();
    if !problems.is_empty() {
        println!();
        println!("  Incomplete mailboxes:");
        for w in problems {
            let why = match &w.outcome {
                WorkerOutcome::Abandoned(reason) => reason.as_str(),
                WorkerOutcome::QueueClosed => "indexer stopped",
                WorkerOutcome::Completed => "body read failures",
            };
            println!(
                "    {:<30} {:>6}/{:<6} {}",
                w.mailbox, w.emitted, w.expected, why
            );
        }
    }
    for name in &report.not_started {
        println!("    {name:<30} not started");
    }
    println!();
}

/// Print the run summary as JSON.
fn print_report_json(report: &RunReport, elapsed: std::time::Duration) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "elapsed_ms": elapsed.as_millis(),
        "emitted": report.emitted(),
        "body_bytes": report.body_bytes(),
        "report": report,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
