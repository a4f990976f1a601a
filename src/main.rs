//! wbcrawl - incremental Weibo post-feed harvester CLI
//!
//! Main entry point for the wbcrawl command-line tool.

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use tracing::{debug, info};

use wbcrawl::cli::{self, Cli, Commands, OutputFormat};
use wbcrawl::date_parser::{parse_since, since_from_days};
use wbcrawl::logging::init_cli_logging;
use wbcrawl::model::Account;
use wbcrawl::shutdown::install_signal_handler;
use wbcrawl::sink::{JsonLinesSink, JsonSink, TextSink};
use wbcrawl::walker::{no_cutoff, offset_clock};
use wbcrawl::*;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());

    if !config.output.colors {
        colored::control::set_override(false);
    }
    init_cli_logging(
        cli.quiet || config.output.quiet,
        cli.verbose,
        config.output.colors,
    );

    let result = match &cli.command {
        Commands::Crawl(args) => cmd_crawl(&cli, &config, args).await,
        Commands::Profile(args) => cmd_profile(&cli, &config, args).await,
        Commands::Config(args) => cmd_config(&cli, config, args),
        Commands::Completions(args) => cmd_completions(args),
    };

    if let Err(err) = result {
        report_error(&err);
        std::process::exit(exit_code(&err));
    }
}

/// Exit status for a failed command: 2 when the user can fix the input, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CrawlError>() {
        Some(e) if e.is_recoverable() => 2,
        _ => 1,
    }
}

fn report_error(err: &anyhow::Error) {
    eprintln!("{} {err:#}", "Error:".red().bold());
    if let Some(hint) = err
        .downcast_ref::<CrawlError>()
        .and_then(CrawlError::suggestion)
    {
        eprintln!("  {} {hint}", "Hint:".yellow());
    }
}

fn output_format(cli: &Cli, config: &Config) -> OutputFormat {
    cli.format.unwrap_or_else(|| {
        OutputFormat::from_config(&config.output.format).unwrap_or_else(|| {
            debug!(format = %config.output.format, "Unknown output.format, using text");
            OutputFormat::Text
        })
    })
}

fn open_output(path: Option<&std::path::Path>) -> Result<Box<dyn Write + Send>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout())),
    }
}

fn build_sink(format: OutputFormat, out: Box<dyn Write + Send>) -> Box<dyn RecordSink> {
    match format {
        OutputFormat::Text => Box::new(TextSink::new(out)),
        OutputFormat::Json => Box::new(JsonSink::new(out, false)),
        OutputFormat::JsonPretty => Box::new(JsonSink::new(out, true)),
        OutputFormat::Jsonl => Box::new(JsonLinesSink::new(out)),
    }
}

/// Wraps a sink and drives a page progress bar on stderr.
struct ProgressSink {
    inner: Box<dyn RecordSink>,
    bar: ProgressBar,
}

impl ProgressSink {
    fn new(inner: Box<dyn RecordSink>) -> Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} page {pos}/{len} {msg}")?
                .progress_chars("##-"),
        );
        Ok(Self { inner, bar })
    }
}

impl RecordSink for ProgressSink {
    fn account(&mut self, account: &Account) -> wbcrawl::Result<()> {
        self.bar.suspend(|| self.inner.account(account))
    }

    fn record(&mut self, record: &PostRecord) -> wbcrawl::Result<()> {
        self.bar.set_message(record.created_at.clone());
        self.bar.suspend(|| self.inner.record(record))
    }

    fn page_done(&mut self, page: u64, page_count: u64) {
        self.bar.set_length(page_count);
        self.bar.set_position(page);
        self.inner.page_done(page, page_count);
    }

    fn finish(&mut self, report: &CrawlReport) -> wbcrawl::Result<()> {
        self.bar.finish_and_clear();
        self.inner.finish(report)
    }
}

async fn cmd_crawl(cli: &Cli, config: &Config, args: &cli::CrawlArgs) -> Result<()> {
    let today = offset_clock(config.crawl.utc_offset_hours)().date();
    let since = match (&args.since, config.crawl.since_days) {
        (Some(expr), _) => parse_since(expr, today)?,
        (None, Some(days)) => since_from_days(days, today),
        (None, None) => no_cutoff(),
    };

    let mut throttle = config.throttle.clone();
    if args.no_throttle {
        throttle.enabled = false;
    }
    let options = WalkOptions {
        since,
        posts_per_page: config.crawl.posts_per_page,
        on_page_error: args.on_page_error.unwrap_or(config.crawl.on_page_error),
        throttle,
        utc_offset_hours: config.crawl.utc_offset_hours,
    };
    info!(
        account = %args.account_id,
        %since,
        on_page_error = %options.on_page_error,
        throttle = options.throttle.enabled,
        "Crawl requested"
    );

    let client = WeiboClient::new(&config.http)?;
    let walker = Walker::new(client, options).with_cancellation(install_signal_handler());

    let format = output_format(cli, config);
    let sink = build_sink(format, open_output(args.output.as_deref())?);
    let show_progress = !(cli.quiet || config.output.quiet || args.no_progress);
    let mut sink: Box<dyn RecordSink> = if show_progress {
        Box::new(ProgressSink::new(sink)?)
    } else {
        sink
    };

    let report = walker.run(&args.account_id, sink.as_mut()).await?;

    if let Some(path) = &args.output {
        if !cli.quiet {
            eprintln!(
                "{} Wrote {} posts to {}",
                "✓".green(),
                format_number_usize(report.state.accepted),
                path.display()
            );
        }
    }
    if let StopReason::Aborted { page, reason } = &report.stop {
        bail!("Crawl aborted at page {page}: {reason}");
    }
    Ok(())
}

async fn cmd_profile(cli: &Cli, config: &Config, args: &cli::ProfileArgs) -> Result<()> {
    let client = WeiboClient::new(&config.http)?;
    let account = profile(&client, &args.account_id).await?;
    let pages = page_count(account.statuses_count, config.crawl.posts_per_page);

    match output_format(cli, config) {
        OutputFormat::Text => {
            println!("{}", "Account".bold().cyan());
            println!("{}", "─".repeat(40));
            println!("  {:<12} {:>14}", "ID:", account.id);
            println!(
                "  {:<12} {:>14}",
                "Posts:",
                format_number_u64(account.statuses_count)
            );
            println!(
                "  {:<12} {:>14}",
                "Followers:",
                format_number_u64(account.followers_count)
            );
            println!("  {:<12} {:>14}", "Pages:", format_number_u64(pages));
        }
        OutputFormat::Json | OutputFormat::Jsonl => {
            println!("{}", serde_json::to_string(&account)?);
        }
        OutputFormat::JsonPretty => {
            println!("{}", serde_json::to_string_pretty(&account)?);
        }
    }
    Ok(())
}

fn cmd_config(cli: &Cli, config: Config, args: &cli::ConfigArgs) -> Result<()> {
    if args.init {
        let path = cli
            .config
            .clone()
            .or_else(Config::user_config_path)
            .context("Could not determine config directory")?;
        if path.exists() {
            bail!("Config file already exists: {}", path.display());
        }
        let saved = Config::init_file(Some(&path))?;
        println!("{} Wrote {}", "✓".green(), saved.display());
        return Ok(());
    }

    if let Some(assignment) = &args.set {
        let (key, value) = assignment
            .split_once('=')
            .context("Expected key=value, e.g. throttle.enabled=false")?;
        let key = key.trim();
        if !VALID_CONFIG_KEYS.contains(&key) {
            bail!(
                "{}",
                format_unknown_value_error("config key", key, VALID_CONFIG_KEYS)
            );
        }
        // Only the file's own settings are written back, not env overrides.
        let path = cli
            .config
            .clone()
            .or_else(Config::user_config_path)
            .context("Could not determine config directory")?;
        let mut file_config = Config::load_from_file(&path).unwrap_or_default();
        file_config.set(key, value.trim())?;
        let saved = file_config.save(Some(&path))?;
        println!("{} Set {key} in {}", "✓".green(), saved.display());
        return Ok(());
    }

    // --show is the default action
    let path = cli.config.clone().or_else(Config::user_config_path);
    println!("{}", "Current Configuration".bold().cyan());
    if let Some(path) = path {
        let state = if path.exists() { "" } else { " (not present)" };
        println!("  {} {}{state}", "File:".dimmed(), path.display());
    }
    println!();
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_completions(args: &cli::CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "wbcrawl", &mut io::stdout());
    Ok(())
}
