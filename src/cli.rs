//! CLI definitions for wbcrawl.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::walker::PageErrorPolicy;

/// wbcrawl - incremental Weibo post-feed harvester
#[derive(Parser, Debug)]
#[command(name = "wbcrawl")]
#[command(version)]
#[command(about = "Incrementally harvest an account's public Weibo posts")]
#[command(long_about = r#"
wbcrawl walks an account's public post feed on the mobile Weibo API, newest
first, and stops at the first post older than a since date.

Reshares are skipped, pinned posts never end the walk early, relative times
("5分钟前", "昨天") and abbreviated counts ("1.2万") are resolved.

Quick start:
  wbcrawl profile 1669879400
  wbcrawl crawl 1669879400 --since 2024-01-01
  wbcrawl crawl 1669879400 --since "30 days ago" --format jsonl > posts.jsonl
"#)]
pub struct Cli {
    /// Path to a config file (defaults to ~/.config/wbcrawl/config.toml)
    #[arg(long, env = "WBCRAWL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format (defaults to output.format from config)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Increase log verbosity (-v pages, -vv skips, -vvv everything)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Be quiet (errors only, no progress bar)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Walk an account's feed and print accepted posts
    Crawl(CrawlArgs),

    /// Show an account's post and follower counts
    Profile(ProfileArgs),

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Numeric account id
    pub account_id: String,

    /// Keep posts on or after this date (YYYY-MM-DD or e.g. "30 days ago")
    #[arg(long, short = 's')]
    pub since: Option<String>,

    /// Do not pause between pages
    #[arg(long)]
    pub no_throttle: bool,

    /// What to do when a page fails: skip or abort
    #[arg(long)]
    pub on_page_error: Option<PageErrorPolicy>,

    /// Write output to this file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Hide the page progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// Numeric account id
    pub account_id: String,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Set a configuration value (key=value)
    #[arg(long)]
    pub set: Option<String>,

    /// Write a default config file with explanatory comments
    #[arg(long)]
    pub init: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
    Jsonl,
}

impl OutputFormat {
    /// Resolve the config file's `output.format` string.
    #[must_use]
    pub fn from_config(value: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(value, true).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_crawl_flags() {
        let cli = Cli::try_parse_from([
            "wbcrawl",
            "-vv",
            "crawl",
            "42",
            "--since",
            "2024-01-01",
            "--on-page-error",
            "abort",
            "--no-throttle",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Crawl(args) = cli.command else {
            panic!("expected crawl");
        };
        assert_eq!(args.account_id, "42");
        assert_eq!(args.since.as_deref(), Some("2024-01-01"));
        assert_eq!(args.on_page_error, Some(PageErrorPolicy::Abort));
        assert!(args.no_throttle);
    }

    #[test]
    fn output_format_from_config() {
        assert_eq!(OutputFormat::from_config("jsonl"), Some(OutputFormat::Jsonl));
        assert_eq!(
            OutputFormat::from_config("json-pretty"),
            Some(OutputFormat::JsonPretty)
        );
        assert_eq!(OutputFormat::from_config("TEXT"), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::from_config("xml"), None);
    }
}
