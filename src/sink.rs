//! Result sinks.
//!
//! The walker hands every accepted record to a [`RecordSink`] as soon as it is
//! accepted, in acceptance order, after announcing the account once.

use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::model::{Account, PostRecord};
use crate::walker::CrawlReport;
use crate::{CONTENT_DIVIDER_WIDTH, format_number_u64, format_number_usize};

/// Receives crawl output as it is produced.
pub trait RecordSink: Send {
    /// Called once, before any page is fetched.
    fn account(&mut self, account: &Account) -> Result<()>;

    /// Called for each accepted record, in acceptance order.
    fn record(&mut self, record: &PostRecord) -> Result<()>;

    /// Called after each page has been processed.
    fn page_done(&mut self, _page: u64, _page_count: u64) {}

    /// Called once when the walk ends, however it ends.
    fn finish(&mut self, _report: &CrawlReport) -> Result<()> {
        Ok(())
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub account: Option<Account>,
    pub records: Vec<PostRecord>,
    pub pages: Vec<u64>,
}

impl RecordSink for CollectingSink {
    fn account(&mut self, account: &Account) -> Result<()> {
        self.account = Some(account.clone());
        Ok(())
    }

    fn record(&mut self, record: &PostRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn page_done(&mut self, page: u64, _page_count: u64) {
        self.pages.push(page);
    }
}

/// Human-readable output.
pub struct TextSink<W: Write + Send> {
    out: W,
    wrap_width: usize,
}

impl<W: Write + Send> TextSink<W> {
    pub const fn new(out: W) -> Self {
        Self {
            out,
            wrap_width: CONTENT_DIVIDER_WIDTH,
        }
    }
}

impl<W: Write + Send> RecordSink for TextSink<W> {
    fn account(&mut self, account: &Account) -> Result<()> {
        writeln!(self.out, "{}", "Account".bold().cyan())?;
        writeln!(self.out, "{}", "─".repeat(40))?;
        writeln!(self.out, "  {:<12} {:>14}", "ID:", account.id)?;
        writeln!(
            self.out,
            "  {:<12} {:>14}",
            "Posts:",
            format_number_u64(account.statuses_count)
        )?;
        writeln!(
            self.out,
            "  {:<12} {:>14}",
            "Followers:",
            format_number_u64(account.followers_count)
        )?;
        writeln!(self.out)?;
        Ok(())
    }

    fn record(&mut self, record: &PostRecord) -> Result<()> {
        writeln!(self.out, "{}", "─".repeat(CONTENT_DIVIDER_WIDTH).dimmed())?;
        for line in textwrap::wrap(&record.text, self.wrap_width) {
            writeln!(self.out, "{line}")?;
        }
        writeln!(
            self.out,
            "{} {}  {}",
            record.created_at.green(),
            format!("#{}", record.id).dimmed(),
            record.source.dimmed()
        )?;
        writeln!(
            self.out,
            "{} {}  {} {}  {} {}",
            "♥".red(),
            format_number_u64(record.attitudes_count),
            "comments".dimmed(),
            format_number_u64(record.comments_count),
            "↻".blue(),
            format_number_u64(record.reposts_count)
        )?;
        Ok(())
    }

    fn finish(&mut self, report: &CrawlReport) -> Result<()> {
        writeln!(self.out)?;
        writeln!(
            self.out,
            "{} {} posts from {} pages ({})",
            "✓".green(),
            format_number_usize(report.state.accepted),
            report.pages_fetched,
            report.stop
        )?;
        if !report.failed_pages.is_empty() {
            writeln!(
                self.out,
                "{} pages failed: {:?}",
                "!".yellow().bold(),
                report.failed_pages
            )?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// One JSON object per line, written as records arrive.
pub struct JsonLinesSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub const fn new(out: W) -> Self {
        Self { out }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JsonLine<'a> {
    Account(&'a Account),
    Post(&'a PostRecord),
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn account(&mut self, account: &Account) -> Result<()> {
        serde_json::to_writer(&mut self.out, &JsonLine::Account(account))?;
        writeln!(self.out)?;
        Ok(())
    }

    fn record(&mut self, record: &PostRecord) -> Result<()> {
        serde_json::to_writer(&mut self.out, &JsonLine::Post(record))?;
        writeln!(self.out)?;
        Ok(())
    }

    fn finish(&mut self, _report: &CrawlReport) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// A single JSON document written when the walk ends.
pub struct JsonSink<W: Write + Send> {
    out: W,
    pretty: bool,
    account: Option<Account>,
    posts: Vec<PostRecord>,
}

impl<W: Write + Send> JsonSink<W> {
    pub const fn new(out: W, pretty: bool) -> Self {
        Self {
            out,
            pretty,
            account: None,
            posts: Vec::new(),
        }
    }
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    account: Option<&'a Account>,
    posts: &'a [PostRecord],
    stop: String,
    pages_fetched: u64,
    failed_pages: &'a [u64],
}

impl<W: Write + Send> RecordSink for JsonSink<W> {
    fn account(&mut self, account: &Account) -> Result<()> {
        self.account = Some(account.clone());
        Ok(())
    }

    fn record(&mut self, record: &PostRecord) -> Result<()> {
        self.posts.push(record.clone());
        Ok(())
    }

    fn finish(&mut self, report: &CrawlReport) -> Result<()> {
        let doc = JsonDocument {
            account: self.account.as_ref(),
            posts: &self.posts,
            stop: report.stop.to_string(),
            pages_fetched: report.pages_fetched,
            failed_pages: &report.failed_pages,
        };
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.out, &doc)?;
        } else {
            serde_json::to_writer(&mut self.out, &doc)?;
        }
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            id: "42".into(),
            statuses_count: 12_345,
            followers_count: 7,
        }
    }

    fn post(id: u64) -> PostRecord {
        PostRecord {
            user_id: Some(42),
            screen_name: "lab".into(),
            id,
            bid: format!("B{id}"),
            text: "hello".into(),
            created_at: "2024-01-10".into(),
            source: "web".into(),
            attitudes_count: 1200,
            comments_count: 3,
            reposts_count: 0,
        }
    }

    #[test]
    fn json_lines_tags_each_line() {
        let mut buf = Vec::new();
        {
            let mut sink = JsonLinesSink::new(&mut buf);
            sink.account(&account()).unwrap();
            sink.record(&post(1)).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "account");
        assert_eq!(lines[1]["type"], "post");
        assert_eq!(lines[1]["id"], 1);
    }

    #[test]
    fn record_fields_serialize_in_order() {
        let json = serde_json::to_string(&post(9)).unwrap();
        let user = json.find("\"user_id\"").unwrap();
        let id = json.find("\"id\"").unwrap();
        let created = json.find("\"created_at\"").unwrap();
        let reposts = json.find("\"reposts_count\"").unwrap();
        assert!(user < id && id < created && created < reposts);
    }

    #[test]
    fn text_sink_prints_counts() {
        colored::control::set_override(false);
        let mut buf = Vec::new();
        {
            let mut sink = TextSink::new(&mut buf);
            sink.account(&account()).unwrap();
            sink.record(&post(1)).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("12,345"));
        assert!(text.contains("hello"));
        assert!(text.contains("2024-01-10"));
        assert!(text.contains("1,200"));
    }

    #[test]
    fn collecting_sink_keeps_order() {
        let mut sink = CollectingSink::default();
        sink.account(&account()).unwrap();
        sink.record(&post(2)).unwrap();
        sink.record(&post(1)).unwrap();
        let ids: Vec<u64> = sink.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(sink.account, Some(account()));
    }
}
