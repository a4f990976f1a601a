//! Incremental page walker.
//!
//! Walks feed pages `1..=page_count` strictly in order, normalizing each post
//! card, dropping reshares and duplicates, and stopping at the first ordinary
//! post older than the since-date cutoff. Pinned posts are exempt from that
//! stop because the platform shows them out of chronological order.
//!
//! ```text
//!   profile ──► page 1 ──► page 2 ──► … ──► page N ──► done (exhausted)
//!                  │          │
//!                  └──────────┴──► stale normal post ──► done (since date)
//! ```
//!
//! Records are appended only after a card passes every check, so stopping
//! between pages (cancellation, abort) never leaves partial state behind.

use std::collections::HashSet;
use std::fmt;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::FeedSource;
use crate::config::DEFAULT_UTC_OFFSET_HOURS;
use crate::error::{CrawlError, Result};
use crate::markup::{HtmlStripper, MarkupStripper};
use crate::model::{Account, PostRecord};
use crate::normalize::{EntryClass, classify, decode_post_card, normalize_post, parse_record_date};
use crate::profile::{POSTS_PER_PAGE, page_count, profile};
use crate::sink::RecordSink;
use crate::throttle::{ThrottlePolicy, ThrottleSchedule};

/// The "no cutoff" since date.
#[must_use]
pub fn no_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// What to do when a page cannot be fetched or decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageErrorPolicy {
    /// Log the failure and treat the page as empty.
    #[default]
    Skip,
    /// Stop the walk, keeping what was gathered so far.
    Abort,
}

impl std::str::FromStr for PageErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" | "continue" => Ok(Self::Skip),
            "abort" | "stop" => Ok(Self::Abort),
            _ => Err(format!("Invalid page error policy: {s} (expected skip or abort)")),
        }
    }
}

impl fmt::Display for PageErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

/// Walk lifecycle, traced in the walk's log events. Both a date stop and page
/// exhaustion end in `Done`; the report's [`StopReason`] says which.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    Running,
    StoppedByDate,
    Done,
}

/// Why a walk ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// Every page was walked.
    Exhausted,
    /// An ordinary post older than the cutoff was reached.
    SinceDateReached { page: u64, post_id: u64 },
    /// The cancellation token fired before `next_page` was fetched.
    Cancelled { next_page: u64 },
    /// A page failed under [`PageErrorPolicy::Abort`].
    Aborted { page: u64, reason: String },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "all pages walked"),
            Self::SinceDateReached { page, post_id } => {
                write!(f, "reached since date at post {post_id} on page {page}")
            }
            Self::Cancelled { next_page } => write!(f, "cancelled before page {next_page}"),
            Self::Aborted { page, reason } => write!(f, "aborted at page {page}: {reason}"),
        }
    }
}

/// Mutable state of one walk. Owned by the walker, handed back in the report.
#[derive(Debug, Clone)]
pub struct CrawlState {
    /// Inclusive lower bound on post dates.
    pub since: NaiveDate,
    /// Ids already accepted during this walk.
    pub seen: HashSet<u64>,
    /// Accepted records, in acceptance order.
    pub records: Vec<PostRecord>,
    pub accepted: usize,
}

impl CrawlState {
    #[must_use]
    pub fn new(since: NaiveDate) -> Self {
        Self {
            since,
            seen: HashSet::new(),
            records: Vec::new(),
            accepted: 0,
        }
    }

    fn accept(&mut self, record: PostRecord) -> &PostRecord {
        self.seen.insert(record.id);
        self.accepted += 1;
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }
}

/// Result of a walk, whichever way it ended.
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub account: Account,
    pub state: CrawlState,
    pub stop: StopReason,
    pub page_count: u64,
    pub pages_fetched: u64,
    pub failed_pages: Vec<u64>,
    /// Cards dropped because they could not be decoded or normalized.
    pub skipped_records: usize,
}

impl CrawlReport {
    #[must_use]
    pub fn records(&self) -> &[PostRecord] {
        &self.state.records
    }

    #[must_use]
    pub const fn stopped_by_date(&self) -> bool {
        matches!(self.stop, StopReason::SinceDateReached { .. })
    }
}

/// Tunables for one walk.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub since: NaiveDate,
    pub posts_per_page: u64,
    pub on_page_error: PageErrorPolicy,
    pub throttle: ThrottlePolicy,
    pub utc_offset_hours: i32,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            since: no_cutoff(),
            posts_per_page: POSTS_PER_PAGE,
            on_page_error: PageErrorPolicy::Skip,
            throttle: ThrottlePolicy::default(),
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
        }
    }
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Wall clock at a fixed UTC offset.
#[must_use]
pub fn offset_clock(hours: i32) -> impl Fn() -> NaiveDateTime + Send + Sync + 'static {
    let offset = FixedOffset::east_opt(hours.saturating_mul(3600)).unwrap_or_else(|| Utc.fix());
    move || Utc::now().with_timezone(&offset).naive_local()
}

enum PageOutcome {
    Continue,
    StopByDate { post_id: u64 },
}

/// Drives one account's feed from page 1 until exhaustion, the since date,
/// cancellation, or an aborting page failure.
pub struct Walker<S> {
    source: S,
    stripper: Box<dyn MarkupStripper>,
    options: WalkOptions,
    clock: Clock,
    cancel: CancellationToken,
}

impl<S: FeedSource> Walker<S> {
    pub fn new(source: S, options: WalkOptions) -> Self {
        let clock = Box::new(offset_clock(options.utc_offset_hours));
        Self {
            source,
            stripper: Box::new(HtmlStripper),
            options,
            clock,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_stripper(mut self, stripper: impl MarkupStripper + 'static) -> Self {
        self.stripper = Box::new(stripper);
        self
    }

    /// Replace the clock used to resolve relative creation times.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the walk between pages when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Profile the account, then walk its feed.
    ///
    /// # Errors
    /// Only profiling errors are returned; page and record failures end up in
    /// the report so the records gathered so far stay usable.
    pub async fn run(&self, account_id: &str, sink: &mut dyn RecordSink) -> Result<CrawlReport> {
        self.run_with_rng(account_id, sink, StdRng::from_os_rng())
            .await
    }

    /// [`run`](Self::run) with an explicit randomness source for the throttle.
    ///
    /// # Errors
    /// See [`run`](Self::run).
    pub async fn run_with_rng<R: Rng + Send>(
        &self,
        account_id: &str,
        sink: &mut dyn RecordSink,
        rng: R,
    ) -> Result<CrawlReport> {
        let account = profile(&self.source, account_id).await?;
        if let Err(e) = sink.account(&account) {
            warn!(error = %e, "Sink rejected account summary");
        }

        let page_count = page_count(account.statuses_count, self.options.posts_per_page);
        let mut walk = WalkState::Running;
        info!(
            account = account_id,
            page_count,
            since = %self.options.since,
            ?walk,
            "Starting feed walk"
        );

        let mut state = CrawlState::new(self.options.since);
        let mut throttle = ThrottleSchedule::new(self.options.throttle.clone(), rng);
        let mut failed_pages = Vec::new();
        let mut pages_fetched = 0;
        let mut skipped_records = 0;
        let mut stop = StopReason::Exhausted;

        for page in 1..=page_count {
            if self.cancel.is_cancelled() {
                stop = StopReason::Cancelled { next_page: page };
                break;
            }

            match self.source.fetch_page(account_id, page).await {
                Ok(response) => {
                    pages_fetched += 1;
                    if !response.ok {
                        debug!(page, "Upstream returned no cards for page");
                    }
                    let now = (self.clock)();
                    let outcome = self.process_page(
                        page,
                        response.cards(),
                        now,
                        &mut state,
                        sink,
                        &mut skipped_records,
                    );
                    if let PageOutcome::StopByDate { post_id } = outcome {
                        walk = WalkState::StoppedByDate;
                        info!(page, post_id, ?walk, "Reached since date, stopping");
                        sink.page_done(page, page_count);
                        stop = StopReason::SinceDateReached { page, post_id };
                        break;
                    }
                }
                Err(e) => {
                    let err = CrawlError::page_fetch_failed(page, e);
                    warn!(page, error = %err, "Page fetch failed");
                    failed_pages.push(page);
                    if self.options.on_page_error == PageErrorPolicy::Abort {
                        stop = StopReason::Aborted {
                            page,
                            reason: err.to_string(),
                        };
                        break;
                    }
                }
            }

            sink.page_done(page, page_count);
            info!(page, page_count, accepted = state.accepted, "Page done");

            if let Some(pause) = throttle.after_page(page, page_count) {
                info!(pause_secs = pause.as_secs(), "Pausing between pages");
                tokio::select! {
                    () = tokio::time::sleep(pause) => {}
                    () = self.cancel.cancelled() => {
                        stop = StopReason::Cancelled { next_page: page + 1 };
                        break;
                    }
                }
            }
        }

        walk = WalkState::Done;
        info!(
            ?walk,
            accepted = state.accepted,
            pages_fetched,
            failed = failed_pages.len(),
            skipped = skipped_records,
            stop = %stop,
            "Feed walk finished"
        );

        let report = CrawlReport {
            account,
            state,
            stop,
            page_count,
            pages_fetched,
            failed_pages,
            skipped_records,
        };
        if let Err(e) = sink.finish(&report) {
            warn!(error = %e, "Sink failed to finish");
        }
        Ok(report)
    }

    fn process_page(
        &self,
        page: u64,
        cards: &[Value],
        now: NaiveDateTime,
        state: &mut CrawlState,
        sink: &mut dyn RecordSink,
        skipped: &mut usize,
    ) -> PageOutcome {
        for card in cards {
            let post = match decode_post_card(card) {
                Ok(Some(post)) => post,
                Ok(None) => continue,
                Err(e) => {
                    warn!(page, error = %e, "Skipping malformed card");
                    *skipped += 1;
                    continue;
                }
            };

            let class = classify(&post);
            if class == EntryClass::Reshare {
                debug!(page, "Skipping reshare");
                continue;
            }

            let record = match normalize_post(&post, self.stripper.as_ref(), now) {
                Ok(record) => record,
                Err(e) => {
                    warn!(page, error = %e, "Skipping unreadable post");
                    *skipped += 1;
                    continue;
                }
            };

            if state.seen.contains(&record.id) {
                debug!(page, id = record.id, "Skipping duplicate post");
                continue;
            }

            let date = match parse_record_date(&record.created_at) {
                Ok(date) => date,
                Err(e) => {
                    warn!(page, id = record.id, error = %e, "Skipping post with unresolvable date");
                    *skipped += 1;
                    continue;
                }
            };

            if date < state.since {
                if class == EntryClass::Pinned {
                    debug!(page, id = record.id, "Skipping stale pinned post");
                    continue;
                }
                return PageOutcome::StopByDate { post_id: record.id };
            }

            let accepted = state.accept(record);
            if let Err(e) = sink.record(accepted) {
                warn!(id = accepted.id, error = %e, "Sink rejected record");
            }
        }
        PageOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64) -> PostRecord {
        PostRecord {
            user_id: None,
            screen_name: String::new(),
            id,
            bid: String::new(),
            text: String::new(),
            created_at: "2024-01-01".into(),
            source: String::new(),
            attitudes_count: 0,
            comments_count: 0,
            reposts_count: 0,
        }
    }

    #[test]
    fn state_accept_tracks_everything() {
        let mut state = CrawlState::new(no_cutoff());
        state.accept(record(1));
        state.accept(record(2));
        assert_eq!(state.accepted, 2);
        assert!(state.seen.contains(&1) && state.seen.contains(&2));
        assert_eq!(state.records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn page_error_policy_parsing() {
        assert_eq!("skip".parse::<PageErrorPolicy>().unwrap(), PageErrorPolicy::Skip);
        assert_eq!("ABORT".parse::<PageErrorPolicy>().unwrap(), PageErrorPolicy::Abort);
        assert!("later".parse::<PageErrorPolicy>().is_err());
        assert_eq!(PageErrorPolicy::Abort.to_string(), "abort");
    }

    #[test]
    fn stop_reason_display() {
        let stop = StopReason::SinceDateReached { page: 3, post_id: 9 };
        assert_eq!(stop.to_string(), "reached since date at post 9 on page 3");
        assert_eq!(
            StopReason::Cancelled { next_page: 4 }.to_string(),
            "cancelled before page 4"
        );
    }

    #[test]
    fn stop_reason_serializes_with_kind_tag() {
        let stop = StopReason::Aborted {
            page: 2,
            reason: "timeout".into(),
        };
        let value = serde_json::to_value(&stop).unwrap();
        assert_eq!(value["kind"], "aborted");
        assert_eq!(value["page"], 2);
        assert_eq!(value["reason"], "timeout");
        assert_eq!(
            serde_json::to_value(StopReason::Exhausted).unwrap(),
            serde_json::json!({"kind": "exhausted"})
        );
    }

    #[test]
    fn no_cutoff_is_1900() {
        assert_eq!(no_cutoff().to_string(), "1900-01-01");
        assert_eq!(WalkOptions::default().since, no_cutoff());
    }

    #[test]
    fn offset_clock_is_ahead_of_utc() {
        let utc = offset_clock(0)();
        let cst = offset_clock(8)();
        let diff = cst - utc;
        assert!((diff.num_minutes() - 480).abs() <= 1);
    }
}
