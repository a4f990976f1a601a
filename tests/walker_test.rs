//! End-to-end walks against a scripted feed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use wbcrawl::CrawlError;
use wbcrawl::client::FeedSource;
use wbcrawl::model::{PageResponse, ProfileResponse};
use wbcrawl::sink::CollectingSink;
use wbcrawl::throttle::ThrottlePolicy;
use wbcrawl::walker::{PageErrorPolicy, StopReason, WalkOptions, Walker};

enum Page {
    Cards(Vec<Value>),
    Fail,
    NotOk,
}

struct ScriptedSource {
    profile: Option<Value>,
    pages: HashMap<u64, Page>,
    fetched: Arc<Mutex<Vec<u64>>>,
    cancel_on: Option<(u64, CancellationToken)>,
}

impl ScriptedSource {
    fn new(statuses: u64) -> Self {
        Self {
            profile: Some(json!({
                "ok": 1,
                "data": {"userInfo": {"statuses_count": statuses, "followers_count": "3.5万"}}
            })),
            pages: HashMap::new(),
            fetched: Arc::default(),
            cancel_on: None,
        }
    }

    fn page(mut self, page: u64, cards: Vec<Value>) -> Self {
        self.pages.insert(page, Page::Cards(cards));
        self
    }

    fn failing(mut self, page: u64) -> Self {
        self.pages.insert(page, Page::Fail);
        self
    }

    /// Shared log of requested pages, readable after the source moves into a walker.
    fn fetch_log(&self) -> Arc<Mutex<Vec<u64>>> {
        Arc::clone(&self.fetched)
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn fetch_profile(&self, account_id: &str) -> wbcrawl::Result<ProfileResponse> {
        match &self.profile {
            Some(body) => Ok(serde_json::from_value(body.clone())?),
            None => Err(CrawlError::Api {
                status: 503,
                message: format!("no profile for {account_id}"),
            }),
        }
    }

    async fn fetch_page(&self, _account_id: &str, page: u64) -> wbcrawl::Result<PageResponse> {
        self.fetched.lock().unwrap().push(page);
        if let Some((at, token)) = &self.cancel_on {
            if *at == page {
                token.cancel();
            }
        }
        match self.pages.get(&page) {
            Some(Page::Cards(cards)) => {
                Ok(serde_json::from_value(json!({"ok": 1, "data": {"cards": cards}}))?)
            }
            Some(Page::NotOk) => Ok(serde_json::from_value(json!({"ok": 0, "msg": "这里还没有内容"}))?),
            Some(Page::Fail) => Err(CrawlError::Api {
                status: 418,
                message: "busy".into(),
            }),
            None => Ok(PageResponse::empty()),
        }
    }
}

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 15)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn post(id: u64, created_at: &str) -> Value {
    json!({
        "card_type": 9,
        "mblog": {
            "id": id.to_string(),
            "bid": format!("B{id}"),
            "text": "first<br />second",
            "created_at": created_at,
            "source": "iPhone\u{200b}",
            "attitudes_count": "1.2万",
            "comments_count": 3,
            "reposts_count": 0,
            "user": {"id": 42, "screen_name": "lab"}
        }
    })
}

fn pinned(id: u64, created_at: &str) -> Value {
    let mut card = post(id, created_at);
    card["mblog"]["title"] = json!({"text": "置顶"});
    card
}

fn reshare(id: u64, created_at: &str) -> Value {
    let mut card = post(id, created_at);
    card["mblog"]["retweeted_status"] = json!({"id": 1});
    card
}

fn options(since: NaiveDate) -> WalkOptions {
    WalkOptions {
        since,
        throttle: ThrottlePolicy::disabled(),
        ..WalkOptions::default()
    }
}

fn walker(source: ScriptedSource, opts: WalkOptions) -> Walker<ScriptedSource> {
    Walker::new(source, opts).with_clock(now)
}

fn ids(sink: &CollectingSink) -> Vec<u64> {
    sink.records.iter().map(|r| r.id).collect()
}

#[tokio::test]
async fn duplicates_across_pages_are_accepted_once() {
    let source = ScriptedSource::new(20)
        .page(1, vec![post(1, "03-10"), post(2, "03-09")])
        .page(2, vec![post(2, "03-09"), post(3, "03-08")]);
    let walker = walker(source, options(date(2024, 1, 1)));
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(ids(&sink), vec![1, 2, 3]);
    assert_eq!(report.state.accepted, 3);
    assert_eq!(report.state.seen.len(), 3);
    assert_eq!(report.stop, StopReason::Exhausted);
    assert!(!report.stopped_by_date());
    assert_eq!(sink.pages, vec![1, 2]);
}

#[tokio::test]
async fn records_are_normalized() {
    let source = ScriptedSource::new(1).page(1, vec![post(7, "5分钟前")]);
    let walker = walker(source, WalkOptions {
        throttle: ThrottlePolicy::disabled(),
        ..WalkOptions::default()
    });
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    let record = &report.records()[0];
    assert_eq!(record.id, 7);
    assert_eq!(record.user_id, Some(42));
    assert_eq!(record.screen_name, "lab");
    assert_eq!(record.text, "first\nsecond");
    assert_eq!(record.created_at, "2024-03-15");
    assert_eq!(record.source, "iPhone");
    assert_eq!(record.attitudes_count, 12_000);
    assert_eq!(report.account.followers_count, 35_000);
    assert_eq!(sink.account.as_ref().unwrap().statuses_count, 1);
}

#[tokio::test]
async fn reshares_never_stop_the_walk() {
    let source = ScriptedSource::new(20)
        .page(1, vec![reshare(5, "2001-01-01"), post(6, "03-01")])
        .page(2, vec![post(7, "02-01")]);
    let walker = walker(source, options(date(2024, 1, 1)));
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(ids(&sink), vec![6, 7]);
    assert!(!report.state.seen.contains(&5));
    assert_eq!(report.stop, StopReason::Exhausted);
}

#[tokio::test]
async fn pinned_stale_reshare_is_neither_accepted_nor_a_stop() {
    let mut card = reshare(5, "2001-01-01");
    card["mblog"]["title"] = json!({"text": "置顶"});
    let source = ScriptedSource::new(20)
        .page(1, vec![card, post(6, "03-01")])
        .page(2, vec![post(7, "02-01")]);
    let fetched = source.fetch_log();
    let walker = walker(source, options(date(2024, 1, 1)));
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(ids(&sink), vec![6, 7]);
    assert!(!report.state.seen.contains(&5));
    assert_eq!(report.skipped_records, 0);
    assert_eq!(report.stop, StopReason::Exhausted);
    assert_eq!(*fetched.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn stale_post_stops_mid_page() {
    let source = ScriptedSource::new(30)
        .page(1, vec![post(1, "03-10"), post(2, "2023-12-31"), post(3, "03-01")])
        .page(2, vec![post(4, "02-01")]);
    let fetched = source.fetch_log();
    let walker = walker(source, options(date(2024, 1, 1)));
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(ids(&sink), vec![1]);
    assert_eq!(
        report.stop,
        StopReason::SinceDateReached { page: 1, post_id: 2 }
    );
    assert!(report.stopped_by_date());
    assert_eq!(report.pages_fetched, 1);
    assert_eq!(*fetched.lock().unwrap(), vec![1]);
    assert_eq!(sink.pages, vec![1]);
}

#[tokio::test]
async fn post_on_the_cutoff_day_is_kept() {
    let source = ScriptedSource::new(10).page(1, vec![post(1, "2024-01-01")]);
    let walker = walker(source, options(date(2024, 1, 1)));
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(ids(&sink), vec![1]);
    assert_eq!(report.stop, StopReason::Exhausted);
}

#[tokio::test]
async fn stale_pinned_post_is_skipped_not_stopped() {
    let source = ScriptedSource::new(20)
        .page(1, vec![pinned(9, "2020-05-01"), post(1, "03-10")])
        .page(2, vec![post(2, "02-10")]);
    let walker = walker(source, options(date(2024, 1, 1)));
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(ids(&sink), vec![1, 2]);
    assert!(!report.state.seen.contains(&9));
    assert_eq!(report.stop, StopReason::Exhausted);
}

#[tokio::test]
async fn recent_pinned_post_is_accepted() {
    let source = ScriptedSource::new(10).page(1, vec![pinned(9, "03-14"), post(1, "03-10")]);
    let walker = walker(source, options(date(2024, 1, 1)));
    let mut sink = CollectingSink::default();

    walker.run("42", &mut sink).await.unwrap();

    assert_eq!(ids(&sink), vec![9, 1]);
}

#[tokio::test]
async fn failed_page_is_skipped_by_default() {
    let source = ScriptedSource::new(30)
        .page(1, vec![post(1, "03-10")])
        .failing(2)
        .page(3, vec![post(3, "03-01")]);
    let walker = walker(source, options(date(2024, 1, 1)));
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(ids(&sink), vec![1, 3]);
    assert_eq!(report.failed_pages, vec![2]);
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.stop, StopReason::Exhausted);
}

#[tokio::test]
async fn failed_page_aborts_under_abort_policy() {
    let source = ScriptedSource::new(30)
        .page(1, vec![post(1, "03-10")])
        .failing(2)
        .page(3, vec![post(3, "03-01")]);
    let walker = walker(source, WalkOptions {
        on_page_error: PageErrorPolicy::Abort,
        ..options(date(2024, 1, 1))
    });
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(ids(&sink), vec![1]);
    assert!(matches!(report.stop, StopReason::Aborted { page: 2, .. }));
}

#[tokio::test]
async fn upstream_not_ok_page_is_empty() {
    let mut source = ScriptedSource::new(20).page(2, vec![post(2, "03-01")]);
    source.pages.insert(1, Page::NotOk);
    let walker = walker(source, options(date(2024, 1, 1)));
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(ids(&sink), vec![2]);
    assert!(report.failed_pages.is_empty());
}

#[tokio::test]
async fn malformed_and_foreign_cards_are_skipped() {
    let broken_mblog = json!({"card_type": 9, "mblog": {"id": 5}});
    let no_mblog = json!({"card_type": 9});
    let other_card = json!({"card_type": 11, "card_group": []});
    let source = ScriptedSource::new(10).page(
        1,
        vec![broken_mblog, post(1, "03-10"), no_mblog, other_card, post(2, "03-09")],
    );
    let walker = walker(source, options(date(2024, 1, 1)));
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(ids(&sink), vec![1, 2]);
    assert_eq!(report.skipped_records, 2);
}

#[tokio::test]
async fn out_of_range_relative_date_skips_only_that_card() {
    let source = ScriptedSource::new(20)
        .page(
            1,
            vec![
                post(1, "03-10"),
                post(2, "200000000000000分钟前"),
                post(3, "3000000000小时前"),
                post(4, "03-09"),
            ],
        )
        .page(2, vec![post(5, "03-08")]);
    let walker = walker(source, options(date(2024, 1, 1)));
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(ids(&sink), vec![1, 4, 5]);
    assert_eq!(report.skipped_records, 2);
    assert_eq!(report.stop, StopReason::Exhausted);
}

#[tokio::test]
async fn page_count_rounds_up_and_walks_in_order() {
    let source = ScriptedSource::new(101);
    let fetched = source.fetch_log();
    let walker = walker(source, options(date(2024, 1, 1)));
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(report.page_count, 11);
    assert_eq!(report.pages_fetched, 11);
    assert_eq!(sink.pages, (1..=11).collect::<Vec<_>>());
    assert_eq!(*fetched.lock().unwrap(), (1..=11).collect::<Vec<_>>());
}

#[tokio::test]
async fn zero_posts_walks_nothing() {
    let walker = walker(ScriptedSource::new(0), options(date(2024, 1, 1)));
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(report.page_count, 0);
    assert!(sink.pages.is_empty());
    assert_eq!(report.stop, StopReason::Exhausted);
}

#[tokio::test]
async fn account_not_found_walks_no_pages() {
    let mut source = ScriptedSource::new(10);
    source.profile = Some(json!({"ok": 0, "msg": "用户不存在"}));
    let walker = walker(source, options(date(2024, 1, 1)));
    let mut sink = CollectingSink::default();

    let err = walker.run("42", &mut sink).await.unwrap_err();

    assert!(matches!(err, CrawlError::AccountNotFound { .. }));
    assert!(sink.account.is_none());
}

#[tokio::test]
async fn profile_transport_failure_is_reported() {
    let mut source = ScriptedSource::new(10);
    source.profile = None;
    let walker = walker(source, options(date(2024, 1, 1)));
    let mut sink = CollectingSink::default();

    let err = walker.run("42", &mut sink).await.unwrap_err();

    assert!(matches!(err, CrawlError::ProfileFetchFailed { .. }));
}

#[tokio::test]
async fn cancellation_keeps_gathered_records() {
    let token = CancellationToken::new();
    let mut source = ScriptedSource::new(30)
        .page(1, vec![post(1, "03-10")])
        .page(2, vec![post(2, "03-09")]);
    source.cancel_on = Some((1, token.clone()));
    let walker = walker(source, options(date(2024, 1, 1))).with_cancellation(token);
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(ids(&sink), vec![1]);
    assert_eq!(report.stop, StopReason::Cancelled { next_page: 2 });
    assert_eq!(report.pages_fetched, 1);
}

#[tokio::test]
async fn walker_exposes_its_token() {
    let walker = walker(ScriptedSource::new(10), options(date(2024, 1, 1)));
    let token = walker.cancellation_token();
    token.cancel();
    let mut sink = CollectingSink::default();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(report.stop, StopReason::Cancelled { next_page: 1 });
    assert_eq!(report.pages_fetched, 0);
}

fn fixed_throttle() -> ThrottlePolicy {
    ThrottlePolicy {
        enabled: true,
        min_interval_pages: 1,
        max_interval_pages: 1,
        min_pause_secs: 6,
        max_pause_secs: 6,
    }
}

#[tokio::test(start_paused = true)]
async fn throttle_pauses_between_pages_but_not_after_last() {
    let walker = walker(ScriptedSource::new(30), WalkOptions {
        throttle: fixed_throttle(),
        ..options(date(2024, 1, 1))
    });
    let mut sink = CollectingSink::default();
    let start = tokio::time::Instant::now();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(report.pages_fetched, 3);
    assert_eq!(start.elapsed().as_secs(), 12);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_a_pause() {
    let token = CancellationToken::new();
    let mut source = ScriptedSource::new(30).page(1, vec![post(1, "03-10")]);
    source.cancel_on = Some((1, token.clone()));
    let walker = walker(source, WalkOptions {
        throttle: fixed_throttle(),
        ..options(date(2024, 1, 1))
    })
    .with_cancellation(token);
    let mut sink = CollectingSink::default();
    let start = tokio::time::Instant::now();

    let report = walker.run("42", &mut sink).await.unwrap();

    assert_eq!(report.stop, StopReason::Cancelled { next_page: 2 });
    assert_eq!(ids(&sink), vec![1]);
    assert!(start.elapsed().as_secs() < 6);
}
