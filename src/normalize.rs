//! Post-record normalization.
//!
//! Turns a raw card into a flat [`PostRecord`]: relative creation times become
//! absolute `YYYY-MM-DD` dates, abbreviated counters become integers, markup is
//! stripped from the body. Every function here is pure; "now" is always a
//! parameter.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::trace;

use crate::error::{CrawlError, Result};
use crate::markup::MarkupStripper;
use crate::model::{Card, POST_CARD_TYPE, PostRecord, RawCount, RawPost};

const JUST_NOW: &str = "刚刚";
const MINUTES: &str = "分钟";
const HOURS: &str = "小时";
const YESTERDAY: &str = "昨天";
const TEN_THOUSAND_PLUS: &str = "万+";
const TEN_THOUSAND: &str = "万";
const TEN_THOUSAND_SCALE: u64 = 10_000;

/// Format of absolute dates in records and the since cutoff.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Full timestamp format the endpoint uses for older posts.
const FULL_TIMESTAMP_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

static MINUTES_AGO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*分钟").expect("valid minutes regex"));
static HOURS_AGO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*小时").expect("valid hours regex"));

/// How a post entry is treated by the stop condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryClass {
    /// Re-publishes another post; never accepted, never date-checked.
    Reshare,
    /// Ordinary post, subject to the chronological stop.
    Normal,
    /// Pinned post, displayed out of order; exempt from the stop.
    Pinned,
}

/// Classify a post entry ahead of the stop-condition check.
#[must_use]
pub fn classify(post: &RawPost) -> EntryClass {
    if post.is_reshare() {
        EntryClass::Reshare
    } else if post.is_pinned() {
        EntryClass::Pinned
    } else {
        EntryClass::Normal
    }
}

/// Decode a raw card, returning the nested post for post-type cards only.
///
/// # Errors
/// Returns `RecordParseFailed` when the card does not match the expected shape.
pub fn decode_post_card(card: &Value) -> Result<Option<RawPost>> {
    let card_type = card.get("card_type").and_then(Value::as_i64);
    if card_type != Some(POST_CARD_TYPE) {
        return Ok(None);
    }
    let card: Card = serde_json::from_value(card.clone())
        .map_err(|e| CrawlError::record_parse(e.to_string()))?;
    card.mblog
        .map(Some)
        .ok_or_else(|| CrawlError::record_parse("post card without mblog"))
}

/// Resolve the endpoint's creation-time text into an absolute `YYYY-MM-DD`.
///
/// | input            | result                    |
/// |------------------|---------------------------|
/// | `刚刚`           | date of `now`             |
/// | `5分钟前`        | date of `now - 5 minutes` |
/// | `3小时前`        | date of `now - 3 hours`   |
/// | `昨天 08:00`     | date of `now - 1 day`     |
/// | full timestamp   | its own calendar date     |
/// | `03-15`          | `{now.year}-03-15`        |
/// | anything else    | unchanged                 |
///
/// # Errors
/// Returns `InvalidDate` when a relative marker has no usable amount or the
/// amount reaches past the representable calendar.
pub fn resolve_date(raw: &str, now: NaiveDateTime) -> Result<String> {
    let date = if raw.contains(JUST_NOW) {
        now.date()
    } else if raw.contains(MINUTES) {
        let delta = TimeDelta::try_minutes(relative_amount(&MINUTES_AGO, raw)?);
        shift_back(now, delta, raw)?
    } else if raw.contains(HOURS) {
        let delta = TimeDelta::try_hours(relative_amount(&HOURS_AGO, raw)?);
        shift_back(now, delta, raw)?
    } else if raw.contains(YESTERDAY) {
        shift_back(now, TimeDelta::try_days(1), raw)?
    } else if let Ok(stamp) = DateTime::parse_from_str(raw.trim(), FULL_TIMESTAMP_FORMAT) {
        stamp.date_naive()
    } else if raw.matches('-').count() == 1 {
        return Ok(format!("{}-{}", now.year(), raw.trim()));
    } else {
        return Ok(raw.to_string());
    };
    Ok(date.format(DATE_FORMAT).to_string())
}

fn relative_amount(pattern: &Regex, raw: &str) -> Result<i64> {
    pattern
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| CrawlError::invalid_date(raw, "relative time without an amount"))
}

fn shift_back(now: NaiveDateTime, delta: Option<TimeDelta>, raw: &str) -> Result<NaiveDate> {
    delta
        .and_then(|delta| now.checked_sub_signed(delta))
        .map(|shifted| shifted.date())
        .ok_or_else(|| CrawlError::invalid_date(raw, "relative time out of range"))
}

/// Parse a resolved `YYYY-MM-DD` date for the stop-condition comparison.
///
/// # Errors
/// Returns `InvalidDate` when the text is not an absolute date.
pub fn parse_record_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|e| CrawlError::invalid_date(value, e.to_string()))
}

/// Resolve a counter into a non-negative integer.
///
/// `万` and `万+` both scale the decimal prefix by 10 000, so `1.2万+` is
/// `12000`. `万+` means "at least", so the result is a lower bound rather than
/// an exact count.
///
/// # Errors
/// Returns `InvalidCount` for negative integers or unparseable text.
pub fn resolve_count(value: &RawCount) -> Result<u64> {
    match value {
        RawCount::Int(n) => u64::try_from(*n).map_err(|_| CrawlError::invalid_count(n.to_string())),
        RawCount::Text(text) => {
            let trimmed = text.trim();
            let scaled = trimmed
                .strip_suffix(TEN_THOUSAND_PLUS)
                .or_else(|| trimmed.strip_suffix(TEN_THOUSAND));
            match scaled {
                Some(prefix) => scale_decimal(prefix.trim(), TEN_THOUSAND_SCALE)
                    .ok_or_else(|| CrawlError::invalid_count(text.as_str())),
                None => trimmed
                    .parse()
                    .map_err(|_| CrawlError::invalid_count(text.as_str())),
            }
        }
    }
}

/// Multiply a non-negative decimal string by `scale` without going through
/// floating point. Digits beyond the scale's precision are truncated.
fn scale_decimal(prefix: &str, scale: u64) -> Option<u64> {
    let (whole, fraction) = prefix.split_once('.').unwrap_or((prefix, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut value = whole.checked_mul(scale)?;

    let mut unit = scale;
    for digit in fraction.chars() {
        unit /= 10;
        if unit == 0 {
            break;
        }
        value = value.checked_add(u64::from(digit.to_digit(10)?) * unit)?;
    }
    Some(value)
}

/// Remove zero-width spaces the endpoint sprinkles into text fields.
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.replace('\u{200b}', "")
}

fn resolve_optional_count(value: Option<&RawCount>) -> Result<u64> {
    value.map_or(Ok(0), resolve_count)
}

/// Build a flat [`PostRecord`] from a raw post.
///
/// # Errors
/// Returns `RecordParseFailed`, `InvalidDate` or `InvalidCount` when a field
/// cannot be normalized.
pub fn normalize_post(
    post: &RawPost,
    stripper: &dyn MarkupStripper,
    now: NaiveDateTime,
) -> Result<PostRecord> {
    let id = post
        .id
        .as_u64()
        .ok_or_else(|| CrawlError::record_parse(format!("non-numeric post id {:?}", post.id)))?;

    let (user_id, screen_name) = post.user.as_ref().map_or((None, String::new()), |user| {
        (
            user.id.as_ref().and_then(crate::model::RawId::as_u64),
            user.screen_name.as_deref().map(clean_text).unwrap_or_default(),
        )
    });

    let created_at = resolve_date(&post.created_at, now)?;
    trace!(id, raw = %post.created_at, resolved = %created_at, "Resolved creation date");

    Ok(PostRecord {
        user_id,
        screen_name,
        id,
        bid: clean_text(&post.bid),
        text: clean_text(&stripper.strip(&post.text)),
        created_at,
        source: clean_text(&post.source),
        attitudes_count: resolve_optional_count(post.attitudes_count.as_ref())?,
        comments_count: resolve_optional_count(post.comments_count.as_ref())?,
        reposts_count: resolve_optional_count(post.reposts_count.as_ref())?,
    })
}
