//! Since-date parsing for the command line.
//!
//! Accepts strict `YYYY-MM-DD`, a handful of relative forms handled here
//! (`today`, `yesterday`, `3 days ago`, `last 2 weeks`, `this month`,
//! `last month`), and falls back to `chrono-english` for everything else.

use chrono::{Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_english::{Dialect, parse_date_string};
use tracing::debug;

use crate::error::{CrawlError, Result};
use crate::normalize::DATE_FORMAT;
use crate::walker::no_cutoff;

/// Parse a since-date expression relative to `today`.
///
/// # Errors
/// Returns `InvalidDate` when nothing understands the expression.
pub fn parse_since(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CrawlError::invalid_date(input, "expression is empty"));
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        return Ok(date);
    }

    let normalized = trimmed.to_lowercase();
    if let Some(date) = try_parse_relative(&normalized, today) {
        debug!(input = trimmed, %date, "Parsed relative since date");
        return Ok(date);
    }

    let base = Utc.from_utc_datetime(&today.and_time(NaiveTime::MIN));
    match parse_date_string(&normalized, base, Dialect::Us) {
        Ok(dt) => {
            debug!(input = trimmed, "Parsed natural language since date");
            Ok(dt.date_naive())
        }
        Err(err) => Err(CrawlError::invalid_date(
            trimmed,
            format!("expected YYYY-MM-DD or an expression like '30 days ago' ({err})"),
        )),
    }
}

/// The date `days` before `today`; saturates at the no-cutoff date.
#[must_use]
pub fn since_from_days(days: u64, today: NaiveDate) -> NaiveDate {
    today
        .checked_sub_days(Days::new(days))
        .filter(|d| *d >= no_cutoff())
        .unwrap_or_else(no_cutoff)
}

#[derive(Clone, Copy)]
enum RelativeUnit {
    Day,
    Week,
    Month,
    Year,
}

fn try_parse_relative(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let tokens: Vec<&str> = input.split_whitespace().collect();

    match tokens.as_slice() {
        ["today"] => Some(today),
        ["yesterday"] => today.pred_opt(),
        ["this", "month"] => today.with_day(1),
        ["this", "year"] => NaiveDate::from_ymd_opt(today.year(), 1, 1),
        ["last" | "past", "week"] => days_back(today, 6),
        ["last" | "past", "month"] => shift_months(today.with_day(1)?, -1),
        ["last" | "past", "year"] => NaiveDate::from_ymd_opt(today.year() - 1, 1, 1),
        ["last" | "past", count, unit] => {
            let count = parse_count(count)?;
            match parse_unit(unit)? {
                RelativeUnit::Day => days_back(today, count - 1),
                RelativeUnit::Week => days_back(today, count.checked_mul(7)? - 1),
                unit => shift_back(today, count, unit),
            }
        }
        [count, unit, "ago"] => {
            let count = parse_count(count)?;
            shift_back(today, count, parse_unit(unit)?)
        }
        _ => None,
    }
}

fn parse_count(token: &str) -> Option<u64> {
    token.parse::<u64>().ok().filter(|c| *c > 0)
}

fn parse_unit(token: &str) -> Option<RelativeUnit> {
    match token.trim_end_matches('s') {
        "day" => Some(RelativeUnit::Day),
        "week" => Some(RelativeUnit::Week),
        "month" => Some(RelativeUnit::Month),
        "year" => Some(RelativeUnit::Year),
        _ => None,
    }
}

fn days_back(today: NaiveDate, days: u64) -> Option<NaiveDate> {
    today.checked_sub_days(Days::new(days))
}

fn shift_back(today: NaiveDate, count: u64, unit: RelativeUnit) -> Option<NaiveDate> {
    match unit {
        RelativeUnit::Day => days_back(today, count),
        RelativeUnit::Week => days_back(today, count.checked_mul(7)?),
        RelativeUnit::Month => shift_months(today, -i32::try_from(count).ok()?),
        RelativeUnit::Year => shift_months(today, -i32::try_from(count).ok()?.checked_mul(12)?),
    }
}

fn shift_months(date: NaiveDate, delta_months: i32) -> Option<NaiveDate> {
    let month_i32 = i32::try_from(date.month()).ok()?;
    let total_months = date.year().checked_mul(12)? + (month_i32 - 1) + delta_months;
    let new_year = total_months.div_euclid(12);
    let new_month = u32::try_from(total_months.rem_euclid(12) + 1).ok()?;
    let last_day = last_day_of_month(new_year, new_month)?;
    NaiveDate::from_ymd_opt(new_year, new_month, date.day().min(last_day))
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?
        .pred_opt()
        .map(|d| d.day())
}
