//! wbcrawl - incremental Weibo post-feed harvester
//!
//! This library walks one account's public post feed page by page, turns
//! each post card into a flat [`PostRecord`], and stops once it reaches posts
//! older than a since date.
//!
//! # Modules
//!
//! - [`profile`] - Account metadata and page-count arithmetic
//! - [`walker`] - The pagination and termination loop
//! - [`normalize`] - Relative dates, abbreviated counts, record building
//! - [`throttle`] - Jittered pauses between pages
//! - [`client`] - The upstream [`FeedSource`] and its HTTP implementation
//! - [`sink`] - Where accepted records go
//! - [`cli`] - Command-line interface definitions

pub mod cli;
pub mod client;
pub mod config;
pub mod date_parser;
pub mod error;
pub mod logging;
pub mod markup;
pub mod model;
pub mod normalize;
pub mod profile;
pub mod shutdown;
pub mod sink;
pub mod throttle;
pub mod walker;

pub use client::{FeedSource, WeiboClient};
pub use config::Config;
pub use error::{
    CrawlError, Result, VALID_CONFIG_KEYS, find_closest_match, format_did_you_mean, format_error,
    format_unknown_value_error,
};
pub use markup::{HtmlStripper, MarkupStripper};
pub use model::{Account, PostRecord};
pub use profile::{POSTS_PER_PAGE, page_count, profile};
pub use sink::RecordSink;
pub use throttle::{ThrottlePolicy, ThrottleSchedule};
pub use walker::{
    CrawlReport, CrawlState, PageErrorPolicy, StopReason, WalkOptions, WalkState, Walker,
};

/// Standard width for content dividers in CLI output
pub const CONTENT_DIVIDER_WIDTH: usize = 60;

/// Format an unsigned integer with thousands separators.
#[must_use]
pub fn format_number_u64(value: u64) -> String {
    let mut out = String::with_capacity(24);

    for (idx, ch) in value.to_string().chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out.chars().rev().collect()
}

/// Format a usize with thousands separators.
#[must_use]
pub fn format_number_usize(value: usize) -> String {
    format_number_u64(u64::try_from(value).unwrap_or(u64::MAX))
}
