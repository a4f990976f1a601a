//! Custom error types for wbcrawl.
//!
//! Provides structured error handling with detailed context so a crawl can
//! report what failed without tearing down the records it already gathered.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for wbcrawl operations.
#[derive(Error, Debug)]
pub enum CrawlError {
    // =========================================================================
    // Profile Errors
    // =========================================================================
    /// Upstream answered the profile request with a failure flag.
    #[error("Account '{account}' not found (upstream reported failure)")]
    AccountNotFound { account: String },

    /// The profile request itself failed (transport or decoding).
    #[error("Failed to fetch profile for '{account}': {reason}")]
    ProfileFetchFailed { account: String, reason: String },

    // =========================================================================
    // Feed Errors
    // =========================================================================
    /// A single feed page could not be fetched or decoded.
    #[error("Failed to fetch page {page}: {reason}")]
    PageFetchFailed { page: u64, reason: String },

    /// A single card inside an otherwise good page was malformed.
    #[error("Failed to parse post record: {reason}")]
    RecordParseFailed { reason: String },

    /// A date string could not be resolved.
    #[error("Invalid date '{value}': {reason}")]
    InvalidDate { value: String, reason: String },

    /// A counter could not be resolved into a non-negative integer.
    #[error("Invalid count '{value}'")]
    InvalidCount { value: String },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status from the endpoint.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // =========================================================================
    // IO / Configuration Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    /// Invalid command-line argument.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Wrapped anyhow error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for wbcrawl operations.
pub type Result<T> = std::result::Result<T, CrawlError>;

impl CrawlError {
    /// Create an account not found error.
    pub fn account_not_found(account: impl Into<String>) -> Self {
        Self::AccountNotFound {
            account: account.into(),
        }
    }

    /// Create a profile fetch error.
    pub fn profile_fetch_failed(account: impl Into<String>, reason: impl ToString) -> Self {
        Self::ProfileFetchFailed {
            account: account.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a page fetch error.
    pub fn page_fetch_failed(page: u64, reason: impl ToString) -> Self {
        Self::PageFetchFailed {
            page,
            reason: reason.to_string(),
        }
    }

    /// Create a record parse error.
    pub fn record_parse(reason: impl Into<String>) -> Self {
        Self::RecordParseFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid date error.
    pub fn invalid_date(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDate {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid count error.
    pub fn invalid_count(value: impl Into<String>) -> Self {
        Self::InvalidCount {
            value: value.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Check if this error is recoverable (user can fix it).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AccountNotFound { .. }
                | Self::ConfigError { .. }
                | Self::InvalidArgument { .. }
                | Self::InvalidDate { .. }
        )
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::AccountNotFound { .. } => {
                Some("Check the numeric account id (the digits in the profile URL).")
            }
            Self::ProfileFetchFailed { .. } | Self::Http(_) | Self::Api { .. } => {
                Some("The endpoint may be rate limiting; wait a while and try again.")
            }
            Self::ConfigError { .. } => {
                Some("Run 'wbcrawl config --show' to inspect the effective configuration.")
            }
            Self::InvalidDate { .. } => {
                Some("Use YYYY-MM-DD or an expression like '30 days ago'.")
            }
            _ => None,
        }
    }
}

// =============================================================================
// CLI Error Formatting Utilities
// =============================================================================

use colored::Colorize;

/// Format a structured CLI error with explanation and suggestions.
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), title.bold());

    if !explanation.is_empty() {
        let _ = write!(output, "\n\n   {explanation}");
    }

    if !suggestions.is_empty() {
        output.push_str("\n\n   ");
        if suggestions.len() == 1 {
            let _ = write!(output, "{} {}", "Hint:".cyan(), suggestions[0]);
        } else {
            let _ = write!(output, "{}:", "Try".cyan());
            for suggestion in suggestions {
                let _ = write!(output, "\n     {} {}", "•".dimmed(), suggestion);
            }
        }
    }

    output
}

/// Calculate the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;

        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Find the closest candidate within `max_distance` edits (default 2).
#[must_use]
pub fn find_closest_match<'a>(
    input: &str,
    candidates: &[&'a str],
    max_distance: Option<usize>,
) -> Option<&'a str> {
    let max_dist = max_distance.unwrap_or(2);
    let input_lower = input.to_lowercase();

    candidates
        .iter()
        .map(|&candidate| {
            let distance = levenshtein_distance(&input_lower, &candidate.to_lowercase());
            (candidate, distance)
        })
        .filter(|(_, distance)| *distance <= max_dist && *distance > 0)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Format a "did you mean?" suggestion.
#[must_use]
pub fn format_did_you_mean(suggestion: &str) -> String {
    format!("Did you mean '{}'?", suggestion.green())
}

/// Format an error for an unknown value with "did you mean?" support.
pub fn format_unknown_value_error(kind: &str, input: &str, valid_options: &[&str]) -> String {
    let title = format!("Unknown {kind}: '{input}'");

    let mut suggestions = Vec::new();

    if let Some(closest) = find_closest_match(input, valid_options, None) {
        suggestions.push(format_did_you_mean(closest));
    }

    if valid_options.len() <= 8 {
        suggestions.push(format!("Valid {kind}s: {}", valid_options.join(", ")));
    }

    let suggestion_refs: Vec<&str> = suggestions.iter().map(String::as_str).collect();
    format_error(&title, "", &suggestion_refs)
}

/// Keys accepted by `wbcrawl config --set`.
pub const VALID_CONFIG_KEYS: &[&str] = &[
    "crawl.since_days",
    "crawl.posts_per_page",
    "crawl.on_page_error",
    "crawl.utc_offset_hours",
    "throttle.enabled",
    "throttle.min_interval_pages",
    "throttle.max_interval_pages",
    "throttle.min_pause_secs",
    "throttle.max_pause_secs",
    "http.base_url",
    "http.timeout_secs",
    "http.user_agent",
    "output.format",
    "output.colors",
    "output.quiet",
];
