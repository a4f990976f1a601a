//! Account profiling and page-count arithmetic.

use tracing::{info, warn};

use crate::client::FeedSource;
use crate::error::{CrawlError, Result};
use crate::model::{Account, RawCount};
use crate::normalize::resolve_count;

/// Posts the feed endpoint returns per page.
pub const POSTS_PER_PAGE: u64 = 10;

/// Resolve account metadata with a single profile fetch.
///
/// Missing counters default to zero. Nothing is paginated when this fails.
///
/// # Errors
/// `AccountNotFound` when upstream flags the response as failed,
/// `ProfileFetchFailed` when the request or decoding fails.
pub async fn profile(source: &dyn FeedSource, account_id: &str) -> Result<Account> {
    let response = source
        .fetch_profile(account_id)
        .await
        .map_err(|e| CrawlError::profile_fetch_failed(account_id, e))?;

    if !response.ok {
        return Err(CrawlError::account_not_found(account_id));
    }

    let info = response.data.and_then(|d| d.user_info);
    let (followers, statuses) = info.map_or((None, None), |i| (i.followers_count, i.statuses_count));

    let account = Account {
        id: account_id.to_string(),
        statuses_count: count_or_zero(statuses.as_ref(), "statuses_count"),
        followers_count: count_or_zero(followers.as_ref(), "followers_count"),
    };
    info!(
        account = %account.id,
        statuses = account.statuses_count,
        followers = account.followers_count,
        "Resolved account profile"
    );
    Ok(account)
}

fn count_or_zero(value: Option<&RawCount>, field: &str) -> u64 {
    value.map_or(0, |v| {
        resolve_count(v).unwrap_or_else(|e| {
            warn!(field, error = %e, "Unreadable profile counter, using 0");
            0
        })
    })
}

/// Number of pages needed to cover `total_posts`, rounding up.
///
/// A `posts_per_page` of zero is treated as one.
#[must_use]
pub const fn page_count(total_posts: u64, posts_per_page: u64) -> u64 {
    let per_page = if posts_per_page == 0 { 1 } else { posts_per_page };
    total_posts.div_ceil(per_page)
}
