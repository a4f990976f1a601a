//! Data models for the mobile Weibo container API.
//!
//! Two layers live here: the raw upstream shapes, decoded leniently because
//! the endpoint mixes integers and abbreviated strings for the same field, and
//! the normalized records handed to sinks.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Card type tag the endpoint uses for an ordinary post.
pub const POST_CARD_TYPE: i64 = 9;

/// Title text the endpoint attaches to a pinned post.
pub const PINNED_MARKER: &str = "置顶";

/// Account metadata resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub statuses_count: u64,
    pub followers_count: u64,
}

/// A normalized post, in the field order sinks serialize it.
///
/// Numeric fields are counters that went through
/// [`resolve_count`](crate::normalize::resolve_count); textual fields went
/// through [`clean_text`](crate::normalize::clean_text).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub user_id: Option<u64>,
    pub screen_name: String,
    pub id: u64,
    pub bid: String,
    pub text: String,
    /// Absolute `YYYY-MM-DD` date.
    pub created_at: String,
    pub source: String,
    pub attitudes_count: u64,
    pub comments_count: u64,
    pub reposts_count: u64,
}

// =============================================================================
// Raw upstream shapes
// =============================================================================

/// A counter as the endpoint sends it: a plain integer or text like `1.2万+`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawCount {
    Int(i64),
    Text(String),
}

impl From<i64> for RawCount {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for RawCount {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// A numeric id that is sometimes sent quoted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Int(u64),
    Text(String),
}

impl RawId {
    /// Parse into a numeric id.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(id) => Some(*id),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// Response of the profile container (`100505{uid}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    #[serde(deserialize_with = "deserialize_flag", default)]
    pub ok: bool,
    #[serde(default)]
    pub data: Option<ProfileData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileData {
    #[serde(rename = "userInfo")]
    pub user_info: Option<UserInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub followers_count: Option<RawCount>,
    pub statuses_count: Option<RawCount>,
}

/// Response of the feed container (`107603{uid}`) for one page.
///
/// Cards stay as raw JSON so a single malformed card can be skipped without
/// losing the rest of the page.
#[derive(Debug, Clone, Deserialize)]
pub struct PageResponse {
    #[serde(deserialize_with = "deserialize_flag", default)]
    pub ok: bool,
    #[serde(default)]
    pub data: Option<PageData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageData {
    #[serde(default)]
    pub cards: Vec<Value>,
}

impl PageResponse {
    /// An empty, successful page.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            ok: true,
            data: Some(PageData::default()),
        }
    }

    /// The raw cards of this page; empty when upstream reported failure.
    #[must_use]
    pub fn cards(&self) -> &[Value] {
        if !self.ok {
            return &[];
        }
        self.data.as_ref().map_or(&[], |d| d.cards.as_slice())
    }
}

/// One feed entry wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct Card {
    pub card_type: i64,
    pub mblog: Option<RawPost>,
}

/// The nested post object of a card.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPost {
    pub id: RawId,
    #[serde(default)]
    pub bid: String,
    #[serde(default)]
    pub text: String,
    pub created_at: String,
    #[serde(default)]
    pub source: String,
    pub attitudes_count: Option<RawCount>,
    pub comments_count: Option<RawCount>,
    pub reposts_count: Option<RawCount>,
    pub user: Option<RawUser>,
    pub retweeted_status: Option<Value>,
    pub title: Option<RawTitle>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUser {
    pub id: Option<RawId>,
    pub screen_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTitle {
    pub text: Option<String>,
}

impl RawPost {
    /// Whether this entry re-publishes another post.
    #[must_use]
    pub fn is_reshare(&self) -> bool {
        match &self.retweeted_status {
            None | Some(Value::Null) => false,
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        }
    }

    /// Whether the entry carries the pinned title annotation.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.title
            .as_ref()
            .and_then(|t| t.text.as_deref())
            .is_some_and(|text| text == PINNED_MARKER)
    }
}

/// Accept `true`/`false`, `1`/`0` or `null` for the endpoint's `ok` flag.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}
