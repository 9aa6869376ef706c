use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::lenient;

/// A conversation thread on the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,

    #[serde(deserialize_with = "lenient::string")]
    pub slug: String,

    #[serde(
        rename = "projectID",
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<String>,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,

    /// Set for sub-sessions
    #[serde(
        rename = "parentID",
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<String>,

    #[serde(deserialize_with = "lenient::opt_struct", skip_serializing_if = "Option::is_none")]
    pub summary: Option<SessionSummary>,

    #[serde(deserialize_with = "lenient::opt_struct", skip_serializing_if = "Option::is_none")]
    pub share: Option<Share>,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(deserialize_with = "lenient::string")]
    pub version: String,

    #[serde(deserialize_with = "lenient::struct_or_default")]
    pub time: SessionTime,

    #[serde(deserialize_with = "lenient::opt_list", skip_serializing_if = "Option::is_none")]
    pub permission: Option<Vec<PermissionRule>>,

    #[serde(deserialize_with = "lenient::opt_struct", skip_serializing_if = "Option::is_none")]
    pub revert: Option<RevertInfo>,
}

impl Session {
    /// Title for display: the title, then the slug, then the id
    pub fn display_title(&self) -> String {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| Some(self.slug.as_str()).filter(|s| !s.trim().is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Session {}", self.id))
    }

    pub fn is_child(&self) -> bool {
        self.parent_id.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.time.created)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.time.updated)
    }
}

/// Epoch milliseconds to UTC; `0` means the server sent nothing
pub(crate) fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    if millis == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTime {
    #[serde(deserialize_with = "lenient::int")]
    pub created: i64,

    #[serde(deserialize_with = "lenient::int")]
    pub updated: i64,

    #[serde(deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub compacting: Option<i64>,

    #[serde(deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub archived: Option<i64>,
}

/// Aggregate of the file changes a session produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSummary {
    #[serde(deserialize_with = "lenient::count")]
    pub additions: u32,

    #[serde(deserialize_with = "lenient::count")]
    pub deletions: u32,

    #[serde(deserialize_with = "lenient::count")]
    pub files: u32,

    #[serde(deserialize_with = "lenient::opt_list", skip_serializing_if = "Option::is_none")]
    pub diffs: Option<Vec<FileDiff>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileDiff {
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(deserialize_with = "lenient::opt_list", skip_serializing_if = "Option::is_none")]
    pub hunks: Option<Vec<DiffHunk>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffHunk {
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,

    #[serde(deserialize_with = "lenient::opt_list", skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<DiffLine>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffLine {
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Share {
    #[serde(deserialize_with = "lenient::string")]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionRule {
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Marker left on a session after a revert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevertInfo {
    #[serde(
        rename = "messageID",
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub message_id: Option<String>,

    #[serde(
        rename = "partID",
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub part_id: Option<String>,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}
