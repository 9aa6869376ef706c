use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lenient;
use super::session::millis_to_datetime;

/// Response of `GET /global/health`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Health {
    #[serde(deserialize_with = "lenient::flag")]
    pub healthy: bool,

    #[serde(deserialize_with = "lenient::string")]
    pub version: String,
}

/// The project the server is running in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,

    #[serde(deserialize_with = "lenient::string")]
    pub worktree: String,

    #[serde(deserialize_with = "lenient::string")]
    pub vcs: String,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(deserialize_with = "lenient::opt_struct", skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,

    #[serde(deserialize_with = "lenient::opt_struct", skip_serializing_if = "Option::is_none")]
    pub commands: Option<Commands>,

    #[serde(deserialize_with = "lenient::struct_or_default")]
    pub time: ProjectTime,

    #[serde(deserialize_with = "lenient::string_list")]
    pub sandboxes: Vec<String>,
}

impl Project {
    /// Name if set, else the last component of the worktree path
    pub fn display_name(&self) -> &str {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name;
        }
        self.worktree
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.id)
    }

    pub fn initialized_at(&self) -> Option<DateTime<Utc>> {
        self.time.initialized.and_then(millis_to_datetime)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Icon {
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(
        rename = "override",
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub override_url: Option<String>,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commands {
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectTime {
    #[serde(deserialize_with = "lenient::int")]
    pub created: i64,

    #[serde(deserialize_with = "lenient::int")]
    pub updated: i64,

    #[serde(deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
    pub initialized: Option<i64>,
}

/// Server-side directories, from `GET /path`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathInfo {
    #[serde(deserialize_with = "lenient::string")]
    pub home: String,

    #[serde(deserialize_with = "lenient::string")]
    pub state: String,

    #[serde(deserialize_with = "lenient::string")]
    pub config: String,

    #[serde(deserialize_with = "lenient::string")]
    pub worktree: String,

    #[serde(deserialize_with = "lenient::string")]
    pub directory: String,
}
