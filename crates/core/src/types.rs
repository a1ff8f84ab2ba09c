use std::fmt;

use serde::{Deserialize, Serialize};

/// Build is a single pipeline run as reported by the Drone API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Build {
    /// Commit message of the built revision
    pub message: String,
    /// Server-assigned, monotonically increasing build number
    pub number: i64,
    /// Commit SHA before the push
    pub before: String,
    /// Commit SHA that was built
    pub after: String,
    /// Name of the branch or ref
    pub source: String,
    /// Event that started the build, e.g. "push" or "tag"
    pub event: String,
}

/// BuildKind selects which builds are considered when searching the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildKind {
    /// Builds started by a branch push
    Push,
    /// Builds started by a tag
    Tag,
}

impl BuildKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildKind::Push => "push",
            BuildKind::Tag => "tag",
        }
    }

    /// Returns true if the build was started by this kind of event.
    pub fn matches(&self, build: &Build) -> bool {
        build.event == self.as_str()
    }
}

impl fmt::Display for BuildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// JsonResponse is the envelope returned by the webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonResponse {
    pub status: String,
    pub err: String,
}

impl JsonResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            err: String::new(),
        }
    }

    pub fn error(err: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            err: err.into(),
        }
    }
}
