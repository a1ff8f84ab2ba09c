use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;

use crate::types::{Build, BuildKind};

/// Errors returned by the Drone API client.
#[derive(Debug, thiserror::Error)]
pub enum DroneError {
    /// Drone has no "latest" lookup for tag builds on a branch
    #[error("unable to build tag with branch filter")]
    TagWithBranch,
    /// The build history ran out before a matching build was seen
    #[error("no matching build found")]
    NoMatchingBuild,
    /// Drone failed and explained why
    #[error("{} {message}", .status.as_u16())]
    Upstream { status: StatusCode, message: String },
    /// Drone failed without a usable message
    #[error("{0}")]
    Status(StatusCode),
    /// Connection or decoding failure
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Body Drone sends along with failed requests.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl DroneError {
    /// Builds the error for a failed response from its status and raw body.
    fn from_response(status: StatusCode, body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorBody>(body) {
            Ok(ErrorBody { message }) if !message.is_empty() => {
                DroneError::Upstream { status, message }
            }
            _ => DroneError::Status(status),
        }
    }
}

/// Rebuilder restarts the most recent build of a repository.
#[async_trait]
pub trait Rebuilder: Send + Sync {
    /// Restarts the last push build, of `branch` if it is non-empty.
    async fn rebuild_last_build(&self, repo: &str, branch: &str) -> Result<Build, DroneError>;
    /// Restarts the last tag build.
    async fn rebuild_last_tag(&self, repo: &str) -> Result<Build, DroneError>;
}

/// Drone is a client for the Drone REST API.
#[derive(Debug, Clone)]
pub struct Drone {
    url: String,
    token: String,
    client: Client,
}

impl Drone {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            token: token.into(),
            client: Client::new(),
        }
    }

    /// Fetches one page of builds, newest first. Pages start at 1 and an
    /// empty page marks the end of the history.
    pub async fn list_builds(&self, repo: &str, page: u32) -> Result<Vec<Build>, DroneError> {
        self.request(
            Method::GET,
            &format!("{repo}/builds"),
            &[("page", page.to_string())],
        )
        .await
    }

    /// Fetches the most recent build of a branch.
    pub async fn latest_build(&self, repo: &str, branch: &str) -> Result<Build, DroneError> {
        let mut query = Vec::new();
        if !branch.is_empty() {
            query.push(("branch", branch.to_string()));
        }
        self.request(Method::GET, &format!("{repo}/builds/latest"), &query)
            .await
    }

    /// Finds the most recent build of the given kind.
    ///
    /// With a branch this is a single lookup of the branch's latest build,
    /// which Drone only offers for push builds. Without a branch the build
    /// history is paged through until a build of `kind` shows up or an empty
    /// page is returned.
    pub async fn find_last_build(
        &self,
        repo: &str,
        branch: &str,
        kind: BuildKind,
    ) -> Result<Build, DroneError> {
        if !branch.is_empty() {
            if kind == BuildKind::Tag {
                return Err(DroneError::TagWithBranch);
            }
            return self.latest_build(repo, branch).await;
        }

        // Relies on Drone eventually returning an empty page.
        for page in 1.. {
            let builds = self.list_builds(repo, page).await?;
            if builds.is_empty() {
                break;
            }
            if let Some(build) = builds.into_iter().find(|b| kind.matches(b)) {
                debug!(repo, page, number = build.number, %kind, "found last build");
                return Ok(build);
            }
        }

        Err(DroneError::NoMatchingBuild)
    }

    /// Restarts build `number`, returning the newly created build.
    pub async fn trigger_build(&self, repo: &str, number: i64) -> Result<Build, DroneError> {
        self.request(
            Method::POST,
            &format!("{repo}/builds/{number}"),
            &[("DRONETRIGGER", "true".to_string())],
        )
        .await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, DroneError> {
        let url = format!("{}/api/repos/{path}", self.url);
        debug!(%method, %url, ?query, "calling drone");

        let response = self
            .client
            .request(method, &url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.bytes().await?;
            return Err(DroneError::from_response(status, &body));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Rebuilder for Drone {
    async fn rebuild_last_build(&self, repo: &str, branch: &str) -> Result<Build, DroneError> {
        let last = self.find_last_build(repo, branch, BuildKind::Push).await?;
        self.trigger_build(repo, last.number).await
    }

    async fn rebuild_last_tag(&self, repo: &str) -> Result<Build, DroneError> {
        let last = self.find_last_build(repo, "", BuildKind::Tag).await?;
        self.trigger_build(repo, last.number).await
    }
}
