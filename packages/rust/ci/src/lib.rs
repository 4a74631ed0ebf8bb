//! CI-build service client: build location and inspection.
//!
//! The service speaks a JSON protocol where every call is a `POST` to the
//! endpoint root and the operation is selected by the `X-Amz-Target` header.
//! Two read-only operations are used: "list builds for project" (descending
//! by start time) and "batch get builds". Request signing is delegated to
//! the ambient deployment configuration and is not performed here.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};
use url::Url;

use buildwatch_shared::{BuildDetail, BuildId, BuildwatchError, Result};

/// Target header name used for operation dispatch.
const TARGET_HEADER: &str = "X-Amz-Target";

/// Wire content type for the JSON protocol.
const PROTOCOL_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Operation target: list build IDs for a project.
const OP_LIST_BUILDS: &str = "CodeBuild_20161006.ListBuildsForProject";

/// Operation target: batch-fetch build detail records.
const OP_BATCH_GET_BUILDS: &str = "CodeBuild_20161006.BatchGetBuilds";

/// User-Agent string for CI service requests.
const USER_AGENT: &str = concat!("buildwatch/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListBuildsResponse {
    /// Build identifiers sorted descending by start time.
    #[serde(default)]
    ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BatchGetBuildsResponse {
    #[serde(default)]
    builds: Vec<BuildDetail>,
}

// ---------------------------------------------------------------------------
// CiClient
// ---------------------------------------------------------------------------

/// Client for the CI-build service's two read-only operations.
pub struct CiClient {
    http: Client,
    endpoint: Url,
}

impl CiClient {
    /// Create a client for the given endpoint with an explicit request timeout.
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| BuildwatchError::validation(format!("ci endpoint '{endpoint}': {e}")))?;

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BuildwatchError::CiService(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, endpoint })
    }

    /// Return the most recent build ID for `project`, or `None` when the
    /// project has no builds.
    #[instrument(skip(self))]
    pub async fn latest_build_id(&self, project: &str) -> Result<Option<BuildId>> {
        let body = serde_json::json!({
            "projectName": project,
            "sortOrder": "DESCENDING",
        });

        let response: ListBuildsResponse = self.post(OP_LIST_BUILDS, &body).await?;

        debug!(ids = response.ids.len(), "listed builds");

        Ok(response.ids.into_iter().next().map(BuildId::from))
    }

    /// Fetch the detail record for a single build, or `None` when the service
    /// knows no build with that ID.
    #[instrument(skip(self), fields(build_id = %id))]
    pub async fn build_detail(&self, id: &BuildId) -> Result<Option<BuildDetail>> {
        let body = serde_json::json!({ "ids": [id.as_str()] });

        let response: BatchGetBuildsResponse = self.post(OP_BATCH_GET_BUILDS, &body).await?;

        let detail = response.builds.into_iter().next();
        if let Some(d) = &detail {
            info!(status = %d.build_status, "build detail fetched");
        }

        Ok(detail)
    }

    /// POST one operation to the service and decode its JSON response.
    async fn post<T: DeserializeOwned>(
        &self,
        target: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(TARGET_HEADER, target)
            .header(reqwest::header::CONTENT_TYPE, PROTOCOL_CONTENT_TYPE)
            .json(body)
            .send()
            .await
            .map_err(|e| BuildwatchError::CiService(format!("{target}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BuildwatchError::CiService(format!(
                "{target}: HTTP {status}"
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BuildwatchError::CiService(format!("{target}: bad response body: {e}")))
    }
}
