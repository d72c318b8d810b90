//! Hand-written client for the three Skyvern task endpoints.
//!
//! Every call returns a [`serde_json::Value`]: the decoded response body on
//! success, a failure envelope otherwise. Nothing here returns `Err` for an
//! upstream problem.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use serde_json::Value;

use crate::config::SkyvernConfig;
use crate::envelope::ApiFailure;
use crate::error::{Error, Result};

/// Static user agent for outbound requests.
pub const CLIENT_USER_AGENT: &str = concat!("skyvern-mcp/", env!("CARGO_PKG_VERSION"));

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Skyvern engine version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
pub enum Engine {
    /// `skyvern-1.0`.
    #[serde(rename = "skyvern-1.0")]
    V1,
    /// `skyvern-2.0`.
    #[default]
    #[serde(rename = "skyvern-2.0")]
    V2,
}

/// Request body for `POST /v1/run/tasks`.
///
/// Optional fields are left out of the serialized payload when unset.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct TaskRequest {
    /// Starting URL.
    pub url: String,
    /// Natural-language goal.
    pub prompt: String,
    /// Task title.
    pub title: String,
    /// Engine version.
    #[serde(default)]
    pub engine: Engine,
    /// Proxy location tag.
    #[serde(default = "default_proxy_location")]
    pub proxy_location: String,
    /// Schema of the data to extract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_extraction_schema: Option<Value>,
    /// Custom error-code to message mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code_mapping: Option<Value>,
    /// Step budget.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Status webhook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// TOTP identifier for pushed codes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totp_identifier: Option<String>,
    /// TOTP polling endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totp_url: Option<String>,
    /// Browser session to continue from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_session_id: Option<String>,
    /// Publish the task as a reusable workflow.
    #[serde(default)]
    pub publish_workflow: bool,
}

fn default_proxy_location() -> String {
    "RESIDENTIAL".to_string()
}

fn default_max_steps() -> u32 {
    10
}

impl TaskRequest {
    /// Create a request with only the required fields set.
    pub fn new(url: impl Into<String>, prompt: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            prompt: prompt.into(),
            title: title.into(),
            engine: Engine::default(),
            proxy_location: default_proxy_location(),
            data_extraction_schema: None,
            error_code_mapping: None,
            max_steps: default_max_steps(),
            webhook_url: None,
            totp_identifier: None,
            totp_url: None,
            browser_session_id: None,
            publish_workflow: false,
        }
    }

    /// Check field constraints the type system does not carry.
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(Error::InvalidParams("max_steps must be a positive integer".into()));
        }
        Ok(())
    }
}

/// Which endpoint a call targets; selects the internal-error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `POST /v1/run/tasks`.
    Initiate,
    /// `GET /v1/runs/{run_id}`.
    Details,
    /// `POST /v1/runs/{run_id}/cancel`.
    Cancel,
}

impl Operation {
    /// Short name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Operation::Initiate => "initiate_task",
            Operation::Details => "get_task_details",
            Operation::Cancel => "cancel_task",
        }
    }

    /// Message used for `InternalServerError` envelopes.
    pub fn internal_message(self) -> &'static str {
        match self {
            Operation::Initiate => {
                "An unexpected error occurred while processing the Skyvern task initiation."
            }
            Operation::Details => {
                "An unexpected error occurred while retrieving the Skyvern task details."
            }
            Operation::Cancel => "An unexpected error occurred while canceling the Skyvern task.",
        }
    }
}

/// Client for the task endpoints.
///
/// The underlying connection pool is shared by clones; the client itself
/// carries no per-call state.
#[derive(Clone)]
pub struct SkyvernClient {
    http: reqwest::Client,
    base_url: String,
    api_key: HeaderValue,
}

impl SkyvernClient {
    /// Build a client from configuration.
    pub fn new(config: &SkyvernConfig) -> Result<Self> {
        let mut api_key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| Error::Config(format!("invalid SKYVERN_API_KEY: {e}")))?;
        api_key.set_sensitive(true);

        // 3xx replies are reported as API errors, not followed.
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key,
        })
    }

    /// Start a task.
    pub async fn initiate_task(&self, request: &TaskRequest) -> Value {
        let op = Operation::Initiate;
        let outcome = match serde_json::to_value(request) {
            Ok(payload) => {
                let url = format!("{}/v1/run/tasks", self.base_url);
                let req = self
                    .http
                    .post(url)
                    .headers(self.headers(true))
                    .json(&payload);
                send(req).await
            }
            Err(e) => Err(ApiFailure::Unclassified(e.to_string())),
        };
        finish(op, outcome)
    }

    /// Fetch a run.
    pub async fn get_task_details(&self, run_id: &str) -> Value {
        let op = Operation::Details;
        let outcome = match self.run_url(run_id, None) {
            Ok(url) => send(self.http.get(url).headers(self.headers(false))).await,
            Err(failure) => Err(failure),
        };
        finish(op, outcome)
    }

    /// Cancel a run.
    pub async fn cancel_task(&self, run_id: &str) -> Value {
        let op = Operation::Cancel;
        let outcome = match self.run_url(run_id, Some("cancel")) {
            Ok(url) => send(self.http.post(url).headers(self.headers(true))).await,
            Err(failure) => Err(failure),
        };
        finish(op, outcome)
    }

    fn headers(&self, json_content: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, self.api_key.clone());
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        if json_content {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        headers
    }

    /// `<base>/v1/runs/{run_id}[/suffix]` with `run_id` encoded as one segment.
    fn run_url(
        &self,
        run_id: &str,
        suffix: Option<&str>,
    ) -> std::result::Result<url::Url, ApiFailure> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| ApiFailure::Network(format!("invalid base URL '{}': {e}", self.base_url)))?;
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                ApiFailure::Network(format!("base URL '{}' cannot carry a path", self.base_url))
            })?;
            segments.pop_if_empty().extend(["v1", "runs", run_id]);
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        Ok(url)
    }
}

/// Send a request and classify the outcome.
pub(crate) async fn send(request: reqwest::RequestBuilder) -> std::result::Result<Value, ApiFailure> {
    let response = request
        .send()
        .await
        .map_err(|e| ApiFailure::from_transport(&e))?;
    let status = response.status();

    if !status.is_success() {
        let body = response
            .text()
            .await
            .map_err(|e| ApiFailure::from_transport(&e))?;
        return Err(ApiFailure::Status {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiFailure::from_transport(&e))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiFailure::Decode(e.to_string()))
}

fn finish(op: Operation, outcome: std::result::Result<Value, ApiFailure>) -> Value {
    match outcome {
        Ok(body) => body,
        Err(failure) => {
            failure.log(op.name());
            failure.to_envelope(op.internal_message())
        }
    }
}
