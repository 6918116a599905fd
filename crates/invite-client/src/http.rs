//! reqwest-backed submitter
//!
//! Every attempt is a POST of `{"invite_code": "<token>"}` with the bearer
//! credential, device id and user agent attached. The reqwest client carries
//! a finite timeout so a stalled endpoint can never pin a worker forever.

use std::str::FromStr;
use std::time::Duration;

use common::{Secret, Token};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Result, SubmitError};
use crate::{SubmitFuture, Submitter};

/// Extra header attached to every submission (name + value pair from config).
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

/// Everything needed to build an `HttpSubmitter`.
#[derive(Debug, Clone)]
pub struct HttpSubmitterConfig {
    pub endpoint: String,
    pub credential: Secret<String>,
    pub device_id_header: String,
    pub device_id: String,
    pub user_agent: String,
    pub headers: Vec<HeaderInjection>,
    pub timeout: Duration,
}

/// Production submitter.
pub struct HttpSubmitter {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
}

impl HttpSubmitter {
    /// Build the client and the fixed header set.
    ///
    /// A malformed credential, device-id header, or user agent is a hard
    /// configuration error. Malformed extra headers are skipped with a warning.
    pub fn new(config: HttpSubmitterConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let mut auth = HeaderValue::from_str(&config.credential.bearer()).map_err(|_| {
            SubmitError::Config("bearer credential is not a valid header value".into())
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let device_header = HeaderName::from_str(&config.device_id_header).map_err(|e| {
            SubmitError::Config(format!(
                "invalid device id header name {:?}: {e}",
                config.device_id_header
            ))
        })?;
        let device_value = HeaderValue::from_str(&config.device_id)
            .map_err(|e| SubmitError::Config(format!("invalid device id: {e}")))?;
        headers.insert(device_header, device_value);

        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| SubmitError::Config(format!("invalid user agent: {e}")))?;
        headers.insert(USER_AGENT, user_agent);

        inject_headers(&mut headers, &config.headers);

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SubmitError::Config(format!("failed to build HTTP client: {e}")))?;

        debug!(
            endpoint = %config.endpoint,
            timeout_secs = config.timeout.as_secs_f64(),
            headers = headers.len(),
            "http submitter ready"
        );

        Ok(Self {
            client,
            endpoint: config.endpoint,
            headers,
        })
    }
}

/// Add configured headers, never touching `authorization`.
fn inject_headers(headers: &mut HeaderMap, injections: &[HeaderInjection]) {
    for injection in injections {
        let name = match HeaderName::from_str(&injection.name) {
            Ok(n) => n,
            Err(e) => {
                warn!(header = %injection.name, error = %e, "skipping invalid header name");
                continue;
            }
        };
        if name == AUTHORIZATION {
            warn!(header = %injection.name, "refusing to overwrite authorization header");
            continue;
        }
        let value = match HeaderValue::from_str(&injection.value) {
            Ok(v) => v,
            Err(e) => {
                warn!(header = %injection.name, error = %e, "skipping invalid header value");
                continue;
            }
        };
        headers.insert(name, value);
    }
}

impl Submitter for HttpSubmitter {
    fn id(&self) -> &str {
        "http"
    }

    fn submit<'a>(&'a self, token: &'a Token) -> SubmitFuture<'a> {
        Box::pin(async move {
            let body = serde_json::json!({ "invite_code": token.as_str() });
            let response = self
                .client
                .post(&self.endpoint)
                .headers(self.headers.clone())
                .json(&body)
                .send()
                .await
                .map_err(SubmitError::from_reqwest)?;
            Ok(response.status().as_u16())
        })
    }
}
