// Async HTTP client for submitting analysis requests to the external RCA service.
//
// Submission is fire-and-forget: the service answers 2xx immediately and
// posts its result back to our callback route later.

use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::auth::AuthProvider;
use crate::transport::TransportConfig;
use crate::Error;

/// Default submission path, relative to the platform base URL.
pub const DEFAULT_SUBMIT_PATH: &str = "/api/itops-rca/v1/analyses";

#[derive(Debug, Clone)]
pub struct RcaClient {
    http: reqwest::Client,
    endpoint: Url,
    auth: AuthProvider,
    timeout_secs: u64,
}

impl RcaClient {
    pub fn new(
        base_url: &str,
        submit_path: &str,
        auth: AuthProvider,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let endpoint = Url::parse(base_url)?.join(submit_path)?;
        Ok(Self {
            http: transport.build_client()?,
            endpoint,
            auth,
            timeout_secs: transport.timeout_secs(),
        })
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, endpoint: Url, auth: AuthProvider) -> Self {
        Self {
            http,
            endpoint,
            auth,
            timeout_secs: 0,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POST the request body. Any 2xx is an acceptance.
    pub async fn submit<B: Serialize + Sync>(&self, body: &B) -> Result<(), Error> {
        debug!("POST {}", self.endpoint);

        let mut builder = self.http.post(self.endpoint.clone()).json(body);
        if let Some(value) = self.auth.header_value()? {
            builder = builder.header(AUTHORIZATION, value);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_secs: self.timeout_secs,
                }
            } else {
                Error::Transport(e)
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let raw = resp.text().await.unwrap_or_default();
        Err(Error::Rca {
            status: status.as_u16(),
            message: if raw.is_empty() {
                status.to_string()
            } else {
                raw
            },
        })
    }
}
