//! HTTP transport
//!
//! Posts JSON to `<server_url>/<endpoint>` with reqwest. Beacons run on a
//! detached worker thread with its own blocking client so they outlive the
//! async runtime; outstanding beacons are joined when the transport drops.

use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::error::TransportError;
use super::transport::{Endpoint, Transport};
use crate::config::Config;

/// Header carrying the CSRF token expected by the server
pub const CSRF_HEADER: &str = "x-token-pm";

/// reqwest-backed [`Transport`]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
    csrf_token: Option<String>,
    timeout: Duration,
    beacons: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpTransport {
    /// Create a transport for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            csrf_token: None,
            timeout,
            beacons: Mutex::new(Vec::new()),
        })
    }

    /// Build a transport from configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let Some(ref url) = config.server_url else {
            anyhow::bail!("Server URL not configured");
        };
        let transport = Self::new(url, config.request_timeout())?;
        Ok(match config.csrf_token {
            Some(ref token) => transport.with_csrf_token(token),
            None => transport,
        })
    }

    /// Attach a CSRF token to every request
    pub fn with_csrf_token(mut self, token: &str) -> Self {
        self.csrf_token = Some(token.to_string());
        self
    }

    /// Full URL of an endpoint
    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }

    fn map_error(endpoint: Endpoint, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout {
                endpoint: endpoint.path(),
            }
        } else if let Some(status) = error.status() {
            TransportError::Status {
                endpoint: endpoint.path(),
                status: status.as_u16(),
            }
        } else {
            TransportError::Network {
                endpoint: endpoint.path(),
                message: error.to_string(),
            }
        }
    }

    fn beacon_handles(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.beacons.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for HttpTransport {
    async fn post<Req, Resp>(&self, endpoint: Endpoint, request: &Req) -> Result<Resp, TransportError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request).map_err(|e| TransportError::Encode {
            endpoint: endpoint.path(),
            message: e.to_string(),
        })?;

        let url = self.url(endpoint);
        debug!("POST {} ({} bytes)", url, body.len());

        let mut builder = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(ref token) = self.csrf_token {
            builder = builder.header(CSRF_HEADER, token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: endpoint.path(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::map_error(endpoint, e))?;

        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode {
            endpoint: endpoint.path(),
            message: e.to_string(),
        })
    }

    fn send_beacon(&self, endpoint: Endpoint, payload: Vec<u8>) {
        let url = self.url(endpoint);
        let token = self.csrf_token.clone();
        let timeout = self.timeout;

        let handle = std::thread::spawn(move || {
            let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
                Ok(client) => client,
                Err(e) => {
                    warn!("Beacon client for {} could not be built: {}", url, e);
                    return;
                }
            };

            let mut builder = client
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .body(payload);
            if let Some(token) = token {
                builder = builder.header(CSRF_HEADER, token);
            }

            match builder.send() {
                Ok(response) => debug!("Beacon to {} answered {}", url, response.status()),
                Err(e) => warn!("Beacon to {} failed: {}", url, e),
            }
        });

        let mut handles = self.beacon_handles();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        let handles = std::mem::take(&mut *self.beacon_handles());
        for handle in handles {
            let _ = handle.join();
        }
    }
}
