// Miele API HTTP client
//
// Wraps `reqwest::Client` with bearer-token injection, URL construction,
// and status-to-error mapping. Every call fetches a fresh token from the
// injected provider -- no token is ever cached here, so an expiring
// credential is always the provider's problem, never the transport's.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::auth::TokenProvider;
use crate::error::Error;
use crate::events::{EventHandlers, ListenConfig, ListenerHandle};
use crate::model::{Device, DeviceActions, ProgramAvailable};
use crate::transport::{MIELE_API, TransportConfig};

/// Authenticated client for the Miele 3rd-party cloud API.
///
/// All single-shot operations are direct request/response calls with no
/// internal retry; errors propagate to the caller. The long-lived event
/// stream is started separately via [`listen_events`](Self::listen_events).
pub struct MieleClient {
    http: reqwest::Client,
    base_url: Url,
    token_provider: Arc<dyn TokenProvider>,
    config: TransportConfig,
}

impl MieleClient {
    /// Create a client against the production API.
    pub fn new(
        token_provider: Arc<dyn TokenProvider>,
        config: TransportConfig,
    ) -> Result<Self, Error> {
        let base_url = Url::parse(MIELE_API)?;
        Self::with_base_url(base_url, token_provider, config)
    }

    /// Create a client against an arbitrary base URL (tests, proxies).
    pub fn with_base_url(
        base_url: Url,
        token_provider: Arc<dyn TokenProvider>,
        config: TransportConfig,
    ) -> Result<Self, Error> {
        let http = config.build_client()?;
        Ok(Self {
            http,
            base_url,
            token_provider,
            config,
        })
    }

    /// The API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Request primitive ────────────────────────────────────────────

    /// Build a full URL for an API path.
    fn api_url(&self, path: &str) -> Result<Url, Error> {
        let full = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&full)?)
    }

    /// Send an authenticated request and return the checked response.
    ///
    /// Fetches a fresh token from the provider, attaches the bearer header,
    /// and maps non-2xx statuses to errors: 401/403 become
    /// [`Error::Authentication`], everything else [`Error::Http`] with the
    /// raw body attached.
    pub(crate) async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, Error> {
        let url = self.api_url(path)?;
        debug!("{} {}", method, url);

        let token = self.token_provider.access_token().await?;

        let mut req = self
            .http
            .request(method, url)
            .bearer_auth(token.expose_secret())
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| self.map_send_error(e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Authentication {
                message: format!("API rejected bearer token (HTTP {})", status.as_u16()),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp)
    }

    /// Distinguish the overall deadline from other transport failures.
    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                timeout_secs: self.config.timeout.as_secs(),
            }
        } else {
            Error::Transport(e)
        }
    }

    /// GET a path and deserialize the JSON response body.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let resp = self.request(Method::GET, path, None).await?;
        let body = resp.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| Error::MalformedPayload {
            message: e.to_string(),
            data: body,
        })
    }

    /// PUT a JSON body to a path, discarding the response body.
    async fn put_json(&self, path: &str, body: &impl Serialize) -> Result<(), Error> {
        let value = serde_json::to_value(body).map_err(|e| Error::MalformedPayload {
            message: e.to_string(),
            data: String::new(),
        })?;
        let resp = self.request(Method::PUT, path, Some(&value)).await?;
        debug!("PUT {} -> {}", path, resp.status());
        Ok(())
    }

    // ── Single-shot operations ───────────────────────────────────────

    /// Get all devices, keyed by serial number.
    pub async fn get_devices(&self) -> Result<HashMap<String, Device>, Error> {
        self.get_json("/devices").await
    }

    /// Get a single device by serial number.
    pub async fn get_device(&self, serial: &str) -> Result<Device, Error> {
        self.get_json(&format!("/devices/{serial}")).await
    }

    /// Get the currently available actions for a device.
    pub async fn get_actions(&self, serial: &str) -> Result<DeviceActions, Error> {
        self.get_json(&format!("/devices/{serial}/actions")).await
    }

    /// Get the programs supported by a device.
    pub async fn get_programs(&self, serial: &str) -> Result<Vec<ProgramAvailable>, Error> {
        self.get_json(&format!("/devices/{serial}/programs")).await
    }

    /// Get the rooms known to a device (robotic vacuums).
    pub async fn get_rooms(&self, serial: &str) -> Result<serde_json::Value, Error> {
        self.get_json(&format!("/devices/{serial}/rooms")).await
    }

    /// Set the target temperature for a zone, in whole degrees Celsius.
    ///
    /// The API accepts integer degrees only; the value is rounded to the
    /// nearest whole degree before sending.
    pub async fn set_target_temperature(
        &self,
        serial: &str,
        temperature: f64,
        zone: i32,
    ) -> Result<(), Error> {
        #[allow(clippy::cast_possible_truncation)]
        let value = temperature.round() as i64;
        let body = serde_json::json!({
            "targetTemperature": [{ "zone": zone, "value": value }]
        });
        self.put_json(&format!("/devices/{serial}/actions"), &body)
            .await
    }

    /// Send a raw action command to a device.
    ///
    /// The body shape is action-specific; see [`DeviceActions`] for what
    /// the device currently accepts.
    pub async fn send_action(
        &self,
        serial: &str,
        data: &serde_json::Value,
    ) -> Result<(), Error> {
        debug!(serial, %data, "send_action");
        self.put_json(&format!("/devices/{serial}/actions"), data)
            .await
    }

    /// Start a program on a device.
    pub async fn set_program(
        &self,
        serial: &str,
        data: &serde_json::Value,
    ) -> Result<(), Error> {
        debug!(serial, %data, "set_program");
        self.put_json(&format!("/devices/{serial}/programs"), data)
            .await
    }

    // ── Event stream ─────────────────────────────────────────────────

    /// Start the event-stream listener against `/devices/all/events`.
    ///
    /// Spawns a background task that reconnects forever (with a fresh token
    /// each time) until `cancel` is triggered. See [`crate::events`] for
    /// the protocol and recovery behavior.
    pub fn listen_events(
        &self,
        handlers: EventHandlers,
        listen: ListenConfig,
        cancel: CancellationToken,
    ) -> Result<ListenerHandle, Error> {
        let http = self.config.build_streaming_client(listen.connect_timeout)?;
        let events_url = self.api_url("/devices/all/events")?;
        Ok(ListenerHandle::spawn(
            http,
            events_url,
            Arc::clone(&self.token_provider),
            handlers,
            listen,
            cancel,
        ))
    }
}
