// Shared transport configuration for building reqwest::Client instances.
//
// The request client and the streaming client share user-agent and TLS
// settings through this module but differ in their timeout scheme: requests
// carry an overall deadline, while the event stream must only bound the
// connect phase (legitimate gaps between server pings make any read
// deadline at the client level a liveness hazard).

use std::time::Duration;

/// Base user-agent sent with every request, optionally suffixed by the
/// caller through [`TransportConfig::agent_suffix`].
pub const USER_AGENT_BASE: &str = concat!("MieleRs/", env!("CARGO_PKG_VERSION"));

/// Production base URL of the Miele 3rd-party API.
pub const MIELE_API: &str = "https://api.mcs3.miele.com/v1";

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Overall deadline for single-shot requests (connect + read + body).
    pub timeout: Duration,
    /// Optional tag appended to the user-agent as `"MieleRs/x.y.z; <tag>"`.
    pub agent_suffix: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            agent_suffix: None,
        }
    }
}

impl TransportConfig {
    /// The full user-agent string, with the optional suffix applied.
    pub fn user_agent(&self) -> String {
        match &self.agent_suffix {
            Some(suffix) => format!("{USER_AGENT_BASE}; {suffix}"),
            None => USER_AGENT_BASE.to_string(),
        }
    }

    /// Build the client used for single-shot requests.
    ///
    /// Carries the overall [`timeout`](Self::timeout) so no call can hang
    /// past its deadline.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent())
            .build()
            .map_err(crate::error::Error::Transport)
    }

    /// Build the client used for the event stream.
    ///
    /// Bounds only the connect phase; the response body is indefinite, so
    /// no total or read deadline is set. Liveness of the open stream is the
    /// listener's responsibility (per-line read timeout).
    pub fn build_streaming_client(
        &self,
        connect_timeout: Duration,
    ) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(self.user_agent())
            .build()
            .map_err(crate::error::Error::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_without_suffix() {
        let config = TransportConfig::default();
        assert_eq!(config.user_agent(), USER_AGENT_BASE);
    }

    #[test]
    fn user_agent_with_suffix() {
        let config = TransportConfig {
            agent_suffix: Some("HomeAssistant".into()),
            ..TransportConfig::default()
        };
        assert_eq!(config.user_agent(), format!("{USER_AGENT_BASE}; HomeAssistant"));
    }
}
