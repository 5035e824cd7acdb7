//! Server-sent-events listener with auto-reconnect.
//!
//! Connects to the Miele API's `/devices/all/events` endpoint and consumes
//! the indefinite `text/event-stream` response, dispatching parsed payloads
//! to registered callbacks. Survives network stalls (per-line liveness
//! timeout), malformed payloads, and server-side disconnects, reconnecting
//! with a fixed delay and a freshly fetched token each time.
//!
//! # Example
//!
//! ```rust,ignore
//! use miele_api::{EventHandlers, ListenConfig, MieleClient};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let handlers = EventHandlers::new()
//!     .on_devices(|payload| async move {
//!         println!("devices: {payload}");
//!     })
//!     .on_actions(|payload| async move {
//!         println!("actions: {payload}");
//!     });
//!
//! let handle = client.listen_events(handlers, ListenConfig::default(), cancel.clone())?;
//! // ... later
//! handle.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::Stream;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::TokenProvider;
use crate::error::Error;

// ── Event kinds ──────────────────────────────────────────────────────

/// The length of the `data: ` prefix on an SSE data line.
const DATA_PREFIX_LEN: usize = 6;

/// The category of one event frame, classified from its `event:` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Full device-state document for all devices.
    Devices,
    /// Action-availability document for all devices.
    Actions,
    /// Server keep-alive; carries no payload of interest.
    Ping,
    /// Anything else. Logged and skipped, never an error.
    Unknown,
}

impl EventKind {
    /// Classify an `event:` line by exact match.
    fn classify(line: &str) -> Self {
        match line {
            "event: devices" => Self::Devices,
            "event: actions" => Self::Actions,
            "event: ping" => Self::Ping,
            _ => Self::Unknown,
        }
    }
}

// ── Callback registry ────────────────────────────────────────────────

type EventCallback = Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Callbacks for the two event categories, set once at listen-start.
///
/// Each dispatch is spawned as a detached task -- the read loop never
/// waits for a callback, so a slow consumer cannot stall the stream or
/// trip the liveness timeout. Consecutive dispatches may run overlapping
/// and in any order; handlers must be safe to run concurrently. The
/// listener cannot observe a handler's outcome: a panicking handler only
/// kills its own task.
#[derive(Clone, Default)]
pub struct EventHandlers {
    devices: Option<EventCallback>,
    actions: Option<EventCallback>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `event: devices` frames.
    pub fn on_devices<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.devices = Some(Arc::new(move |payload| Box::pin(handler(payload))));
        self
    }

    /// Register the handler for `event: actions` frames.
    pub fn on_actions<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.actions = Some(Arc::new(move |payload| Box::pin(handler(payload))));
        self
    }
}

// ── ListenConfig ─────────────────────────────────────────────────────

/// Timeout and retry configuration for the listener.
///
/// The two-timeout scheme distinguishes "server unreachable" (connect
/// timeout, short) from "server reachable but silently stalled" (read
/// timeout, generously longer than the server's 20 s ping interval).
/// The retry delay is fixed: no exponential growth, no retry cap -- the
/// listener is designed to run forever.
#[derive(Debug, Clone)]
pub struct ListenConfig {
    /// Bound on establishing the streaming connection. Default: 5 s.
    pub connect_timeout: Duration,

    /// Liveness bound on each line read; six times the server's nominal
    /// 20 s ping interval. Default: 120 s.
    pub read_timeout: Duration,

    /// Fixed delay before every reconnect attempt. Default: 5 s.
    pub retry_delay: Duration,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(120),
            retry_delay: Duration::from_secs(5),
        }
    }
}

// ── ListenerHandle ───────────────────────────────────────────────────

/// Handle to a running event listener.
///
/// The background task reconnects forever until [`shutdown`](Self::shutdown)
/// is called (or the supplied [`CancellationToken`] is cancelled by the
/// owner). Dropping the handle does not stop the task.
pub struct ListenerHandle {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl ListenerHandle {
    /// Spawn the listener loop. Returns immediately; the first connection
    /// attempt happens asynchronously.
    pub(crate) fn spawn(
        http: reqwest::Client,
        events_url: Url,
        token_provider: Arc<dyn TokenProvider>,
        handlers: EventHandlers,
        config: ListenConfig,
        cancel: CancellationToken,
    ) -> Self {
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            listen_loop(http, events_url, token_provider, handlers, config, task_cancel).await;
        });

        Self { cancel, task }
    }

    /// Signal the listener to shut down. In-flight callback tasks are not
    /// waited for.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether the background task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the background task to exit after a shutdown.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → stream → on any failure, fixed backoff → reconnect.
///
/// Every exit from a connection -- HTTP error, liveness timeout, malformed
/// payload, clean server close -- takes the same path: log, sleep
/// `retry_delay`, re-fetch the token, reconnect. Only cancellation ends
/// the loop.
async fn listen_loop(
    http: reqwest::Client,
    events_url: Url,
    token_provider: Arc<dyn TokenProvider>,
    handlers: EventHandlers,
    config: ListenConfig,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = connect_and_stream(&http, &events_url, token_provider.as_ref(), &handlers, &config) => {
                match result {
                    Ok(()) => {
                        tracing::warn!("event stream closed by server, reconnecting");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "event stream error, reconnecting");
                    }
                }

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.retry_delay) => {}
                }
            }
        }
    }

    // Reachable via break, but select!'s macro expansion hides that
    // from the compiler.
    #[allow(unreachable_code)]
    {
        tracing::debug!("event listener exiting");
    }
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Open one streaming connection and consume frames until it fails.
///
/// Returns `Ok(())` if the server ended the stream, `Err` on any HTTP,
/// liveness, or payload failure. The response is dropped (and with it the
/// connection closed) before the caller's next attempt begins, so at most
/// one streaming connection is ever live per listener.
async fn connect_and_stream(
    http: &reqwest::Client,
    events_url: &Url,
    token_provider: &dyn TokenProvider,
    handlers: &EventHandlers,
    config: &ListenConfig,
) -> Result<(), Error> {
    // Fresh token on every connect; an expired token is never reused
    // across reconnects.
    let token = token_provider.access_token().await?;

    let resp = http
        .get(events_url.clone())
        .bearer_auth(token.expose_secret())
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(Error::Transport)?;

    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            message: format!("event stream rejected bearer token (HTTP {})", status.as_u16()),
        });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Http {
            status: status.as_u16(),
            body,
        });
    }

    tracing::info!("event stream connected");

    let mut lines = LineReader::new(resp.bytes_stream());

    loop {
        // Liveness bound: the server pings every 20 s, so a silent gap of
        // `read_timeout` means the connection is dead even if the socket
        // still looks open.
        let Ok(line) = tokio::time::timeout(config.read_timeout, lines.next_line()).await else {
            tracing::warn!("ping timeout, closing connection");
            return Err(Error::Timeout {
                timeout_secs: config.read_timeout.as_secs(),
            });
        };

        let Some(line) = line? else {
            // Server closed the stream.
            return Ok(());
        };

        if line.is_empty() {
            // Stray separator between frames.
            continue;
        }

        let kind = EventKind::classify(&line);
        if kind == EventKind::Unknown {
            tracing::error!(line = %line, "unknown event type");
        }

        // Consume the rest of the frame up to the blank separator,
        // remembering the data line. Ping frames may or may not carry one.
        let mut data_line = None;
        loop {
            let Ok(next) = tokio::time::timeout(config.read_timeout, lines.next_line()).await
            else {
                tracing::warn!("ping timeout mid-frame, closing connection");
                return Err(Error::Timeout {
                    timeout_secs: config.read_timeout.as_secs(),
                });
            };
            match next? {
                None => return Ok(()),
                Some(l) if l.is_empty() => break,
                Some(l) => {
                    if l.starts_with("data:") && data_line.is_none() {
                        data_line = Some(l);
                    }
                }
            }
        }

        match kind {
            EventKind::Devices => dispatch(data_line.as_deref(), handlers.devices.as_ref())?,
            EventKind::Actions => dispatch(data_line.as_deref(), handlers.actions.as_ref())?,
            EventKind::Ping | EventKind::Unknown => {}
        }
    }
}

/// Parse a frame's data line and hand the payload to the callback as a
/// detached task. A JSON decode failure is an error (the connection is
/// recycled); a missing callback just drops the parsed payload.
fn dispatch(data_line: Option<&str>, callback: Option<&EventCallback>) -> Result<(), Error> {
    let data_line = data_line.unwrap_or("");
    let payload = parse_data_line(data_line)?;
    if let Some(callback) = callback {
        // Fire and forget: the read loop never waits for a handler.
        tokio::spawn(callback(payload));
    }
    Ok(())
}

/// Strip the `data: ` prefix and decode the JSON payload.
fn parse_data_line(line: &str) -> Result<serde_json::Value, Error> {
    let payload = line.get(DATA_PREFIX_LEN..).unwrap_or("");
    serde_json::from_str(payload).map_err(|e| Error::MalformedPayload {
        message: e.to_string(),
        data: line.to_string(),
    })
}

// ── Line reader ──────────────────────────────────────────────────────

/// Splits a byte stream into text lines.
///
/// Lines are delimited by `\n`; a trailing `\r` is stripped. Bytes are
/// decoded lossily -- the protocol is ASCII apart from localized names
/// inside JSON payloads, and a replacement character there surfaces as a
/// JSON parse error rather than a crash.
struct LineReader<S> {
    stream: S,
    buf: BytesMut,
    done: bool,
}

impl<S> LineReader<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::new(),
            done: false,
        }
    }

    /// Read the next line, or `None` when the stream has ended.
    async fn next_line(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let mut line = self.buf.split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            if self.done {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                // Unterminated trailing line.
                let line = String::from_utf8_lossy(self.buf.chunk()).into_owned();
                self.buf.clear();
                return Ok(Some(line));
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(Error::Transport(e)),
                None => self.done = true,
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;

    fn chunked(parts: &[&str]) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Unpin {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        stream::iter(chunks)
    }

    #[test]
    fn classify_event_lines() {
        assert_eq!(EventKind::classify("event: devices"), EventKind::Devices);
        assert_eq!(EventKind::classify("event: actions"), EventKind::Actions);
        assert_eq!(EventKind::classify("event: ping"), EventKind::Ping);
        assert_eq!(EventKind::classify("event: frobnicate"), EventKind::Unknown);
        // Classification is exact-match; near misses are unknown.
        assert_eq!(EventKind::classify("event:devices"), EventKind::Unknown);
        assert_eq!(EventKind::classify(" event: devices"), EventKind::Unknown);
    }

    #[test]
    fn parse_data_line_strips_prefix() {
        let value = parse_data_line(r#"data: {"123":{"state":{}}}"#).unwrap();
        assert_eq!(value, serde_json::json!({"123": {"state": {}}}));
    }

    #[test]
    fn parse_data_line_rejects_bad_json() {
        let err = parse_data_line("data: {not json").unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }));
    }

    #[test]
    fn parse_data_line_rejects_empty() {
        assert!(parse_data_line("").is_err());
        assert!(parse_data_line("data: ").is_err());
    }

    #[test]
    fn default_listen_config() {
        let config = ListenConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(120));
        assert_eq!(config.retry_delay, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn line_reader_splits_lines() {
        let mut lines = LineReader::new(chunked(&["event: ping\ndata: ping\n\n"]));

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("event: ping"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("data: ping"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn line_reader_handles_chunk_boundaries() {
        let mut lines = LineReader::new(chunked(&["event: dev", "ices\ndata: {", "}\n\n"]));

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("event: devices"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("data: {}"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn line_reader_strips_carriage_returns() {
        let mut lines = LineReader::new(chunked(&["event: ping\r\n\r\n"]));

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("event: ping"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn line_reader_returns_unterminated_tail() {
        let mut lines = LineReader::new(chunked(&["event: ping"]));

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("event: ping"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_trips_liveness_timeout() {
        let mut lines = LineReader::new(stream::pending::<Result<Bytes, reqwest::Error>>());

        let read = tokio::time::timeout(Duration::from_secs(120), lines.next_line());
        // Paused clock auto-advances; the read must give up at the deadline.
        assert!(read.await.is_err());
    }

    #[tokio::test]
    async fn handlers_dispatch_detached() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handlers = EventHandlers::new().on_devices(move |payload| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(payload);
            }
        });

        dispatch(
            Some(r#"data: {"123":{"state":{}}}"#),
            handlers.devices.as_ref(),
        )
        .unwrap();

        let payload = rx.recv().await.unwrap();
        assert_eq!(payload, serde_json::json!({"123": {"state": {}}}));
    }

    #[tokio::test]
    async fn dispatch_without_callback_still_parses() {
        assert!(dispatch(Some(r#"data: {"ok":true}"#), None).is_ok());
        assert!(dispatch(Some("data: not json"), None).is_err());
    }
}
