//! Blocking HTTP client with bounded retries.
//!
//! The transport is a trait so the retry loop and everything above it can be
//! exercised against scripted responses; [HttpTransport] is the reqwest
//! implementation used by the CLI.

use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Client identifier sent with every request.
pub const CLIENT_ID: &str = concat!("ficfetch/", env!("CARGO_PKG_VERSION"));

/// Connect timeout: fail fast when the host is unreachable.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 6;
/// Read timeout: generous, ebook bodies can be large.
const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;
const MAX_REDIRECTS: usize = 10;

/// Default number of attempts for get_with_retry (initial plus retries).
const DEFAULT_RETRY_COUNT: u32 = 4;
/// Default backoff delays in seconds after each retryable-status attempt.
const DEFAULT_BACKOFF_SECS: [u64; 3] = [1, 2, 4];
/// Fixed delay before retrying a connect/timeout failure.
const DEFAULT_TRANSIENT_DELAY_SECS: u64 = 3;

/// Statuses retried with backoff. Everything else surfaces immediately.
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Error from one transport-level GET.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Connect and timeout failures are worth retrying; anything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Connect(_) | TransportError::Timeout(_))
    }
}

/// A completed GET: final status and the full body.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// One blocking GET with query parameters. Implementations follow redirects.
pub trait Transport {
    fn get(&mut self, url: &str, query: &[(&str, &str)]) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport with the fixed client identifier.
#[derive(Debug)]
pub struct HttpTransport {
    inner: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn build(
        user_agent: &str,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let inner = reqwest::blocking::Client::builder()
            .user_agent(user_agent.to_string())
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { inner })
    }
}

impl Transport for HttpTransport {
    fn get(&mut self, url: &str, query: &[(&str, &str)]) -> Result<TransportResponse, TransportError> {
        let response = self
            .inner
            .get(url)
            .query(query)
            .send()
            .map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(map_reqwest_error)?
            .to_vec();
        Ok(TransportResponse { status, body })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

/// Retry wrapper around a [Transport].
///
/// Retryable HTTP statuses (429 and the 5xx gateway family) back off
/// exponentially; connect/timeout failures wait a fixed short delay. The
/// total attempt count is bounded. Exhausted retries fail the single URL
/// being fetched, never the batch.
#[derive(Debug)]
pub struct ApiClient<T: Transport> {
    transport: T,
    retry_count: u32,
    backoff_secs: Vec<u64>,
    transient_delay_secs: u64,
}

impl ApiClient<HttpTransport> {
    /// Builder for the reqwest-backed client.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }
}

impl<T: Transport> ApiClient<T> {
    /// Wrap a custom transport. Used by tests and embedders; the CLI goes
    /// through [ApiClient::builder].
    pub fn with_transport(
        transport: T,
        retry_count: u32,
        backoff_secs: Vec<u64>,
        transient_delay_secs: u64,
    ) -> Self {
        Self {
            transport,
            retry_count: retry_count.max(1),
            backoff_secs,
            transient_delay_secs,
        }
    }

    /// GET with the retry policy applied. Returns the response only for a
    /// success status; a non-retryable or retry-exhausted status maps to
    /// [FetchError::HttpStatus](crate::fetch::FetchError), transport
    /// exhaustion to [FetchError::Network](crate::fetch::FetchError).
    pub fn get_with_retry(
        &mut self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<TransportResponse, crate::fetch::FetchError> {
        let max_attempts = self.retry_count;
        for attempt in 0..max_attempts {
            match self.transport.get(url, query) {
                Ok(response) => {
                    let retryable = RETRYABLE_STATUSES.contains(&response.status);
                    if retryable && attempt < max_attempts - 1 {
                        let backoff = self
                            .backoff_secs
                            .get(attempt as usize)
                            .copied()
                            .unwrap_or_else(|| *self.backoff_secs.last().unwrap_or(&1));
                        debug!(status = response.status, url, backoff, "retrying after status");
                        std::thread::sleep(Duration::from_secs(backoff));
                        continue;
                    }
                    if !(200..300).contains(&response.status) {
                        return Err(crate::fetch::FetchError::HttpStatus {
                            status: response.status,
                            url: url.to_string(),
                        });
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if e.is_retryable() && attempt < max_attempts - 1 {
                        debug!(url, error = %e, delay = self.transient_delay_secs, "retrying after transport error");
                        std::thread::sleep(Duration::from_secs(self.transient_delay_secs));
                        continue;
                    }
                    return Err(crate::fetch::FetchError::Network {
                        url: url.to_string(),
                        source: e,
                    });
                }
            }
        }
        Err(crate::fetch::FetchError::Network {
            url: url.to_string(),
            source: TransportError::Other("retry attempts exhausted".to_string()),
        })
    }
}

/// Builder for the HTTP-backed [ApiClient].
#[derive(Debug)]
pub struct ApiClientBuilder {
    user_agent: Option<String>,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
    retry_count: u32,
    retry_backoff_secs: Vec<u64>,
    transient_delay_secs: u64,
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
            transient_delay_secs: DEFAULT_TRANSIENT_DELAY_SECS,
        }
    }
}

impl ApiClientBuilder {
    /// Override the User-Agent. Defaults to the fixed client identifier.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn read_timeout_secs(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self
    }

    /// Total HTTP attempts for retryable failures (default 4).
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n.max(1);
        self
    }

    /// Backoff delays in seconds before each status retry (e.g. [1, 2, 4]).
    /// If shorter than the retry count, the last value is reused.
    pub fn retry_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        self.retry_backoff_secs = secs;
        self
    }

    /// Fixed delay before retrying a connect/timeout failure (default 3).
    pub fn transient_delay_secs(mut self, secs: u64) -> Self {
        self.transient_delay_secs = secs;
        self
    }

    pub fn build(self) -> Result<ApiClient<HttpTransport>, reqwest::Error> {
        let user_agent = self.user_agent.unwrap_or_else(|| CLIENT_ID.to_string());
        let transport = HttpTransport::build(
            &user_agent,
            self.connect_timeout_secs,
            self.read_timeout_secs,
        )?;
        let backoff_secs = if self.retry_backoff_secs.is_empty() {
            let n = self.retry_count.saturating_sub(1) as usize;
            (0..n).map(|i| 1u64 << i.min(4)).collect::<Vec<_>>()
        } else {
            self.retry_backoff_secs
        };
        Ok(ApiClient {
            transport,
            retry_count: self.retry_count,
            backoff_secs,
            transient_delay_secs: self.transient_delay_secs,
        })
    }
}

#[cfg(test)]
impl<T: Transport> ApiClient<T> {
    /// Test-only view of the wrapped transport.
    pub(crate) fn transport_ref(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted step for the fake transport.
    pub enum Step {
        Status(u16, Vec<u8>),
        Fail(TransportError),
    }

    /// Transport that replays a script and records every request.
    pub struct ScriptedTransport {
        steps: VecDeque<Step>,
        pub requests: Vec<(String, Vec<(String, String)>)>,
    }

    impl ScriptedTransport {
        pub fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
                requests: Vec::new(),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn get(
            &mut self,
            url: &str,
            query: &[(&str, &str)],
        ) -> Result<TransportResponse, TransportError> {
            self.requests.push((
                url.to_string(),
                query
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ));
            match self.steps.pop_front() {
                Some(Step::Status(status, body)) => Ok(TransportResponse { status, body }),
                Some(Step::Fail(e)) => Err(e),
                None => Ok(TransportResponse {
                    status: 200,
                    body: Vec::new(),
                }),
            }
        }
    }

    /// Client over a scripted transport with zeroed delays so tests never sleep.
    pub fn scripted_client(steps: Vec<Step>) -> ApiClient<ScriptedTransport> {
        ApiClient::with_transport(ScriptedTransport::new(steps), 4, vec![0, 0, 0], 0)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{scripted_client, Step};
    use super::*;
    use crate::fetch::FetchError;

    #[test]
    fn success_first_attempt_returns_body() {
        let mut client = scripted_client(vec![Step::Status(200, b"payload".to_vec())]);
        let response = client.get_with_retry("https://api.test/x", &[]).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"payload");
    }

    #[test]
    fn three_503s_then_200_succeeds_within_budget() {
        let mut client = scripted_client(vec![
            Step::Status(503, Vec::new()),
            Step::Status(503, Vec::new()),
            Step::Status(503, Vec::new()),
            Step::Status(200, b"ok".to_vec()),
        ]);
        let response = client.get_with_retry("https://api.test/x", &[]).unwrap();
        assert_eq!(response.status, 200);
    }

    #[test]
    fn fourth_consecutive_503_surfaces_http_status() {
        let mut client = scripted_client(vec![
            Step::Status(503, Vec::new()),
            Step::Status(503, Vec::new()),
            Step::Status(503, Vec::new()),
            Step::Status(503, Vec::new()),
        ]);
        let err = client.get_with_retry("https://api.test/x", &[]).unwrap_err();
        match err {
            FetchError::HttpStatus { status, .. } => assert_eq!(status, 503),
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[test]
    fn non_retryable_status_fails_immediately() {
        let mut client = scripted_client(vec![
            Step::Status(404, Vec::new()),
            Step::Status(200, Vec::new()),
        ]);
        let err = client.get_with_retry("https://api.test/x", &[]).unwrap_err();
        match err {
            FetchError::HttpStatus { status, .. } => assert_eq!(status, 404),
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[test]
    fn timeout_then_success_retries() {
        let mut client = scripted_client(vec![
            Step::Fail(TransportError::Timeout("read timed out".to_string())),
            Step::Status(200, b"ok".to_vec()),
        ]);
        let response = client.get_with_retry("https://api.test/x", &[]).unwrap();
        assert_eq!(response.status, 200);
    }

    #[test]
    fn non_retryable_transport_error_fails_immediately() {
        let mut client = scripted_client(vec![
            Step::Fail(TransportError::Other("tls handshake".to_string())),
            Step::Status(200, Vec::new()),
        ]);
        let err = client.get_with_retry("https://api.test/x", &[]).unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
    }

    #[test]
    fn exhausted_transport_retries_surface_network_error() {
        let mut client = scripted_client(vec![
            Step::Fail(TransportError::Connect("refused".to_string())),
            Step::Fail(TransportError::Connect("refused".to_string())),
            Step::Fail(TransportError::Connect("refused".to_string())),
            Step::Fail(TransportError::Connect("refused".to_string())),
        ]);
        let err = client.get_with_retry("https://api.test/x", &[]).unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
    }

    #[test]
    fn retry_count_floor_is_one_attempt() {
        let mut client = ApiClient::with_transport(
            super::test_support::ScriptedTransport::new(vec![Step::Status(503, Vec::new())]),
            0,
            vec![0],
            0,
        );
        let err = client.get_with_retry("https://api.test/x", &[]).unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 503, .. }));
    }
}
