/// Failure classification used by the retry loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// 4xx response. Never retried.
    Client,
    /// 5xx (or otherwise unexpected) response. Retried while budget remains.
    Server,
    /// Connection failure, timeout or abort. Retried while budget remains.
    Network,
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Non-retryable 4xx response.
    #[error("client error {status} {reason} (attempt {attempt}): {body}")]
    Client {
        status: u16,
        reason: String,
        body: String,
        /// Attempt on which the response arrived.
        attempt: u32,
    },
    /// Retryable 5xx response.
    #[error("server error {status} {reason}: {body}")]
    Server {
        status: u16,
        reason: String,
        body: String,
    },
    /// Network or request execution error from `reqwest`.
    #[error("network error: {0}")]
    Network(reqwest::Error),
    /// The attempt budget ran out without a success.
    #[error("retries exhausted after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        attempts: u32,
        /// Failure of the final attempt, either `Server` or `Network`.
        #[source]
        last: Box<RpcError>,
    },
    /// The caller's cancellation signal fired.
    #[error("call cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
    /// Request could not be built (bad header, bad procedure name, bad URL).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Error envelope returned by a backend procedure.
    #[error("procedure error {code}: {message}")]
    Procedure {
        /// Symbolic code such as `BAD_REQUEST` or `NOT_FOUND`.
        code: String,
        message: String,
        http_status: Option<u16>,
        /// Procedure path reported by the backend.
        path: Option<String>,
    },
    /// Procedure input could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),
    /// Response decoding or envelope-shape validation error.
    #[error("decode error: {0}")]
    Decode(String),
}

impl RpcError {
    /// Classification of the underlying transport failure.
    ///
    /// Looks through `RetriesExhausted`. `None` for errors raised outside
    /// the retry loop.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Client { .. } => Some(ErrorKind::Client),
            Self::Server { .. } => Some(ErrorKind::Server),
            Self::Network(_) => Some(ErrorKind::Network),
            Self::RetriesExhausted { last, .. } => last.kind(),
            Self::Procedure { .. }
            | Self::Cancelled { .. }
            | Self::InvalidRequest(_)
            | Self::Encode(_)
            | Self::Decode(_) => None,
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Network(_))
    }

    /// Last HTTP status observed, if the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::Network(err) => err.status().map(|status| status.as_u16()),
            Self::RetriesExhausted { last, .. } => last.status(),
            Self::Procedure { http_status, .. } => *http_status,
            _ => None,
        }
    }

    /// Number of attempts made, when the error records it.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Client { attempt, .. } => Some(*attempt),
            Self::RetriesExhausted { attempts, .. } | Self::Cancelled { attempts } => {
                Some(*attempts)
            }
            _ => None,
        }
    }
}
