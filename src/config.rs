use crate::RetryPolicy;

/// Environment variable read by [`TransportConfig::from_env`].
pub const BASE_URL_ENV: &str = "CHATLINK_API_BASE_URL";

/// Base URL used when the environment provides none.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Path of the RPC handler under the base URL.
pub const DEFAULT_RPC_PATH: &str = "/api/trpc";

/// Where the backend lives and how calls to it are retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    pub base_url: String,
    pub rpc_path: String,
    /// Policy for calls that do not pass their own.
    pub policy: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            rpc_path: DEFAULT_RPC_PATH.to_owned(),
            policy: RetryPolicy::default(),
        }
    }

    /// Builds a config from `CHATLINK_API_BASE_URL`.
    ///
    /// Meant for process startup code. Falls back to
    /// `http://localhost:3000` when the variable is missing or blank.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use chatlink_rpc::TransportConfig;
    ///
    /// let config = TransportConfig::from_env();
    /// println!("{}", config.endpoint());
    /// ```
    pub fn from_env() -> Self {
        let base_url = resolve_base_url(std::env::var(BASE_URL_ENV).ok());

        #[cfg(feature = "tracing")]
        tracing::info!(base_url = %base_url, "resolved rpc base url");

        Self::new(base_url)
    }

    pub fn with_rpc_path(mut self, rpc_path: impl Into<String>) -> Self {
        self.rpc_path = rpc_path.into();
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Base URL and RPC path joined with exactly one `/`.
    ///
    /// Example: `"http://host/"` + `"api/trpc"` → `"http://host/api/trpc"`
    pub fn endpoint(&self) -> String {
        let base = self.base_url.trim().trim_end_matches('/');
        let path = self.rpc_path.trim().trim_matches('/');
        if path.is_empty() {
            base.to_owned()
        } else {
            format!("{base}/{path}")
        }
    }

    /// URL of a single procedure.
    pub fn procedure_url(&self, procedure: &str) -> String {
        format!("{}/{procedure}", self.endpoint())
    }
}

fn resolve_base_url(value: Option<String>) -> String {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned())
}
