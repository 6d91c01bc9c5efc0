use std::{collections::BTreeMap, fmt, future::Future, time::Duration};

use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    StatusCode,
};
use tokio::time::sleep;

use crate::{
    AttemptStatus, CallReport, Result, RetryPolicy, RpcAttempt, RpcError, RpcRequest, RpcResponse,
    TransportConfig,
};

/// Executes RPC requests with bounded retries and exponential backoff.
///
/// Stateless apart from the pooled HTTP client: clones share connections,
/// and concurrent calls never observe each other.
#[derive(Clone)]
pub struct ResilientTransport {
    http: reqwest::Client,
    config: TransportConfig,
}

impl fmt::Debug for ResilientTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Result of a single physical attempt.
#[derive(Debug)]
enum AttemptOutcome {
    Success(RpcResponse),
    /// Server or network failure; another attempt may succeed.
    Retryable(RpcError),
    /// Client error or unusable request; stop now.
    Fatal(RpcError),
}

impl ResilientTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self::with_http_client(reqwest::Client::new(), config)
    }

    /// Uses a preconfigured `reqwest::Client` (proxies, TLS roots, pools).
    pub fn with_http_client(http: reqwest::Client, config: TransportConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Executes `request` under the configured default policy.
    pub async fn execute(&self, request: &RpcRequest) -> Result<RpcResponse> {
        self.execute_with(request, &self.config.policy).await
    }

    /// Executes `request` under `policy`.
    ///
    /// Returns the first 2xx/3xx response. A 4xx fails immediately with
    /// [`RpcError::Client`]; 5xx and network failures are retried until the
    /// budget runs out, then fail with [`RpcError::RetriesExhausted`].
    pub async fn execute_with(
        &self,
        request: &RpcRequest,
        policy: &RetryPolicy,
    ) -> Result<RpcResponse> {
        self.execute_traced(request, policy).await.into_result()
    }

    /// Like [`execute_with`](Self::execute_with), also returning every
    /// attempt with the wait observed before it.
    pub async fn execute_traced(&self, request: &RpcRequest, policy: &RetryPolicy) -> CallReport {
        self.run(request, policy, std::future::pending()).await
    }

    /// Like [`execute_with`](Self::execute_with), ending early with
    /// [`RpcError::Cancelled`] once `cancel` resolves.
    ///
    /// Cancellation is observed both while an attempt is in flight and
    /// during backoff.
    pub async fn execute_cancellable<F>(
        &self,
        request: &RpcRequest,
        policy: &RetryPolicy,
        cancel: F,
    ) -> Result<RpcResponse>
    where
        F: Future<Output = ()>,
    {
        self.run(request, policy, cancel).await.into_result()
    }

    async fn run<F>(&self, request: &RpcRequest, policy: &RetryPolicy, cancel: F) -> CallReport
    where
        F: Future<Output = ()>,
    {
        let mut attempts = Vec::new();
        let headers = match merge_headers(request.headers()) {
            Ok(headers) => headers,
            Err(err) => {
                return CallReport {
                    attempts,
                    result: Err(err),
                }
            }
        };

        tokio::pin!(cancel);
        let max_attempts = policy.max_attempts();
        let mut number = 1u32;
        let mut waited = Duration::ZERO;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = &mut cancel => return cancelled(attempts, number),
                outcome = self.attempt_once(request, &headers, policy, number) => outcome,
            };

            match outcome {
                AttemptOutcome::Success(response) => {
                    attempts.push(RpcAttempt {
                        number,
                        waited,
                        status: AttemptStatus::Succeeded {
                            status: response.status(),
                        },
                    });
                    return CallReport {
                        attempts,
                        result: Ok(response),
                    };
                }
                AttemptOutcome::Fatal(err) => {
                    attempts.push(failed_attempt(number, waited, &err));

                    #[cfg(feature = "tracing")]
                    tracing::error!(attempt = number, url = %request.url(), "rpc call failed: {err}");

                    return CallReport {
                        attempts,
                        result: Err(err),
                    };
                }
                AttemptOutcome::Retryable(err) => {
                    attempts.push(failed_attempt(number, waited, &err));

                    if number >= max_attempts {
                        #[cfg(feature = "tracing")]
                        tracing::error!(
                            attempts = number,
                            url = %request.url(),
                            "rpc call exhausted retries: {err}"
                        );

                        return CallReport {
                            attempts,
                            result: Err(RpcError::RetriesExhausted {
                                attempts: number,
                                last: Box::new(err),
                            }),
                        };
                    }

                    let delay = policy.backoff_for(number);

                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        attempt = number,
                        delay_ms = delay.as_millis() as u64,
                        "retrying rpc request: {err}"
                    );

                    tokio::select! {
                        biased;
                        _ = &mut cancel => return cancelled(attempts, number),
                        _ = sleep(delay) => {}
                    }

                    waited = delay;
                    number += 1;
                }
            }
        }
    }

    async fn attempt_once(
        &self,
        request: &RpcRequest,
        headers: &HeaderMap,
        policy: &RetryPolicy,
        number: u32,
    ) -> AttemptOutcome {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            attempt = number,
            method = %request.method(),
            url = %request.url(),
            "sending rpc request"
        );

        let mut builder = self
            .http
            .request(request.method().clone(), request.url())
            .headers(headers.clone());
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.to_vec());
        }
        if let Some(timeout) = policy.attempt_timeout() {
            builder = builder.timeout(timeout);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return classify_transport_error(err),
        };

        let status = response.status();
        let response_headers = response.headers().clone();
        let body = match response.bytes().await {
            Ok(body) => body.to_vec(),
            Err(err) => return classify_transport_error(err),
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(attempt = number, status = status.as_u16(), "rpc response");

        classify_response(status, response_headers, body, number)
    }
}

fn classify_response(
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    attempt: u32,
) -> AttemptOutcome {
    let code = status.as_u16();
    match code {
        200..=399 => AttemptOutcome::Success(RpcResponse::new(code, headers, body)),
        400..=499 => AttemptOutcome::Fatal(RpcError::Client {
            status: code,
            reason: reason_phrase(status),
            body: String::from_utf8_lossy(&body).into_owned(),
            attempt,
        }),
        _ => AttemptOutcome::Retryable(RpcError::Server {
            status: code,
            reason: reason_phrase(status),
            body: String::from_utf8_lossy(&body).into_owned(),
        }),
    }
}

fn classify_transport_error(err: reqwest::Error) -> AttemptOutcome {
    // A request reqwest refuses to build fails the same way on every attempt.
    if err.is_builder() {
        AttemptOutcome::Fatal(RpcError::InvalidRequest(err.to_string()))
    } else {
        AttemptOutcome::Retryable(RpcError::Network(err))
    }
}

fn reason_phrase(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or_default().to_owned()
}

/// Default `Content-Type: application/json`, overridden by caller headers.
fn merge_headers(caller: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    for (key, value) in caller {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|err| RpcError::InvalidRequest(format!("invalid header name '{key}': {err}")))?;
        let value = HeaderValue::from_str(value).map_err(|err| {
            RpcError::InvalidRequest(format!("invalid value for header '{key}': {err}"))
        })?;
        headers.insert(name, value);
    }

    Ok(headers)
}

fn failed_attempt(number: u32, waited: Duration, err: &RpcError) -> RpcAttempt {
    let status = match err.kind() {
        Some(kind) => AttemptStatus::Failed {
            kind,
            status: err.status(),
        },
        None => AttemptStatus::Rejected,
    };
    RpcAttempt {
        number,
        waited,
        status,
    }
}

fn cancelled(attempts: Vec<RpcAttempt>, started: u32) -> CallReport {
    #[cfg(feature = "tracing")]
    tracing::debug!(attempts = started, "rpc call cancelled");

    CallReport {
        attempts,
        result: Err(RpcError::Cancelled { attempts: started }),
    }
}
