use std::{collections::BTreeMap, time::Duration};

use reqwest::{header::HeaderMap, Method};
use serde::de::DeserializeOwned;

use crate::{ErrorKind, Result, RpcError};

/// One outbound HTTP request, immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcRequest {
    url: String,
    method: Method,
    headers: BTreeMap<String, String>,
    body: Option<Vec<u8>>,
}

impl RpcRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Adds a header. Caller headers override the transport defaults.
    ///
    /// Names are case-insensitive and stored lowercase; setting the same
    /// name twice keeps the last value.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

/// Response of the successful attempt. The transport keeps no copy.
#[derive(Clone, Debug)]
pub struct RpcResponse {
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl RpcResponse {
    pub(crate) fn new(status: u16, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    /// Body as UTF-8 text.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.body)
            .map_err(|err| RpcError::Decode(format!("response body is not UTF-8: {err}")))
    }

    /// Body parsed as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|err| {
            RpcError::Decode(format!(
                "invalid response JSON: {err}; body: {}",
                String::from_utf8_lossy(&self.body)
            ))
        })
    }
}

/// How one attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptStatus {
    Succeeded { status: u16 },
    Failed { kind: ErrorKind, status: Option<u16> },
    /// The request could not be sent at all.
    Rejected,
}

/// Diagnostic record of one physical attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcAttempt {
    /// 1-based ordinal within the logical call.
    pub number: u32,
    /// Backoff observed before this attempt started.
    pub waited: Duration,
    pub status: AttemptStatus,
}

/// Every attempt of one logical call plus its final result.
#[derive(Debug)]
pub struct CallReport {
    pub attempts: Vec<RpcAttempt>,
    pub result: Result<RpcResponse>,
}

impl CallReport {
    /// Backoff waits observed between attempts, in order.
    pub fn waits(&self) -> Vec<Duration> {
        self.attempts
            .iter()
            .skip(1)
            .map(|attempt| attempt.waited)
            .collect()
    }

    pub fn into_result(self) -> Result<RpcResponse> {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use reqwest::{header::HeaderMap, Method};

    use super::{RpcRequest, RpcResponse};

    #[test]
    fn request_builder_keeps_fields() {
        let request = RpcRequest::post("http://localhost:3000/api/trpc/chat.send")
            .header("X-Client", "mobile")
            .body(r#"{"json":{}}"#);
        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.url(), "http://localhost:3000/api/trpc/chat.send");
        assert_eq!(request.headers().get("x-client").map(String::as_str), Some("mobile"));
        assert_eq!(request.body_bytes(), Some(br#"{"json":{}}"#.as_slice()));
    }

    #[test]
    fn header_names_differing_in_case_collapse_to_last_value() {
        let request = RpcRequest::get("http://localhost:3000/api/trpc/ping")
            .header("X-A", "first")
            .header("x-a", "second")
            .header("Content-Type", "application/superjson");
        assert_eq!(request.headers().len(), 2);
        assert_eq!(request.headers().get("x-a").map(String::as_str), Some("second"));
        assert_eq!(
            request.headers().get("content-type").map(String::as_str),
            Some("application/superjson")
        );
    }

    #[test]
    fn response_success_range_includes_redirects() {
        let response = |status| RpcResponse::new(status, HeaderMap::new(), Vec::new());
        assert!(response(200).is_success());
        assert!(response(304).is_success());
        assert!(!response(400).is_success());
        assert!(!response(199).is_success());
    }

    #[test]
    fn response_json_reports_body_on_failure() {
        let response = RpcResponse::new(200, HeaderMap::new(), b"not json".to_vec());
        let err = response.json::<serde_json::Value>().expect_err("must fail");
        assert!(err.to_string().contains("not json"));
    }
}
