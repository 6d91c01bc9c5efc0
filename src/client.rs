use reqwest::Url;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    wire::{decode_envelope, decode_error, encode_input, Envelope},
    ResilientTransport, Result, RetryPolicy, RpcError, RpcRequest, TransportConfig,
};

#[derive(Clone, Debug)]
/// Typed client for the chat backend's RPC procedures.
///
/// Every call goes through a [`ResilientTransport`], so queries and
/// mutations share the same retry and backoff behavior.
pub struct ChatRpcClient {
    transport: ResilientTransport,
}

impl ChatRpcClient {
    /// Creates a client for the backend described by `config`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use chatlink_rpc::{ChatRpcClient, TransportConfig};
    ///
    /// let client = ChatRpcClient::new(TransportConfig::new("https://chat.example.com"));
    /// ```
    pub fn new(config: TransportConfig) -> Self {
        Self::from_transport(ResilientTransport::new(config))
    }

    pub fn from_transport(transport: ResilientTransport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &ResilientTransport {
        &self.transport
    }

    /// Calls a query procedure (`GET`, input in the query string).
    pub async fn query<I, O>(&self, procedure: &str, input: &I) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        self.query_with(procedure, input, &self.transport.config().policy)
            .await
    }

    /// Calls a query procedure under an explicit retry policy.
    pub async fn query_with<I, O>(
        &self,
        procedure: &str,
        input: &I,
        policy: &RetryPolicy,
    ) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let request = self.query_request(procedure, input)?;
        self.call(&request, policy).await
    }

    /// Calls a mutation procedure (`POST`, input in the body).
    pub async fn mutation<I, O>(&self, procedure: &str, input: &I) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        self.mutation_with(procedure, input, &self.transport.config().policy)
            .await
    }

    /// Calls a mutation procedure under an explicit retry policy.
    pub async fn mutation_with<I, O>(
        &self,
        procedure: &str,
        input: &I,
        policy: &RetryPolicy,
    ) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let request = self.mutation_request(procedure, input)?;
        self.call(&request, policy).await
    }

    /// Calls a query procedure and returns the output with its superjson
    /// `meta`, for callers that need the original type annotations.
    pub async fn query_enveloped<I, O>(&self, procedure: &str, input: &I) -> Result<Envelope<O>>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let request = self.query_request(procedure, input)?;
        self.call_enveloped(&request, &self.transport.config().policy)
            .await
    }

    /// Calls a mutation procedure and returns the output with its superjson
    /// `meta`.
    pub async fn mutation_enveloped<I, O>(
        &self,
        procedure: &str,
        input: &I,
    ) -> Result<Envelope<O>>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let request = self.mutation_request(procedure, input)?;
        self.call_enveloped(&request, &self.transport.config().policy)
            .await
    }

    fn query_request<I>(&self, procedure: &str, input: &I) -> Result<RpcRequest>
    where
        I: Serialize + ?Sized,
    {
        validate_procedure(procedure)?;
        let url = self.transport.config().procedure_url(procedure);
        let mut url = Url::parse(&url)
            .map_err(|err| RpcError::InvalidRequest(format!("invalid url '{url}': {err}")))?;
        if let Some(input) = encode_input(input)? {
            url.query_pairs_mut().append_pair("input", &input);
        }
        Ok(RpcRequest::get(url.as_str()))
    }

    fn mutation_request<I>(&self, procedure: &str, input: &I) -> Result<RpcRequest>
    where
        I: Serialize + ?Sized,
    {
        validate_procedure(procedure)?;
        let url = self.transport.config().procedure_url(procedure);
        let request = RpcRequest::post(url);
        Ok(match encode_input(input)? {
            Some(body) => request.body(body),
            None => request,
        })
    }

    async fn call<O>(&self, request: &RpcRequest, policy: &RetryPolicy) -> Result<O>
    where
        O: DeserializeOwned,
    {
        self.call_enveloped(request, policy)
            .await
            .map(|envelope| envelope.json)
    }

    async fn call_enveloped<O>(
        &self,
        request: &RpcRequest,
        policy: &RetryPolicy,
    ) -> Result<Envelope<O>>
    where
        O: DeserializeOwned,
    {
        let response = self
            .transport
            .execute_with(request, policy)
            .await
            .map_err(into_procedure_error)?;
        decode_envelope(response.body())
    }
}

/// Replaces a 4xx carrying an error envelope with the procedure error.
fn into_procedure_error(err: RpcError) -> RpcError {
    match err {
        RpcError::Client { ref body, status, .. } => match decode_error(body) {
            Some(RpcError::Procedure {
                code,
                message,
                http_status,
                path,
            }) => RpcError::Procedure {
                code,
                message,
                http_status: http_status.or(Some(status)),
                path,
            },
            _ => err,
        },
        other => other,
    }
}

fn validate_procedure(procedure: &str) -> Result<()> {
    let invalid = procedure.is_empty()
        || procedure
            .chars()
            .any(|ch| ch.is_whitespace() || matches!(ch, '/' | '?' | '#'));
    if invalid {
        return Err(RpcError::InvalidRequest(format!(
            "invalid procedure name '{procedure}'"
        )));
    }
    Ok(())
}
