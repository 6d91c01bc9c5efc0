//! `chatlink-rpc` is the resilient RPC link between the chatlink chat client
//! and its backend.
//!
//! - [`ResilientTransport::execute`] runs one logical call as up to
//!   `max_retries` HTTP attempts with exponential backoff, retrying server
//!   and network failures and failing fast on client errors.
//! - [`ChatRpcClient::query`] and [`ChatRpcClient::mutation`] call typed
//!   backend procedures over that transport.

mod client;
mod config;
mod error;
mod options;
mod transport;
mod types;
mod wire;

pub use client::ChatRpcClient;
pub use config::{TransportConfig, BASE_URL_ENV, DEFAULT_BASE_URL, DEFAULT_RPC_PATH};
pub use error::{ErrorKind, RpcError};
pub use options::RetryPolicy;
pub use transport::ResilientTransport;
pub use types::{AttemptStatus, CallReport, RpcAttempt, RpcRequest, RpcResponse};
pub use wire::Envelope;

pub type Result<T> = std::result::Result<T, RpcError>;
