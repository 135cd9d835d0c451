//! HTTP binding layer: URL classification and the intercepting client.

mod classify;
mod client;
mod transport;

pub use classify::{extract_endpoint, is_api_request};
pub use client::InterceptedClient;
pub use transport::{HttpResponse, ReqwestTransport, RequestOptions, Transport};
