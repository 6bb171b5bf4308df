//! Payment-interception transports.
//!
//! A transport sends a request through an inner transport. When the response
//! is `402 Payment Required`, it asks a payment handler to answer the
//! challenge, retries the request once with the payment headers merged in, and
//! returns whatever comes back. When the challenge cannot be paid, the original
//! 402 response is returned unchanged.
//!
//! Both flavors walk the same [`flow::PaymentFlow`]:
//!
//! - [`X402Transport`] - blocking, over `http::Request<Bytes>`
//! - [`AsyncX402Transport`] - async, over `reqwest::Request`
//! - [`X402Middleware`] - the async flow as a `reqwest-middleware` layer

use bytes::Bytes;
use http::HeaderMap;
use std::sync::Arc;

use crate::client::PaymentMetadata;
use crate::error::X402Error;

mod async_impl;
mod blocking;
pub mod flow;

pub use async_impl::{AsyncX402Transport, X402Middleware};
pub use blocking::X402Transport;
pub use flow::{FlowAction, FlowState, PaymentFlow};

/// Answers a 402 challenge with payment headers, asynchronously.
#[async_trait::async_trait]
pub trait PaymentHandler: Send + Sync {
    async fn handle_payment_required(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(HeaderMap, PaymentMetadata), X402Error>;
}

/// Answers a 402 challenge with payment headers, on the caller's thread.
pub trait BlockingPaymentHandler: Send + Sync {
    fn handle_payment_required(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(HeaderMap, PaymentMetadata), X402Error>;
}

#[async_trait::async_trait]
impl<T: PaymentHandler + ?Sized> PaymentHandler for Arc<T> {
    async fn handle_payment_required(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(HeaderMap, PaymentMetadata), X402Error> {
        (**self).handle_payment_required(headers, body).await
    }
}

impl<T: BlockingPaymentHandler + ?Sized> BlockingPaymentHandler for Arc<T> {
    fn handle_payment_required(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(HeaderMap, PaymentMetadata), X402Error> {
        (**self).handle_payment_required(headers, body)
    }
}

/// A blocking HTTP transport.
pub trait Transport: Send + Sync {
    type Error;

    fn send(&self, request: http::Request<Bytes>) -> Result<http::Response<Bytes>, Self::Error>;

    /// Releases resources held by the transport.
    fn close(&self) {}
}

/// An async HTTP transport.
pub trait AsyncTransport: Send + Sync {
    type Error: From<reqwest::Error> + Send;

    fn send(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response, Self::Error>> + Send;

    /// Releases resources held by the transport.
    fn close(&self) {}
}

/// Inserts `payment` into `target`; payment headers replace same-named originals.
pub fn merge_payment_headers(target: &mut HeaderMap, payment: HeaderMap) {
    for name in payment.keys() {
        target.remove(name);
    }
    for (name, value) in payment.iter() {
        target.append(name.clone(), value.clone());
    }
}
