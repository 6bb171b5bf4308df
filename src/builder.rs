//! `reqwest` extension: `client.with_payments(handler)` wraps a client in [`X402Middleware`].
//!
//! ```rust,no_run
//! use x402_openai::builder::{ReqwestWithPayments, ReqwestWithPaymentsBuild};
//! use x402_openai::client::X402Client;
//!
//! let http = reqwest::Client::new()
//!     .with_payments(X402Client::new())
//!     .build();
//! ```

use reqwest::{Client, ClientBuilder};
use reqwest_middleware as rqm;

use crate::transport::{PaymentHandler, X402Middleware};

pub trait ReqwestWithPayments<A, H> {
    fn with_payments(self, handler: H) -> ReqwestWithPaymentsBuilder<A, H>;
}

impl<H: PaymentHandler> ReqwestWithPayments<Client, H> for Client {
    fn with_payments(self, handler: H) -> ReqwestWithPaymentsBuilder<Client, H> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            handler,
        }
    }
}

impl<H: PaymentHandler> ReqwestWithPayments<ClientBuilder, H> for ClientBuilder {
    fn with_payments(self, handler: H) -> ReqwestWithPaymentsBuilder<ClientBuilder, H> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            handler,
        }
    }
}

pub struct ReqwestWithPaymentsBuilder<A, H> {
    inner: A,
    handler: H,
}

pub trait ReqwestWithPaymentsBuild {
    type BuildResult;
    type BuilderResult;

    fn build(self) -> Self::BuildResult;
    fn builder(self) -> Self::BuilderResult;
}

impl<H> ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<Client, H>
where
    H: PaymentHandler + 'static,
{
    type BuildResult = rqm::ClientWithMiddleware;
    type BuilderResult = rqm::ClientBuilder;

    fn build(self) -> Self::BuildResult {
        self.builder().build()
    }

    fn builder(self) -> Self::BuilderResult {
        rqm::ClientBuilder::new(self.inner).with(X402Middleware::new(self.handler))
    }
}

impl<H> ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<ClientBuilder, H>
where
    H: PaymentHandler + 'static,
{
    type BuildResult = Result<rqm::ClientWithMiddleware, reqwest::Error>;
    type BuilderResult = Result<rqm::ClientBuilder, reqwest::Error>;

    fn build(self) -> Self::BuildResult {
        let builder = self.builder()?;
        Ok(builder.build())
    }

    fn builder(self) -> Self::BuilderResult {
        let client = self.inner.build()?;
        Ok(rqm::ClientBuilder::new(client).with(X402Middleware::new(self.handler)))
    }
}
