use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};

use super::flow::{FlowAction, PaymentFlow};
use super::{BlockingPaymentHandler, Transport, merge_payment_headers};

/// Blocking transport that pays 402 challenges and retries once.
///
/// Runs entirely on the caller's thread.
#[derive(Debug, Clone)]
pub struct X402Transport<T, H> {
    inner: T,
    handler: H,
}

impl<T, H> X402Transport<T, H>
where
    T: Transport,
    H: BlockingPaymentHandler,
{
    pub fn new(inner: T, handler: H) -> Self {
        Self { inner, handler }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn send(&self, request: http::Request<Bytes>) -> Result<http::Response<Bytes>, T::Error> {
        let retry = RetryTemplate::capture(&request);
        let mut flow = PaymentFlow::new();
        flow.dispatch(&retry.method, &retry.uri);

        let response = self.inner.send(request)?;
        match flow.on_response(response.status()) {
            FlowAction::ReadChallenge => {}
            _ => return Ok(response),
        }

        let outcome = self
            .handler
            .handle_payment_required(response.headers(), response.body());
        match flow.on_payment(outcome) {
            FlowAction::Retry(payment_headers) => {
                let retried = self.inner.send(retry.into_request(payment_headers))?;
                flow.on_response(retried.status());
                Ok(retried)
            }
            _ => Ok(response),
        }
    }

    pub fn close(&self) {
        self.inner.close();
    }
}

impl<T, H> Transport for X402Transport<T, H>
where
    T: Transport,
    H: BlockingPaymentHandler,
{
    type Error = T::Error;

    fn send(&self, request: http::Request<Bytes>) -> Result<http::Response<Bytes>, Self::Error> {
        X402Transport::send(self, request)
    }

    fn close(&self) {
        X402Transport::close(self);
    }
}

/// What is needed to rebuild the request for the paid retry.
struct RetryTemplate {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl RetryTemplate {
    fn capture(request: &http::Request<Bytes>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
            body: request.body().clone(),
        }
    }

    fn into_request(self, payment_headers: HeaderMap) -> http::Request<Bytes> {
        let mut headers = self.headers;
        merge_payment_headers(&mut headers, payment_headers);
        let mut request = http::Request::new(self.body);
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.version_mut() = self.version;
        *request.headers_mut() = headers;
        request
    }
}

impl Transport for reqwest::blocking::Client {
    type Error = reqwest::Error;

    fn send(&self, request: http::Request<Bytes>) -> Result<http::Response<Bytes>, Self::Error> {
        let request = reqwest::blocking::Request::try_from(request.map(|body| body.to_vec()))?;
        let response = self.execute(request)?;

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let body = response.bytes()?;

        let mut converted = http::Response::new(body);
        *converted.status_mut() = status;
        *converted.version_mut() = version;
        *converted.headers_mut() = headers;
        Ok(converted)
    }
}
