use bytes::Bytes;
use http::{Extensions, HeaderMap, StatusCode, Version};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::flow::{FlowAction, PaymentFlow};
use super::{AsyncTransport, PaymentHandler, merge_payment_headers};
use crate::error::X402Error;

/// One hop down the stack: an inner transport or the rest of a middleware chain.
pub(crate) trait SendRequest: Send {
    type Error: From<reqwest::Error> + Send;

    fn send_request(
        &mut self,
        request: Request,
    ) -> impl Future<Output = Result<Response, Self::Error>> + Send;
}

/// Walks a [`PaymentFlow`] for one request over `sender`.
pub(crate) async fn drive_async<H, S>(
    handler: &H,
    sender: &mut S,
    request: Request,
) -> Result<Response, S::Error>
where
    H: PaymentHandler + ?Sized,
    S: SendRequest,
{
    let retry = request.try_clone();
    let mut flow = PaymentFlow::new();
    flow.dispatch(request.method(), request.url());

    let response = sender.send_request(request).await?;
    match flow.on_response(response.status()) {
        FlowAction::ReadChallenge => {}
        _ => return Ok(response),
    }

    let original = BufferedResponse::read(response).await?;
    let outcome = if retry.is_some() {
        handler
            .handle_payment_required(&original.headers, &original.body)
            .await
    } else {
        Err(X402Error::RequestNotCloneable)
    };

    match (flow.on_payment(outcome), retry) {
        (FlowAction::Retry(payment_headers), Some(mut retry)) => {
            merge_payment_headers(retry.headers_mut(), payment_headers);
            let retried = sender.send_request(retry).await?;
            flow.on_response(retried.status());
            Ok(retried)
        }
        _ => Ok(original.into_response()),
    }
}

/// A 402 whose body had to be read to answer the challenge.
struct BufferedResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl BufferedResponse {
    async fn read(response: Response) -> Result<Self, reqwest::Error> {
        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Self {
            status,
            version,
            headers,
            body,
        })
    }

    fn into_response(self) -> Response {
        let mut response = http::Response::new(self.body);
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers;
        Response::from(response)
    }
}

/// Async transport that pays 402 challenges and retries once.
#[derive(Debug, Clone)]
pub struct AsyncX402Transport<T, H> {
    inner: T,
    handler: H,
}

struct InnerTransport<'a, T>(&'a T);

impl<T: AsyncTransport> SendRequest for InnerTransport<'_, T> {
    type Error = T::Error;

    fn send_request(
        &mut self,
        request: Request,
    ) -> impl Future<Output = Result<Response, Self::Error>> + Send {
        self.0.send(request)
    }
}

impl<T, H> AsyncX402Transport<T, H>
where
    T: AsyncTransport,
    H: PaymentHandler,
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

    pub async fn send(&self, request: Request) -> Result<Response, T::Error> {
        drive_async(&self.handler, &mut InnerTransport(&self.inner), request).await
    }

    pub fn close(&self) {
        self.inner.close();
    }
}

impl<T, H> AsyncTransport for AsyncX402Transport<T, H>
where
    T: AsyncTransport,
    H: PaymentHandler,
{
    type Error = T::Error;

    fn send(&self, request: Request) -> impl Future<Output = Result<Response, Self::Error>> + Send {
        AsyncX402Transport::send(self, request)
    }

    fn close(&self) {
        AsyncX402Transport::close(self);
    }
}

/// `close` is a no-op: the connection pool goes away when the last clone of
/// the client is dropped.
impl AsyncTransport for reqwest::Client {
    type Error = reqwest::Error;

    fn send(&self, request: Request) -> impl Future<Output = Result<Response, Self::Error>> + Send {
        self.execute(request)
    }
}

/// `reqwest-middleware` layer paying 402 challenges with `H`.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use reqwest_middleware::ClientBuilder;
/// use x402_openai::client::X402Client;
/// use x402_openai::transport::X402Middleware;
///
/// let payments = Arc::new(X402Client::new());
/// let http = ClientBuilder::new(reqwest::Client::new())
///     .with(X402Middleware::new(payments))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct X402Middleware<H> {
    handler: H,
}

impl<H: PaymentHandler> X402Middleware<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

struct NextSender<'a> {
    next: rqm::Next<'a>,
    extensions: &'a mut Extensions,
}

impl SendRequest for NextSender<'_> {
    type Error = rqm::Error;

    fn send_request(
        &mut self,
        request: Request,
    ) -> impl Future<Output = rqm::Result<Response>> + Send {
        self.next.clone().run(request, &mut *self.extensions)
    }
}

#[async_trait::async_trait]
impl<H> rqm::Middleware for X402Middleware<H>
where
    H: PaymentHandler + 'static,
{
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.middleware.handle", skip_all, fields(method = %req.method(), url = %req.url()))
    )]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let mut sender = NextSender { next, extensions };
        drive_async(&self.handler, &mut sender, req).await
    }
}
