//! OpenAI-compatible client facade with x402 payments.
//!
//! The facade is an HTTP client pointed at an OpenAI-compatible gateway. Every
//! request carries the placeholder bearer credential; the gateway answers with
//! `402 Payment Required` and the payment layer pays from the configured
//! wallets and retries. Everything except the credential inputs and policies is
//! handed to the underlying `reqwest` client as is.
//!
//! ```rust,no_run
//! use x402_openai::openai::X402OpenAI;
//! use x402_openai::policy::prefer_network;
//! use x402_openai::wallets::EvmWallet;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = X402OpenAI::builder()
//!     .wallet(EvmWallet::from_private_key(std::env::var("EVM_PRIVATE_KEY")?))
//!     .policy(prefer_network("eip155:8453"))
//!     .build()?;
//!
//! let completion: serde_json::Value = client
//!     .post("chat/completions")
//!     .json(&serde_json::json!({
//!         "model": "gpt-4o-mini",
//!         "messages": [{"role": "user", "content": "Hello"}]
//!     }))
//!     .send()
//!     .await?
//!     .json()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use http::header::{AUTHORIZATION, HeaderName};
use http::{HeaderMap, HeaderValue, Method};
use reqwest_middleware as rqm;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::builder::{ReqwestWithPayments, ReqwestWithPaymentsBuild};
use crate::client::{PaymentClientFlavor, X402Client, X402ClientSync};
use crate::config::ClientConfig;
use crate::credentials::{Credentials, create_x402_client};
use crate::error::{ConfigError, RequestError};
use crate::policy::PaymentPolicy;
use crate::transport::X402Transport;
use crate::wallets::Wallet;

pub const DEFAULT_BASE_URL: &str = "https://llm.qntx.fun/v1";
/// Placeholder bearer token; the gateway is paid through x402, not by key.
pub const DEFAULT_API_KEY: &str = "x402";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_USER_AGENT: &str = concat!("x402-openai/", env!("CARGO_PKG_VERSION"));

/// Builder for [`X402OpenAI`] and [`BlockingX402OpenAI`].
///
/// `C` is the payment client flavor, which also types the `x402_client` input.
/// Nothing is validated until `build()`.
pub struct X402OpenAIBuilder<C> {
    credentials: Credentials<C>,
    policies: Vec<Arc<dyn PaymentPolicy>>,
    base_url: String,
    api_key: String,
    timeout: Duration,
    connect_timeout: Duration,
    default_headers: Vec<(String, String)>,
    user_agent: String,
}

impl<C> Default for X402OpenAIBuilder<C> {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            policies: Vec::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            default_headers: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl<C> fmt::Debug for X402OpenAIBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X402OpenAIBuilder")
            .field("credentials", &self.credentials)
            .field("policies", &self.policies)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl<C> X402OpenAIBuilder<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wallet<W: Wallet + 'static>(mut self, wallet: W) -> Self {
        self.credentials.wallet = Some(Arc::new(wallet));
        self
    }

    /// Wallets register in the given order, which is the order candidates are ranked in.
    pub fn wallets(mut self, wallets: impl IntoIterator<Item = Arc<dyn Wallet>>) -> Self {
        self.credentials.wallets.extend(wallets);
        self
    }

    /// Legacy shortcut: raw EVM private key.
    pub fn private_key(mut self, private_key: impl Into<String>) -> Self {
        self.credentials.private_key = Some(private_key.into());
        self
    }

    /// Legacy shortcut: EVM BIP-39 mnemonic.
    pub fn mnemonic(mut self, mnemonic: impl Into<String>) -> Self {
        self.credentials.mnemonic = Some(mnemonic.into());
        self
    }

    pub fn account_index(mut self, account_index: u32) -> Self {
        self.credentials.account_index = account_index;
        self
    }

    pub fn derivation_path(mut self, derivation_path: impl Into<String>) -> Self {
        self.credentials.derivation_path = Some(derivation_path.into());
        self
    }

    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.credentials.passphrase = Some(passphrase.into());
        self
    }

    /// Uses a fully configured payment client. Policies given to the builder are then ignored.
    pub fn x402_client(mut self, client: C) -> Self {
        self.credentials.x402_client = Some(client);
        self
    }

    pub fn policy(mut self, policy: Arc<dyn PaymentPolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn policies(mut self, policies: impl IntoIterator<Item = Arc<dyn PaymentPolicy>>) -> Self {
        self.policies.extend(policies);
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Total request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Adds a header sent with every request. Overrides the bearer credential
    /// when named `authorization`.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Applies a configuration file: its wallets and policies are appended, and
    /// the endpoint settings it names replace the current ones.
    pub fn from_config(mut self, config: &ClientConfig) -> Result<Self, ConfigError> {
        self.credentials.wallets.extend(config.build_wallets()?);
        self.policies.extend(config.build_policies());
        if let Some(base_url) = &config.base_url {
            self.base_url = base_url.to_string();
        }
        if let Some(api_key) = &config.api_key {
            self.api_key = api_key.to_string();
        }
        if let Some(secs) = config.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = config.connect_timeout_secs {
            self.connect_timeout = Duration::from_secs(secs);
        }
        Ok(self)
    }
}

/// Validated builder state shared by both facades.
struct Prepared<C> {
    payment_client: C,
    base_url: Url,
    headers: HeaderMap,
    timeout: Duration,
    connect_timeout: Duration,
    user_agent: String,
}

impl<C: PaymentClientFlavor> X402OpenAIBuilder<C> {
    fn prepare(self) -> Result<Prepared<C>, ConfigError> {
        let base_url = Url::parse(&self.base_url)?;
        let headers = default_headers(&self.api_key, &self.default_headers)?;
        let payment_client = create_x402_client(self.credentials, &self.policies)?;
        Ok(Prepared {
            payment_client,
            base_url,
            headers,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            user_agent: self.user_agent,
        })
    }
}

fn default_headers(api_key: &str, extra: &[(String, String)]) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    let mut bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|e| ConfigError::InvalidHeader(format!("authorization: {e}")))?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);
    for (name, value) in extra {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ConfigError::InvalidHeader(format!("{name}: {e}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| ConfigError::InvalidHeader(format!("{name}: {e}")))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

/// `base_url` joined with `path`, keeping the base path (`/v1`).
fn endpoint(base_url: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl X402OpenAIBuilder<X402Client> {
    pub fn build(self) -> Result<X402OpenAI, ConfigError> {
        let prepared = self.prepare()?;
        let http = reqwest::Client::builder()
            .default_headers(prepared.headers)
            .user_agent(prepared.user_agent)
            .timeout(prepared.timeout)
            .connect_timeout(prepared.connect_timeout)
            .with_payments(prepared.payment_client)
            .build()?;
        tracing::debug!(base_url = %prepared.base_url, "Built x402 OpenAI client");
        Ok(X402OpenAI {
            http,
            base_url: prepared.base_url,
        })
    }
}

impl X402OpenAIBuilder<X402ClientSync> {
    pub fn build(self) -> Result<BlockingX402OpenAI, ConfigError> {
        let prepared = self.prepare()?;
        let http = reqwest::blocking::Client::builder()
            .default_headers(prepared.headers)
            .user_agent(prepared.user_agent)
            .timeout(prepared.timeout)
            .connect_timeout(prepared.connect_timeout)
            .build()?;
        tracing::debug!(base_url = %prepared.base_url, "Built blocking x402 OpenAI client");
        Ok(BlockingX402OpenAI {
            transport: X402Transport::new(http, prepared.payment_client),
            base_url: prepared.base_url,
        })
    }
}

/// Async OpenAI-compatible client paying through x402.
#[derive(Debug, Clone)]
pub struct X402OpenAI {
    http: rqm::ClientWithMiddleware,
    base_url: Url,
}

impl X402OpenAI {
    pub fn builder() -> X402OpenAIBuilder<X402Client> {
        X402OpenAIBuilder::new()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The underlying client, with the payment middleware installed.
    pub fn http(&self) -> &rqm::ClientWithMiddleware {
        &self.http
    }

    /// A request to `path`, relative to the base URL.
    pub fn request(&self, method: Method, path: &str) -> rqm::RequestBuilder {
        self.http.request(method, endpoint(&self.base_url, path))
    }

    pub fn get(&self, path: &str) -> rqm::RequestBuilder {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> rqm::RequestBuilder {
        self.request(Method::POST, path)
    }

    /// Drops this handle to the HTTP client.
    ///
    /// The connection pool is shared by clones and is released when the last
    /// one is dropped. Requests already in flight keep their connection.
    pub fn close(self) {
        tracing::debug!(base_url = %self.base_url, "Closing x402 OpenAI client");
        drop(self.http);
    }
}

/// Blocking OpenAI-compatible client paying through x402.
///
/// Must not be used from within an async runtime.
#[derive(Debug)]
pub struct BlockingX402OpenAI {
    transport: X402Transport<reqwest::blocking::Client, X402ClientSync>,
    base_url: Url,
}

impl BlockingX402OpenAI {
    pub fn builder() -> X402OpenAIBuilder<X402ClientSync> {
        X402OpenAIBuilder::new()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn transport(&self) -> &X402Transport<reqwest::blocking::Client, X402ClientSync> {
        &self.transport
    }

    pub fn get(&self, path: &str) -> Result<http::Response<Bytes>, RequestError> {
        let request = http::Request::get(endpoint(&self.base_url, path)).body(Bytes::new())?;
        self.send(request)
    }

    pub fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<http::Response<Bytes>, RequestError> {
        let body = serde_json::to_vec(body)?;
        let request = http::Request::post(endpoint(&self.base_url, path))
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Bytes::from(body))?;
        self.send(request)
    }

    /// Sends a prepared request. Relative URIs are not resolved against the base URL.
    pub fn send(&self, request: http::Request<Bytes>) -> Result<http::Response<Bytes>, RequestError> {
        Ok(self.transport.send(request)?)
    }

    pub fn close(self) {
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::max_amount;
    use crate::util::log_capture::capture_logs;
    use crate::wallets::tests::FakeWallet;

    #[test]
    fn test_build_requires_credentials() {
        let err = X402OpenAI::builder().build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentialSource));

        let err = BlockingX402OpenAI::builder().build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentialSource));
    }

    #[test]
    fn test_build_rejects_two_sources() {
        let err = X402OpenAI::builder()
            .wallet(FakeWallet("eip155"))
            .x402_client(X402Client::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MultipleCredentialSources));
    }

    #[test]
    fn test_build_validates_http_options() {
        let err = X402OpenAI::builder()
            .wallet(FakeWallet("eip155"))
            .base_url("not a url")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl(_)));

        let err = X402OpenAI::builder()
            .wallet(FakeWallet("eip155"))
            .default_header("bad header", "value")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHeader(ref message) if message.starts_with("bad header")));
    }

    #[test]
    fn test_defaults() {
        let client = X402OpenAI::builder().wallet(FakeWallet("eip155")).build().unwrap();
        assert_eq!(client.base_url().as_str(), "https://llm.qntx.fun/v1");

        let builder = X402OpenAIBuilder::<X402Client>::new();
        assert_eq!(builder.timeout, Duration::from_secs(600));
        assert_eq!(builder.connect_timeout, Duration::from_secs(10));
        assert_eq!(builder.api_key, "x402");
    }

    #[test]
    fn test_requests_are_relative_to_base_url_and_authorized() {
        let client = X402OpenAI::builder()
            .wallet(FakeWallet("eip155"))
            .base_url("https://gateway.example/v1/")
            .build()
            .unwrap();
        let request = client.post("/chat/completions").build().unwrap();
        assert_eq!(request.url().as_str(), "https://gateway.example/v1/chat/completions");
        assert_eq!(request.method(), Method::POST);
    }

    #[test]
    fn test_close_leaves_clones_usable() {
        let client = X402OpenAI::builder()
            .wallet(FakeWallet("eip155"))
            .base_url("https://gateway.example/v1")
            .build()
            .unwrap();
        let clone = client.clone();
        let (_, logs) = capture_logs(|| client.close());
        assert!(logs.contains("Closing x402 OpenAI client"), "{logs}");

        let request = clone.get("models").build().unwrap();
        assert_eq!(request.url().as_str(), "https://gateway.example/v1/models");
    }

    #[test]
    fn test_default_headers() {
        let headers = default_headers("x402", &[("x-trace".into(), "abc".into())]).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer x402");
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
        assert_eq!(headers.get("x-trace").unwrap(), "abc");

        let headers = default_headers("x402", &[("authorization".into(), "Bearer other".into())]).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer other");
    }

    #[test]
    fn test_prebuilt_client_ignores_builder_policies() {
        let (result, logs) = capture_logs(|| {
            BlockingX402OpenAI::builder()
                .x402_client(X402ClientSync::new())
                .policy(max_amount(1))
                .build()
        });
        let client = result.unwrap();
        assert!(client.transport().handler().inner().policies().is_empty());
        assert!(logs.contains("policies"), "{logs}");
        client.close();
    }

    #[test]
    fn test_from_config() {
        let config: ClientConfig = r#"{
            "policies": [{"prefer_network": "base"}, {"max_amount": "1000"}],
            "base_url": "http://127.0.0.1:8080/v1",
            "api_key": "sk-test",
            "timeout_secs": 5
        }"#
        .parse()
        .unwrap();
        let builder = X402OpenAIBuilder::<X402Client>::new()
            .wallet(FakeWallet("eip155"))
            .from_config(&config)
            .unwrap();
        assert_eq!(builder.policies.len(), 2);
        assert_eq!(builder.base_url, "http://127.0.0.1:8080/v1");
        assert_eq!(builder.api_key, "sk-test");
        assert_eq!(builder.timeout, Duration::from_secs(5));
        assert_eq!(builder.connect_timeout, DEFAULT_CONNECT_TIMEOUT);

        let client = builder.build().unwrap();
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:8080/v1");
    }
}
