//! Payment clients: registries of scheme clients and policies that answer 402 challenges.
//!
//! [`X402Client`] answers challenges asynchronously and is what the async
//! transport and the reqwest middleware drive. [`X402ClientSync`] wraps it for
//! blocking callers. Both are built by registering wallets (which register
//! scheme clients) and then policies, through [`SchemeRegistry`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use x402_openai::client::X402Client;
//! use x402_openai::policy::{max_amount, prefer_network};
//! use x402_openai::scheme::eip155_exact::Eip155ExactClient;
//! use alloy_signer_local::PrivateKeySigner;
//!
//! let signer = Arc::new("PRIVATE_KEY".parse::<PrivateKeySigner>().unwrap());
//! let client = X402Client::new()
//!     .register(Eip155ExactClient::new(signer))
//!     .with_policy(prefer_network("eip155:8453"))
//!     .with_policy(max_amount(1_000_000));
//! ```

use alloy_primitives::U256;
use async_trait::async_trait;
use http::{HeaderMap, HeaderValue};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Runtime;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::chain::ChainId;
use crate::error::X402Error;
use crate::policy::{PaymentPolicy, apply_policies};
use crate::proto::parse_payment_required;
use crate::scheme::{FirstMatch, PaymentCandidate, PaymentSelector, X402SchemeClient};
use crate::transport::{BlockingPaymentHandler, PaymentHandler};

/// Describes the option that was paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMetadata {
    pub x402_version: u8,
    pub scheme: String,
    pub chain_id: ChainId,
    pub asset: String,
    pub amount: U256,
    pub pay_to: String,
}

impl From<&PaymentCandidate> for PaymentMetadata {
    fn from(candidate: &PaymentCandidate) -> Self {
        Self {
            x402_version: candidate.x402_version,
            scheme: candidate.scheme.clone(),
            chain_id: candidate.chain_id.clone(),
            asset: candidate.asset.clone(),
            amount: candidate.amount,
            pay_to: candidate.pay_to.clone(),
        }
    }
}

/// Registration surface offered to wallets and the payment client builder.
pub trait SchemeRegistry {
    fn register_scheme(&mut self, scheme: Arc<dyn X402SchemeClient>);

    fn register_policy(&mut self, policy: Arc<dyn PaymentPolicy>);
}

/// A payment client that can be assembled from scratch by registration.
///
/// Implemented by [`X402Client`] and [`X402ClientSync`]; the flavor a facade
/// needs is picked by type parameter.
pub trait PaymentClientFlavor: SchemeRegistry + Send + Sync + Sized + 'static {
    fn empty() -> Self;
}

/// Registered scheme clients, in registration order.
#[derive(Default, Clone)]
pub struct ClientSchemes(Vec<Arc<dyn X402SchemeClient>>);

impl ClientSchemes {
    pub fn push(&mut self, client: Arc<dyn X402SchemeClient>) {
        self.0.push(client);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every payable candidate: scheme registration order, then offer order.
    pub fn candidates(&self, payment_required: &crate::proto::PaymentRequired) -> Vec<PaymentCandidate> {
        self.0
            .iter()
            .flat_map(|client| client.accept(payment_required))
            .collect()
    }
}

/// Asynchronous payment client.
#[derive(Clone)]
pub struct X402Client<TSelector = FirstMatch> {
    schemes: ClientSchemes,
    policies: Vec<Arc<dyn PaymentPolicy>>,
    selector: TSelector,
}

impl X402Client<FirstMatch> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for X402Client<FirstMatch> {
    fn default() -> Self {
        Self {
            schemes: ClientSchemes::default(),
            policies: Vec::new(),
            selector: FirstMatch,
        }
    }
}

impl<TSelector> fmt::Debug for X402Client<TSelector> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X402Client")
            .field("schemes", &self.schemes.len())
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

impl<TSelector> X402Client<TSelector> {
    /// Registers a scheme client. Earlier registrations are preferred by [`FirstMatch`].
    pub fn register<S>(mut self, scheme: S) -> Self
    where
        S: X402SchemeClient + 'static,
    {
        self.schemes.push(Arc::new(scheme));
        self
    }

    /// Appends a payment policy. Policies apply in the order they are added.
    pub fn with_policy(mut self, policy: Arc<dyn PaymentPolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Replaces the final selector.
    pub fn with_selector<P: PaymentSelector + 'static>(self, selector: P) -> X402Client<P> {
        X402Client {
            selector,
            schemes: self.schemes,
            policies: self.policies,
        }
    }

    pub fn schemes(&self) -> &ClientSchemes {
        &self.schemes
    }

    pub fn policies(&self) -> &[Arc<dyn PaymentPolicy>] {
        &self.policies
    }
}

impl<TSelector> SchemeRegistry for X402Client<TSelector> {
    fn register_scheme(&mut self, scheme: Arc<dyn X402SchemeClient>) {
        self.schemes.push(scheme);
    }

    fn register_policy(&mut self, policy: Arc<dyn PaymentPolicy>) {
        self.policies.push(policy);
    }
}

impl PaymentClientFlavor for X402Client<FirstMatch> {
    fn empty() -> Self {
        Self::new()
    }
}

impl<TSelector> X402Client<TSelector>
where
    TSelector: PaymentSelector,
{
    /// Parses a 402 challenge, picks an option and signs it.
    ///
    /// Returns the headers to add to the retried request together with a
    /// description of what is being paid.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.client.make_payment_headers", skip_all, err)
    )]
    pub async fn make_payment_headers(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(HeaderMap, PaymentMetadata), X402Error> {
        let payment_required = parse_payment_required(headers, body)?;
        let candidates = self.schemes.candidates(&payment_required);
        let offered = candidates.len();
        let candidates = apply_policies(&self.policies, candidates);

        let selected = self
            .selector
            .select(&candidates)
            .ok_or(X402Error::NoMatchingPaymentOption)?;
        tracing::debug!(
            offered,
            eligible = candidates.len(),
            scheme = %selected.scheme,
            chain_id = %selected.chain_id,
            amount = %selected.amount,
            "Selected payment option"
        );

        let signed_payload = selected.sign().await?;
        let mut payment_headers = HeaderMap::new();
        payment_headers.insert(
            payment_required.payment_header_name(),
            HeaderValue::from_str(&signed_payload)?,
        );
        Ok((payment_headers, PaymentMetadata::from(selected)))
    }
}

#[async_trait]
impl<TSelector> PaymentHandler for X402Client<TSelector>
where
    TSelector: PaymentSelector,
{
    async fn handle_payment_required(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(HeaderMap, PaymentMetadata), X402Error> {
        self.make_payment_headers(headers, body).await
    }
}

/// Blocking payment client.
///
/// Signing is asynchronous (Solana payments need RPC calls), so this client
/// drives [`X402Client`] on a private current-thread Tokio runtime created on
/// first use. Like `reqwest::blocking`, it must not be used from within an
/// async runtime.
pub struct X402ClientSync<TSelector = FirstMatch> {
    inner: X402Client<TSelector>,
    runtime: OnceCell<Runtime>,
}

impl X402ClientSync<FirstMatch> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for X402ClientSync<FirstMatch> {
    fn default() -> Self {
        Self::from(X402Client::new())
    }
}

impl<TSelector> From<X402Client<TSelector>> for X402ClientSync<TSelector> {
    fn from(inner: X402Client<TSelector>) -> Self {
        Self {
            inner,
            runtime: OnceCell::new(),
        }
    }
}

impl<TSelector> fmt::Debug for X402ClientSync<TSelector> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X402ClientSync")
            .field("inner", &self.inner)
            .field("runtime_started", &self.runtime.get().is_some())
            .finish()
    }
}

impl<TSelector> X402ClientSync<TSelector> {
    pub fn register<S>(self, scheme: S) -> Self
    where
        S: X402SchemeClient + 'static,
    {
        Self::from(self.inner.register(scheme))
    }

    pub fn with_policy(self, policy: Arc<dyn PaymentPolicy>) -> Self {
        Self::from(self.inner.with_policy(policy))
    }

    pub fn inner(&self) -> &X402Client<TSelector> {
        &self.inner
    }

    fn runtime(&self) -> Result<&Runtime, X402Error> {
        self.runtime.get_or_try_init(|| {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| X402Error::SigningError(format!("failed to start signing runtime: {e}")))
        })
    }
}

impl<TSelector> SchemeRegistry for X402ClientSync<TSelector> {
    fn register_scheme(&mut self, scheme: Arc<dyn X402SchemeClient>) {
        self.inner.register_scheme(scheme);
    }

    fn register_policy(&mut self, policy: Arc<dyn PaymentPolicy>) {
        self.inner.register_policy(policy);
    }
}

impl PaymentClientFlavor for X402ClientSync<FirstMatch> {
    fn empty() -> Self {
        Self::new()
    }
}

impl<TSelector> BlockingPaymentHandler for X402ClientSync<TSelector>
where
    TSelector: PaymentSelector,
{
    fn handle_payment_required(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(HeaderMap, PaymentMetadata), X402Error> {
        self.runtime()?
            .block_on(self.inner.make_payment_headers(headers, body))
    }
}
