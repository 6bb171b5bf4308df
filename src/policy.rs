//! Payment policies: caller-supplied rules that narrow the choice of payment option.
//!
//! Policies run in registration order over the candidates offered by the
//! registered scheme clients. Each policy keeps the candidates it matches:
//!
//! - a [`PolicyKind::Preference`] that matches nothing leaves the set unchanged,
//!   so a preference can never make a payable challenge unpayable;
//! - a [`PolicyKind::Limit`] that matches nothing empties the set, so a cap is
//!   never exceeded.
//!
//! The selector then picks the first surviving candidate.
//!
//! ```
//! use x402_openai::policy::{max_amount, prefer_network, prefer_scheme};
//!
//! let policies = vec![
//!     prefer_network("eip155:8453"),
//!     prefer_scheme("exact"),
//!     max_amount(1_000_000),
//! ];
//! assert_eq!(policies.len(), 3);
//! ```

use alloy_primitives::U256;
use std::fmt::Debug;
use std::sync::Arc;

use crate::chain::{ChainId, ChainIdPattern};
use crate::scheme::PaymentCandidate;

/// How a policy treats a candidate set in which nothing matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// Narrow when possible, otherwise leave the candidates alone.
    Preference,
    /// Hard constraint: candidates that do not match are never paid.
    Limit,
}

/// A predicate over payment candidates.
pub trait PaymentPolicy: Send + Sync + Debug {
    fn kind(&self) -> PolicyKind;

    fn matches(&self, candidate: &PaymentCandidate) -> bool;
}

/// Prefers candidates on a network.
///
/// Accepts a CAIP-2 chain ID (`eip155:8453`), a pattern (`eip155:*`,
/// `eip155:{8453,137}`) or a known network name (`base`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferNetwork {
    pattern: Option<ChainIdPattern>,
    network: String,
}

impl PreferNetwork {
    pub fn new(network: &str) -> Self {
        let pattern = network
            .parse::<ChainIdPattern>()
            .ok()
            .or_else(|| ChainId::from_network_name(network).map(ChainIdPattern::from));
        if pattern.is_none() {
            tracing::warn!(network, "Network preference matches no chain id pattern or known network");
        }
        Self {
            pattern,
            network: network.to_string(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }
}

impl PaymentPolicy for PreferNetwork {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Preference
    }

    fn matches(&self, candidate: &PaymentCandidate) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|pattern| pattern.matches(&candidate.chain_id))
    }
}

/// Prefers candidates using a scheme (e.g. `exact`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferScheme(pub String);

impl PaymentPolicy for PreferScheme {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Preference
    }

    fn matches(&self, candidate: &PaymentCandidate) -> bool {
        candidate.scheme == self.0
    }
}

/// Caps the amount of a single payment, in the token's smallest unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxAmount(pub U256);

impl PaymentPolicy for MaxAmount {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Limit
    }

    fn matches(&self, candidate: &PaymentCandidate) -> bool {
        candidate.amount <= self.0
    }
}

pub fn prefer_network(network: &str) -> Arc<dyn PaymentPolicy> {
    Arc::new(PreferNetwork::new(network))
}

pub fn prefer_scheme(scheme: &str) -> Arc<dyn PaymentPolicy> {
    Arc::new(PreferScheme(scheme.to_string()))
}

pub fn max_amount(amount: u64) -> Arc<dyn PaymentPolicy> {
    Arc::new(MaxAmount(U256::from(amount)))
}

/// Narrows `candidates` by each policy in order. Candidate order is preserved.
pub fn apply_policies(
    policies: &[Arc<dyn PaymentPolicy>],
    candidates: Vec<PaymentCandidate>,
) -> Vec<PaymentCandidate> {
    policies.iter().fold(candidates, |candidates, policy| {
        let total = candidates.len();
        let (matched, rest): (Vec<_>, Vec<_>) =
            candidates.into_iter().partition(|c| policy.matches(c));
        match (matched.is_empty(), policy.kind()) {
            (true, PolicyKind::Preference) => {
                tracing::trace!(?policy, total, "Preference matched nothing, keeping all candidates");
                rest
            }
            _ => {
                tracing::trace!(?policy, total, kept = matched.len(), "Applied payment policy");
                matched
            }
        }
    })
}
