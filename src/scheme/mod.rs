//! Scheme clients: turning offered payment requirements into signed payments.
//!
//! A scheme client ([`X402SchemeClient`]) inspects a parsed 402 challenge and
//! returns one [`PaymentCandidate`] per offered option it is able to pay. Each
//! candidate carries a boxed [`PaymentCandidateSigner`] that produces the
//! base64 payment header value once the candidate has been selected.
//!
//! Implementations:
//!
//! - [`eip155_exact::Eip155ExactClient`] - ERC-3009 on EVM chains (`evm` feature)
//! - [`solana_exact::SolanaExactClient`] - SPL `TransferChecked` on Solana (`svm` feature)

use alloy_primitives::U256;
use async_trait::async_trait;
use std::fmt;

use crate::chain::ChainId;
use crate::error::X402Error;
use crate::proto::PaymentRequired;

#[cfg(feature = "evm")]
pub mod eip155_exact;
#[cfg(feature = "svm")]
pub mod solana_exact;

/// Identity of a scheme client: which chain family and which scheme it speaks.
pub trait X402SchemeId {
    /// CAIP-2 namespace handled by the client, e.g. `eip155`.
    fn namespace(&self) -> &str;
    /// Scheme name, e.g. `exact`.
    fn scheme(&self) -> &str;
}

/// A client able to pay some of the options offered in a 402 challenge.
pub trait X402SchemeClient: X402SchemeId + Send + Sync {
    /// Returns a candidate for every offered option this client can pay, in offer order.
    fn accept(&self, payment_required: &PaymentRequired) -> Vec<PaymentCandidate>;
}

/// Produces the base64 payment header value for one selected candidate.
#[async_trait]
pub trait PaymentCandidateSigner: Send + Sync {
    async fn sign_payment(&self) -> Result<String, X402Error>;
}

/// One payable option, paired with the signer able to pay it.
pub struct PaymentCandidate {
    pub chain_id: ChainId,
    pub asset: String,
    pub amount: U256,
    pub scheme: String,
    pub x402_version: u8,
    pub pay_to: String,
    pub signer: Box<dyn PaymentCandidateSigner>,
}

impl PaymentCandidate {
    pub async fn sign(&self) -> Result<String, X402Error> {
        self.signer.sign_payment().await
    }
}

impl fmt::Debug for PaymentCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentCandidate")
            .field("chain_id", &self.chain_id)
            .field("asset", &self.asset)
            .field("amount", &self.amount)
            .field("scheme", &self.scheme)
            .field("x402_version", &self.x402_version)
            .field("pay_to", &self.pay_to)
            .finish_non_exhaustive()
    }
}

/// Picks one candidate out of those that survived the payment policies.
pub trait PaymentSelector: Send + Sync {
    fn select<'a>(&self, candidates: &'a [PaymentCandidate]) -> Option<&'a PaymentCandidate>;
}

/// Default selector: returns the first candidate.
///
/// Order is scheme registration order, then the gateway's offer order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstMatch;

impl PaymentSelector for FirstMatch {
    fn select<'a>(&self, candidates: &'a [PaymentCandidate]) -> Option<&'a PaymentCandidate> {
        candidates.first()
    }
}

/// Parses a decimal token amount as carried on the wire.
pub(crate) fn parse_amount(amount: &str) -> Option<U256> {
    U256::from_str_radix(amount, 10).ok()
}

/// Serde helpers for `U256` values that travel as decimal strings.
pub(crate) mod decimal_u256 {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_str_radix(&s, 10).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Signer returning a fixed header value.
    pub struct StaticSigner(pub &'static str);

    #[async_trait]
    impl PaymentCandidateSigner for StaticSigner {
        async fn sign_payment(&self) -> Result<String, X402Error> {
            Ok(self.0.to_string())
        }
    }

    pub fn candidate(chain_id: &str, scheme: &str, amount: u64) -> PaymentCandidate {
        PaymentCandidate {
            chain_id: chain_id.parse().unwrap(),
            asset: "0xasset".to_string(),
            amount: U256::from(amount),
            scheme: scheme.to_string(),
            x402_version: 2,
            pay_to: "0xpayee".to_string(),
            signer: Box::new(StaticSigner("signed")),
        }
    }

    #[test]
    fn test_first_match_picks_first() {
        let candidates = vec![
            candidate("eip155:8453", "exact", 1),
            candidate("eip155:137", "exact", 2),
        ];
        let selected = FirstMatch.select(&candidates).unwrap();
        assert_eq!(selected.chain_id.reference, "8453");
        assert!(FirstMatch.select(&[]).is_none());
    }

    #[test]
    fn test_parse_amount_is_decimal() {
        assert_eq!(parse_amount("1000000"), Some(U256::from(1_000_000u64)));
        assert_eq!(parse_amount("0x10"), None);
    }

    #[tokio::test]
    async fn test_candidate_sign_delegates() {
        let c = candidate("eip155:8453", "exact", 1);
        assert_eq!(c.sign().await.unwrap(), "signed");
        assert!(format!("{c:?}").contains("PaymentCandidate"));
    }
}
