//! The "exact" scheme on EVM chains.
//!
//! Pays with an ERC-3009 `transferWithAuthorization` signed as EIP-712 typed
//! data. The facilitator submits the authorization on-chain; the buyer never
//! sends a transaction. Both protocol versions are handled: V1 options name the
//! network, V2 options carry a CAIP-2 chain ID and are echoed back verbatim.

use alloy_primitives::{Address, B256, Bytes, FixedBytes, Signature, U256};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolStruct, eip712_domain, sol};
use async_trait::async_trait;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::chain::ChainId;
use crate::error::X402Error;
use crate::proto::{OriginalJson, PaymentRequired, v1, v2};
use crate::scheme::{
    PaymentCandidate, PaymentCandidateSigner, X402SchemeClient, X402SchemeId, decimal_u256,
    parse_amount,
};
use crate::timestamp::UnixTimestamp;
use crate::util::Base64Bytes;

pub const EIP155_NAMESPACE: &str = "eip155";
pub const EXACT_SCHEME: &str = "exact";

/// How far in the past `validAfter` is placed, so the authorization is usable immediately.
const VALID_AFTER_SKEW_SECS: u64 = 10 * 60;

sol!(
    /// ERC-3009 `transferWithAuthorization` message, as hashed for EIP-712.
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

/// EIP-712 domain overrides carried in the requirements' `extra` object.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirementsExtra {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// The signed authorization, as sent to the facilitator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    pub signature: Bytes,
    pub authorization: ExactEvmPayloadAuthorization,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayloadAuthorization {
    pub from: Address,
    pub to: Address,
    #[serde(with = "decimal_u256")]
    pub value: U256,
    pub valid_after: UnixTimestamp,
    pub valid_before: UnixTimestamp,
    pub nonce: B256,
}

impl ExactEvmPayloadAuthorization {
    /// The EIP-712 struct whose hash is signed. Must mirror the authorization field by field.
    pub fn as_typed_data(&self) -> TransferWithAuthorization {
        TransferWithAuthorization {
            from: self.from,
            to: self.to,
            value: self.value,
            validAfter: U256::from(self.valid_after.as_secs()),
            validBefore: U256::from(self.valid_before.as_secs()),
            nonce: self.nonce,
        }
    }
}

/// Abstracts signing so that both owned and `Arc`-wrapped signers can be used.
///
/// Alloy's `Signer` trait is not implemented for `Arc<T>`, and
/// `PrivateKeySigner` is shared between wallets and scheme clients through `Arc`.
#[async_trait]
pub trait SignerLike {
    fn address(&self) -> Address;

    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error>;
}

#[async_trait]
impl SignerLike for PrivateKeySigner {
    fn address(&self) -> Address {
        PrivateKeySigner::address(self)
    }

    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error> {
        alloy_signer::Signer::sign_hash(self, hash).await
    }
}

#[async_trait]
impl<T: SignerLike + Send + Sync> SignerLike for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn sign_hash(&self, hash: &FixedBytes<32>) -> Result<Signature, alloy_signer::Error> {
        (**self).sign_hash(hash).await
    }
}

/// EIP-712 signing parameters for one ERC-3009 authorization.
#[derive(Debug, Clone)]
pub struct Eip3009SigningParams {
    /// Numeric EIP-155 chain ID.
    pub chain_id: u64,
    /// Token contract, the EIP-712 verifying contract.
    pub asset_address: Address,
    pub pay_to: Address,
    pub amount: U256,
    pub max_timeout_seconds: u64,
    pub extra: PaymentRequirementsExtra,
}

/// Signs an ERC-3009 `TransferWithAuthorization` with EIP-712.
///
/// The authorization is valid from ten minutes ago until `max_timeout_seconds`
/// from now, and carries a random 32-byte nonce.
pub async fn sign_erc3009_authorization<S: SignerLike + Sync>(
    signer: &S,
    params: &Eip3009SigningParams,
) -> Result<ExactEvmPayload, X402Error> {
    let domain = eip712_domain! {
        name: params.extra.name.clone(),
        version: params.extra.version.clone(),
        chain_id: params.chain_id,
        verifying_contract: params.asset_address,
    };

    let now = UnixTimestamp::now();
    let valid_after = UnixTimestamp::from_secs(now.as_secs().saturating_sub(VALID_AFTER_SKEW_SECS));
    let valid_before = now + params.max_timeout_seconds;
    let nonce: [u8; 32] = rng().random();

    let authorization = ExactEvmPayloadAuthorization {
        from: signer.address(),
        to: params.pay_to,
        value: params.amount,
        valid_after,
        valid_before,
        nonce: FixedBytes(nonce),
    };

    let eip712_hash = authorization.as_typed_data().eip712_signing_hash(&domain);
    let signature = signer
        .sign_hash(&eip712_hash)
        .await
        .map_err(|e| X402Error::SigningError(format!("{e:?}")))?;

    Ok(ExactEvmPayload {
        signature: signature.as_bytes().into(),
        authorization,
    })
}

/// Scheme client for "exact" payments on EVM chains, V1 and V2.
#[derive(Debug, Clone)]
pub struct Eip155ExactClient<S> {
    signer: S,
}

impl<S> Eip155ExactClient<S> {
    pub fn new(signer: S) -> Self {
        Self { signer }
    }
}

impl<S> X402SchemeId for Eip155ExactClient<S> {
    fn namespace(&self) -> &str {
        EIP155_NAMESPACE
    }

    fn scheme(&self) -> &str {
        EXACT_SCHEME
    }
}

impl<S> X402SchemeClient for Eip155ExactClient<S>
where
    S: SignerLike + Clone + Send + Sync + 'static,
{
    fn accept(&self, payment_required: &PaymentRequired) -> Vec<PaymentCandidate> {
        match payment_required {
            PaymentRequired::V1(payment_required) => payment_required
                .accepts
                .iter()
                .filter_map(|original_json| self.accept_v1(original_json))
                .collect(),
            PaymentRequired::V2(payment_required) => payment_required
                .accepts
                .iter()
                .filter_map(|original_json| {
                    self.accept_v2(original_json, payment_required.resource.clone())
                })
                .collect(),
        }
    }
}

impl<S> Eip155ExactClient<S>
where
    S: SignerLike + Clone + Send + Sync + 'static,
{
    fn accept_v1(&self, original_json: &OriginalJson) -> Option<PaymentCandidate> {
        let requirements: v1::PaymentRequirements<PaymentRequirementsExtra> =
            original_json.parse().ok()?;
        if requirements.scheme != EXACT_SCHEME {
            return None;
        }
        let chain_id = ChainId::from_network_name(&requirements.network)?;
        let params = self.signing_params(
            &chain_id,
            &requirements.max_amount_required,
            &requirements.asset,
            &requirements.pay_to,
            requirements.max_timeout_seconds,
            requirements.extra.clone(),
        )?;
        Some(PaymentCandidate {
            chain_id,
            asset: requirements.asset,
            amount: params.amount,
            scheme: EXACT_SCHEME.to_string(),
            x402_version: v1::X402Version1::VALUE,
            pay_to: requirements.pay_to,
            signer: Box::new(PayloadSigner {
                signer: self.signer.clone(),
                params,
                envelope: Envelope::V1 {
                    network: requirements.network,
                },
            }),
        })
    }

    fn accept_v2(
        &self,
        original_json: &OriginalJson,
        resource: Option<v2::ResourceInfo>,
    ) -> Option<PaymentCandidate> {
        let requirements: v2::PaymentRequirements<Option<PaymentRequirementsExtra>> =
            original_json.parse().ok()?;
        if requirements.scheme != EXACT_SCHEME {
            return None;
        }
        let params = self.signing_params(
            &requirements.network,
            &requirements.amount,
            &requirements.asset,
            &requirements.pay_to,
            requirements.max_timeout_seconds,
            requirements.extra.clone(),
        )?;
        Some(PaymentCandidate {
            chain_id: requirements.network,
            asset: requirements.asset,
            amount: params.amount,
            scheme: EXACT_SCHEME.to_string(),
            x402_version: v2::X402Version2::VALUE,
            pay_to: requirements.pay_to,
            signer: Box::new(PayloadSigner {
                signer: self.signer.clone(),
                params,
                envelope: Envelope::V2 {
                    accepted: original_json.clone(),
                    resource,
                },
            }),
        })
    }

    fn signing_params(
        &self,
        chain_id: &ChainId,
        amount: &str,
        asset: &str,
        pay_to: &str,
        max_timeout_seconds: u64,
        extra: Option<PaymentRequirementsExtra>,
    ) -> Option<Eip3009SigningParams> {
        if chain_id.namespace != EIP155_NAMESPACE {
            return None;
        }
        Some(Eip3009SigningParams {
            chain_id: chain_id.reference.parse().ok()?,
            asset_address: asset.parse().ok()?,
            pay_to: pay_to.parse().ok()?,
            amount: parse_amount(amount)?,
            max_timeout_seconds,
            extra: extra.unwrap_or_default(),
        })
    }
}

/// Protocol-specific wrapping of the signed payload.
enum Envelope {
    V1 {
        network: String,
    },
    V2 {
        accepted: OriginalJson,
        resource: Option<v2::ResourceInfo>,
    },
}

struct PayloadSigner<S> {
    signer: S,
    params: Eip3009SigningParams,
    envelope: Envelope,
}

#[async_trait]
impl<S> PaymentCandidateSigner for PayloadSigner<S>
where
    S: SignerLike + Send + Sync,
{
    async fn sign_payment(&self) -> Result<String, X402Error> {
        let evm_payload = sign_erc3009_authorization(&self.signer, &self.params).await?;
        let b64 = match &self.envelope {
            Envelope::V1 { network } => Base64Bytes::encode_json(&v1::PaymentPayload {
                x402_version: v1::X402Version1,
                scheme: EXACT_SCHEME.to_string(),
                network: network.clone(),
                payload: evm_payload,
            })?,
            Envelope::V2 { accepted, resource } => Base64Bytes::encode_json(&v2::PaymentPayload {
                x402_version: v2::X402Version2,
                accepted: accepted.clone(),
                resource: resource.clone(),
                payload: evm_payload,
            })?,
        };
        Ok(b64.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::parse_payment_required;
    use http::HeaderMap;
    use serde_json::json;

    const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const ANVIL_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const USDC_BASE: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
    const PAY_TO: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";

    fn client() -> Eip155ExactClient<Arc<PrivateKeySigner>> {
        Eip155ExactClient::new(Arc::new(ANVIL_KEY.parse::<PrivateKeySigner>().unwrap()))
    }

    fn v2_requirements(network: &str, amount: &str) -> serde_json::Value {
        json!({
            "scheme": "exact",
            "network": network,
            "amount": amount,
            "asset": USDC_BASE,
            "payTo": PAY_TO,
            "maxTimeoutSeconds": 300,
            "extra": {"name": "USD Coin", "version": "2"}
        })
    }

    fn parse(body: serde_json::Value) -> PaymentRequired {
        parse_payment_required(&HeaderMap::new(), &serde_json::to_vec(&body).unwrap()).unwrap()
    }

    fn decode(header: &str) -> serde_json::Value {
        let bytes = Base64Bytes::from(header.as_bytes()).decode().unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_accepts_only_evm_exact_options() {
        let challenge = parse(json!({
            "x402Version": 2,
            "resource": {"url": "https://llm.qntx.fun/v1/chat/completions"},
            "accepts": [
                v2_requirements("eip155:8453", "10000"),
                v2_requirements("solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp", "10000"),
                {"scheme": "upto", "network": "eip155:8453", "amount": "1", "asset": USDC_BASE, "payTo": PAY_TO, "maxTimeoutSeconds": 1},
                v2_requirements("eip155:137", "not-a-number"),
            ]
        }));
        let candidates = client().accept(&challenge);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].chain_id.to_string(), "eip155:8453");
        assert_eq!(candidates[0].amount, U256::from(10_000u64));
        assert_eq!(candidates[0].x402_version, 2);
    }

    #[tokio::test]
    async fn test_v2_payment_echoes_accepted_and_recovers_signer() {
        let requirements = v2_requirements("eip155:8453", "10000");
        let challenge = parse(json!({
            "x402Version": 2,
            "resource": {"url": "https://llm.qntx.fun/v1/chat/completions", "description": "", "mimeType": ""},
            "accepts": [requirements.clone()]
        }));
        let candidates = client().accept(&challenge);
        let header = candidates[0].sign().await.unwrap();
        let payment = decode(&header);

        assert_eq!(payment["x402Version"], 2);
        assert_eq!(payment["accepted"], requirements);
        assert_eq!(
            payment["resource"]["url"],
            "https://llm.qntx.fun/v1/chat/completions"
        );
        let authorization = &payment["payload"]["authorization"];
        assert_eq!(authorization["value"], "10000");
        assert!(authorization["validAfter"].is_string());

        let parsed: ExactEvmPayload = serde_json::from_value(payment["payload"].clone()).unwrap();
        assert_eq!(parsed.authorization.from, ANVIL_ADDRESS.parse::<Address>().unwrap());
        assert_eq!(
            parsed.authorization.valid_before.as_secs() - parsed.authorization.valid_after.as_secs(),
            300 + VALID_AFTER_SKEW_SECS
        );

        let domain = eip712_domain! {
            name: "USD Coin".to_string(),
            version: "2".to_string(),
            chain_id: 8453u64,
            verifying_contract: USDC_BASE.parse::<Address>().unwrap(),
        };
        let hash = parsed.authorization.as_typed_data().eip712_signing_hash(&domain);
        let signature = Signature::try_from(parsed.signature.as_ref()).unwrap();
        let recovered = signature.recover_address_from_prehash(&hash).unwrap();
        assert_eq!(recovered, parsed.authorization.from);
    }

    #[tokio::test]
    async fn test_v1_payment_uses_network_name() {
        let challenge = parse(json!({
            "x402Version": 1,
            "accepts": [{
                "scheme": "exact",
                "network": "base-sepolia",
                "maxAmountRequired": "1000",
                "resource": "https://example.com/paid",
                "description": "",
                "mimeType": "application/json",
                "payTo": PAY_TO,
                "maxTimeoutSeconds": 60,
                "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
                "extra": {"name": "USDC", "version": "2"}
            }, {
                "scheme": "exact",
                "network": "not-a-known-network",
                "maxAmountRequired": "1000",
                "payTo": PAY_TO,
                "maxTimeoutSeconds": 60,
                "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
            }]
        }));
        let candidates = client().accept(&challenge);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].chain_id.to_string(), "eip155:84532");
        assert_eq!(candidates[0].x402_version, 1);

        let payment = decode(&candidates[0].sign().await.unwrap());
        assert_eq!(payment["x402Version"], 1);
        assert_eq!(payment["scheme"], "exact");
        assert_eq!(payment["network"], "base-sepolia");
        assert_eq!(payment["payload"]["authorization"]["value"], "1000");
    }

    #[tokio::test]
    async fn test_nonces_are_fresh() {
        let challenge = parse(json!({
            "x402Version": 2,
            "accepts": [v2_requirements("eip155:8453", "1")]
        }));
        let candidates = client().accept(&challenge);
        let first = decode(&candidates[0].sign().await.unwrap());
        let second = decode(&candidates[0].sign().await.unwrap());
        assert_ne!(
            first["payload"]["authorization"]["nonce"],
            second["payload"]["authorization"]["nonce"]
        );
    }
}
