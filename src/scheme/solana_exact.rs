//! The "exact" scheme on Solana.
//!
//! Pays with a partially signed SPL Token `TransferChecked` transaction. The
//! facilitator named in `extra.feePayer` pays the fees, co-signs and submits;
//! the buyer signs only as the token owner.
//!
//! Building a transaction needs RPC access (mint lookup, recent blockhash,
//! priority fees, compute unit simulation). RPC clients are created on first
//! use per network and cached in [`SolanaRpcClients`].

use alloy_primitives::U256;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use solana_account::Account;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSimulateTransactionConfig;
use solana_client::rpc_response::{RpcPrioritizationFee, RpcResult, RpcSimulateTransactionResult};
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_message::v0::Message as MessageV0;
use solana_message::{Hash, VersionedMessage};
use solana_pubkey::{Pubkey, pubkey};
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::Instruction;
use solana_transaction::versioned::VersionedTransaction;
use spl_token::solana_program::program_pack::Pack;
use std::sync::Arc;

use crate::chain::ChainId;
use crate::error::X402Error;
use crate::networks::{SOLANA_DEVNET_REFERENCE, SOLANA_MAINNET_REFERENCE};
use crate::proto::{OriginalJson, PaymentRequired, v1, v2};
use crate::scheme::{PaymentCandidate, PaymentCandidateSigner, X402SchemeClient, X402SchemeId};
use crate::util::Base64Bytes;

pub const SOLANA_NAMESPACE: &str = "solana";
pub const EXACT_SCHEME: &str = "exact";

pub const SOLANA_MAINNET_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const SOLANA_DEVNET_RPC_URL: &str = "https://api.devnet.solana.com";

/// SPL Memo program, used to make every payment transaction unique.
pub static MEMO_PROGRAM_PUBKEY: Pubkey = pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");
pub const ATA_PROGRAM_PUBKEY: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Compute unit limit used only for the simulation that measures the real usage.
const SIMULATION_CU_LIMIT: u32 = 100_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactSolanaPayload {
    /// Base64 of the bincode-serialized, partially signed `VersionedTransaction`.
    pub transaction: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirementsExtra {
    pub fee_payer: String,
}

/// The subset of Solana RPC the payment builder needs.
pub trait RpcClientLike {
    fn get_account(
        &self,
        pubkey: &Pubkey,
    ) -> impl Future<Output = Result<Account, ClientError>> + Send;
    fn simulate_transaction_with_config(
        &self,
        transaction: &VersionedTransaction,
        config: RpcSimulateTransactionConfig,
    ) -> impl Future<Output = RpcResult<RpcSimulateTransactionResult>> + Send;
    fn get_recent_prioritization_fees(
        &self,
        addresses: &[Pubkey],
    ) -> impl Future<Output = Result<Vec<RpcPrioritizationFee>, ClientError>> + Send;
    fn get_latest_blockhash(&self) -> impl Future<Output = Result<Hash, ClientError>> + Send;
}

impl<Container: AsRef<RpcClient>> RpcClientLike for Container {
    fn get_account(
        &self,
        pubkey: &Pubkey,
    ) -> impl Future<Output = Result<Account, ClientError>> + Send {
        RpcClient::get_account(self.as_ref(), pubkey)
    }
    fn simulate_transaction_with_config(
        &self,
        transaction: &VersionedTransaction,
        config: RpcSimulateTransactionConfig,
    ) -> impl Future<Output = RpcResult<RpcSimulateTransactionResult>> + Send {
        RpcClient::simulate_transaction_with_config(self.as_ref(), transaction, config)
    }
    fn get_recent_prioritization_fees(
        &self,
        addresses: &[Pubkey],
    ) -> impl Future<Output = Result<Vec<RpcPrioritizationFee>, ClientError>> + Send {
        RpcClient::get_recent_prioritization_fees(self.as_ref(), addresses)
    }
    fn get_latest_blockhash(&self) -> impl Future<Output = Result<Hash, ClientError>> + Send {
        RpcClient::get_latest_blockhash(self.as_ref())
    }
}

/// Per-network RPC clients.
///
/// An explicit URL serves every Solana network; otherwise only mainnet and
/// devnet have a known public endpoint.
#[derive(Default)]
pub struct SolanaRpcClients {
    rpc_url: Option<String>,
    clients: DashMap<ChainId, Arc<RpcClient>>,
}

impl std::fmt::Debug for SolanaRpcClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpcClients")
            .field("rpc_url", &self.rpc_url)
            .field("cached", &self.clients.len())
            .finish()
    }
}

impl SolanaRpcClients {
    pub fn new(rpc_url: Option<String>) -> Self {
        Self {
            rpc_url,
            clients: DashMap::new(),
        }
    }

    /// RPC endpoint for a Solana chain, if one is configured or well known.
    pub fn url_for(&self, chain_id: &ChainId) -> Option<String> {
        if chain_id.namespace != SOLANA_NAMESPACE {
            return None;
        }
        if let Some(url) = &self.rpc_url {
            return Some(url.clone());
        }
        match chain_id.reference.as_str() {
            SOLANA_MAINNET_REFERENCE => Some(SOLANA_MAINNET_RPC_URL.to_string()),
            SOLANA_DEVNET_REFERENCE => Some(SOLANA_DEVNET_RPC_URL.to_string()),
            _ => None,
        }
    }

    pub fn client_for(&self, chain_id: &ChainId) -> Option<Arc<RpcClient>> {
        if let Some(client) = self.clients.get(chain_id) {
            return Some(client.clone());
        }
        let url = self.url_for(chain_id)?;
        let client = self
            .clients
            .entry(chain_id.clone())
            .or_insert_with(|| Arc::new(RpcClient::new(url)))
            .clone();
        Some(client)
    }
}

/// Mint information for SPL tokens.
#[derive(Debug)]
pub enum Mint {
    Token { decimals: u8, token_program: Pubkey },
    Token2022 { decimals: u8, token_program: Pubkey },
}

impl Mint {
    pub fn token_program(&self) -> &Pubkey {
        match self {
            Mint::Token { token_program, .. } => token_program,
            Mint::Token2022 { token_program, .. } => token_program,
        }
    }
}

pub async fn fetch_mint<R: RpcClientLike>(
    mint_pubkey: &Pubkey,
    rpc_client: &R,
) -> Result<Mint, X402Error> {
    let account = rpc_client
        .get_account(mint_pubkey)
        .await
        .map_err(|e| X402Error::SigningError(format!("failed to fetch mint {mint_pubkey}: {e}")))?;
    if account.owner == spl_token::id() {
        let mint = spl_token::state::Mint::unpack(&account.data).map_err(|e| {
            X402Error::SigningError(format!("failed to unpack mint {mint_pubkey}: {e}"))
        })?;
        Ok(Mint::Token {
            decimals: mint.decimals,
            token_program: spl_token::id(),
        })
    } else if account.owner == spl_token_2022::id() {
        let mint = spl_token_2022::state::Mint::unpack(&account.data).map_err(|e| {
            X402Error::SigningError(format!("failed to unpack mint {mint_pubkey}: {e}"))
        })?;
        Ok(Mint::Token2022 {
            decimals: mint.decimals,
            token_program: spl_token_2022::id(),
        })
    } else {
        Err(X402Error::SigningError(format!(
            "failed to unpack mint {mint_pubkey}: unknown owner"
        )))
    }
}

/// Associated token account of `owner` for `mint`.
pub fn associated_token_address(owner: &Pubkey, token_program: &Pubkey, mint: &Pubkey) -> Pubkey {
    let (ata, _) = Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_PUBKEY,
    );
    ata
}

/// Build the message to simulate: priority fee and transfer instructions under a provisional CU limit.
pub fn build_message_to_simulate(
    fee_payer: Pubkey,
    transfer_instructions: &[Instruction],
    priority_micro_lamports: u64,
    recent_blockhash: Hash,
) -> Result<(MessageV0, Vec<Instruction>), X402Error> {
    let set_price = ComputeBudgetInstruction::set_compute_unit_price(priority_micro_lamports);

    let mut ixs = Vec::with_capacity(1 + transfer_instructions.len());
    ixs.push(set_price);
    ixs.extend(transfer_instructions.iter().cloned());

    let mut with_cu_limit = ixs.clone();
    update_or_append_set_compute_unit_limit(&mut with_cu_limit, SIMULATION_CU_LIMIT);
    let message = MessageV0::try_compile(&fee_payer, &with_cu_limit, &[], recent_blockhash)
        .map_err(|e| X402Error::SigningError(format!("{e:?}")))?;
    Ok((message, ixs))
}

pub async fn estimate_compute_units<R: RpcClientLike>(
    rpc_client: &R,
    message: &MessageV0,
) -> Result<u32, X402Error> {
    let message = VersionedMessage::V0(message.clone());
    let num_required_signatures = message.header().num_required_signatures;
    let tx = VersionedTransaction {
        signatures: vec![Signature::default(); num_required_signatures as usize],
        message,
    };

    let sim = rpc_client
        .simulate_transaction_with_config(
            &tx,
            RpcSimulateTransactionConfig {
                sig_verify: false,
                replace_recent_blockhash: true,
                ..RpcSimulateTransactionConfig::default()
            },
        )
        .await
        .map_err(|e| X402Error::SigningError(format!("{e:?}")))?;
    let units = sim.value.units_consumed.ok_or(X402Error::SigningError(
        "simulation returned no units_consumed".to_string(),
    ))?;
    Ok(u32::try_from(units).unwrap_or(u32::MAX))
}

/// Lowest non-zero recent priority fee, or 1 micro-lamport.
pub fn pick_priority_fee(recent_fees: &[RpcPrioritizationFee]) -> u64 {
    recent_fees
        .iter()
        .map(|e| e.prioritization_fee)
        .filter(|fee| *fee > 0)
        .min()
        .unwrap_or(1)
}

pub async fn get_priority_fee_micro_lamports<R: RpcClientLike>(
    rpc_client: &R,
    writeable_accounts: &[Pubkey],
) -> Result<u64, X402Error> {
    let recent_fees = rpc_client
        .get_recent_prioritization_fees(writeable_accounts)
        .await
        .map_err(|e| X402Error::SigningError(format!("{e:?}")))?;
    Ok(pick_priority_fee(&recent_fees))
}

/// Update the first `set_compute_unit_limit` instruction if present, else append one.
pub fn update_or_append_set_compute_unit_limit(ixs: &mut Vec<Instruction>, units: u32) {
    let target_program = solana_compute_budget_interface::ID;
    let new_ix = ComputeBudgetInstruction::set_compute_unit_limit(units);
    let limit_tag = new_ix.data.first().copied();

    let existing = ixs
        .iter_mut()
        .find(|ix| ix.program_id == target_program && ix.data.first().copied() == limit_tag);
    match existing {
        Some(ix) => *ix = new_ix,
        None => ixs.push(new_ix),
    }
}

/// Memo with 16 random bytes so that otherwise identical payments differ.
fn build_random_memo_ix() -> Instruction {
    let nonce: [u8; 16] = rand::random();
    let memo_data = Base64Bytes::encode(nonce).to_string();
    Instruction::new_with_bytes(MEMO_PROGRAM_PUBKEY, memo_data.as_bytes(), Vec::new())
}

/// Places the signer's signature at its index among the required signers.
///
/// Other required slots (the fee payer) are left as default signatures for the
/// facilitator to fill.
pub fn sign_with_keypair<S: Signer + ?Sized>(
    mut tx: VersionedTransaction,
    signer: &S,
) -> Result<VersionedTransaction, X402Error> {
    let msg_bytes = tx.message.serialize();
    let signature = signer
        .try_sign_message(msg_bytes.as_slice())
        .map_err(|e| X402Error::SigningError(format!("{e}")))?;

    let num_required = tx.message.header().num_required_signatures as usize;
    let static_keys = tx.message.static_account_keys();
    let pos = static_keys
        .iter()
        .take(num_required)
        .position(|k| *k == signer.pubkey())
        .ok_or(X402Error::SigningError(
            "Signer not found in required signers".to_string(),
        ))?;

    if tx.signatures.len() < num_required {
        tx.signatures.resize(num_required, Signature::default());
    }
    tx.signatures[pos] = signature;
    Ok(tx)
}

pub fn transaction_as_base64(tx: &VersionedTransaction) -> Result<String, X402Error> {
    let bytes = bincode::serialize(tx)
        .map_err(|e| X402Error::SigningError(format!("Can not encode transaction: {e}")))?;
    Ok(Base64Bytes::encode(bytes).to_string())
}

/// Build and partially sign a token transfer. Returns the base64 transaction.
pub async fn build_signed_transfer_transaction<S: Signer + ?Sized, R: RpcClientLike>(
    signer: &S,
    rpc_client: &R,
    fee_payer: &Pubkey,
    pay_to: &Pubkey,
    asset: &Pubkey,
    amount: u64,
) -> Result<String, X402Error> {
    let mint = fetch_mint(asset, rpc_client).await?;
    let client_pubkey = signer.pubkey();
    let source_ata = associated_token_address(&client_pubkey, mint.token_program(), asset);
    let destination_ata = associated_token_address(pay_to, mint.token_program(), asset);

    let transfer_instruction = match mint {
        Mint::Token {
            decimals,
            token_program,
        } => spl_token::instruction::transfer_checked(
            &token_program,
            &source_ata,
            asset,
            &destination_ata,
            &client_pubkey,
            &[],
            amount,
            decimals,
        )
        .map_err(|e| X402Error::SigningError(format!("{e}")))?,
        Mint::Token2022 {
            decimals,
            token_program,
        } => spl_token_2022::instruction::transfer_checked(
            &token_program,
            &source_ata,
            asset,
            &destination_ata,
            &client_pubkey,
            &[],
            amount,
            decimals,
        )
        .map_err(|e| X402Error::SigningError(format!("{e}")))?,
    };

    let recent_blockhash = rpc_client
        .get_latest_blockhash()
        .await
        .map_err(|e| X402Error::SigningError(format!("{e:?}")))?;
    let fee =
        get_priority_fee_micro_lamports(rpc_client, &[*fee_payer, destination_ata, source_ata])
            .await?;

    let transfer_instructions = vec![transfer_instruction, build_random_memo_ix()];
    let (msg_to_sim, instructions) =
        build_message_to_simulate(*fee_payer, &transfer_instructions, fee, recent_blockhash)?;
    let estimated_cu = estimate_compute_units(rpc_client, &msg_to_sim).await?;

    let mut final_instructions = Vec::with_capacity(instructions.len() + 1);
    final_instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(estimated_cu));
    final_instructions.extend(instructions);
    let msg = MessageV0::try_compile(fee_payer, &final_instructions, &[], recent_blockhash)
        .map_err(|e| X402Error::SigningError(format!("{e:?}")))?;

    let tx = VersionedTransaction {
        signatures: vec![],
        message: VersionedMessage::V0(msg),
    };
    let signed = sign_with_keypair(tx, signer)?;
    transaction_as_base64(&signed)
}

/// Scheme client for "exact" payments on Solana, V1 and V2.
pub struct SolanaExactClient<S> {
    signer: Arc<S>,
    rpc: Arc<SolanaRpcClients>,
}

impl<S> SolanaExactClient<S> {
    pub fn new(signer: Arc<S>, rpc: Arc<SolanaRpcClients>) -> Self {
        Self { signer, rpc }
    }
}

impl<S> X402SchemeId for SolanaExactClient<S> {
    fn namespace(&self) -> &str {
        SOLANA_NAMESPACE
    }

    fn scheme(&self) -> &str {
        EXACT_SCHEME
    }
}

/// Terms of one Solana option, decoded from either protocol version.
struct TransferTerms {
    fee_payer: Pubkey,
    pay_to: Pubkey,
    asset: Pubkey,
    amount: u64,
}

impl TransferTerms {
    fn parse(
        amount: &str,
        pay_to: &str,
        asset: &str,
        extra: Option<&PaymentRequirementsExtra>,
    ) -> Option<Self> {
        Some(Self {
            fee_payer: extra?.fee_payer.parse().ok()?,
            pay_to: pay_to.parse().ok()?,
            asset: asset.parse().ok()?,
            amount: amount.parse().ok()?,
        })
    }
}

impl<S> SolanaExactClient<S>
where
    S: Signer + Send + Sync + 'static,
{
    fn candidate(
        &self,
        chain_id: ChainId,
        x402_version: u8,
        terms: TransferTerms,
        envelope: Envelope,
    ) -> Option<PaymentCandidate> {
        let rpc_client = self.rpc.client_for(&chain_id)?;
        Some(PaymentCandidate {
            asset: terms.asset.to_string(),
            amount: U256::from(terms.amount),
            scheme: EXACT_SCHEME.to_string(),
            x402_version,
            pay_to: terms.pay_to.to_string(),
            chain_id,
            signer: Box::new(PayloadSigner {
                signer: self.signer.clone(),
                rpc_client,
                terms,
                envelope,
            }),
        })
    }

    fn accept_v1(&self, original_json: &OriginalJson) -> Option<PaymentCandidate> {
        let requirements: v1::PaymentRequirements<PaymentRequirementsExtra> =
            original_json.parse().ok()?;
        if requirements.scheme != EXACT_SCHEME {
            return None;
        }
        let chain_id = ChainId::from_network_name(&requirements.network)?;
        if chain_id.namespace != SOLANA_NAMESPACE {
            return None;
        }
        let terms = TransferTerms::parse(
            &requirements.max_amount_required,
            &requirements.pay_to,
            &requirements.asset,
            requirements.extra.as_ref(),
        )?;
        self.candidate(
            chain_id,
            v1::X402Version1::VALUE,
            terms,
            Envelope::V1 {
                network: requirements.network,
            },
        )
    }

    fn accept_v2(
        &self,
        original_json: &OriginalJson,
        resource: Option<v2::ResourceInfo>,
    ) -> Option<PaymentCandidate> {
        let requirements: v2::PaymentRequirements<Option<PaymentRequirementsExtra>> =
            original_json.parse().ok()?;
        if requirements.scheme != EXACT_SCHEME || requirements.network.namespace != SOLANA_NAMESPACE
        {
            return None;
        }
        let terms = TransferTerms::parse(
            &requirements.amount,
            &requirements.pay_to,
            &requirements.asset,
            requirements.extra.as_ref(),
        )?;
        self.candidate(
            requirements.network,
            v2::X402Version2::VALUE,
            terms,
            Envelope::V2 {
                accepted: original_json.clone(),
                resource,
            },
        )
    }
}

impl<S> X402SchemeClient for SolanaExactClient<S>
where
    S: Signer + Send + Sync + 'static,
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
    signer: Arc<S>,
    rpc_client: Arc<RpcClient>,
    terms: TransferTerms,
    envelope: Envelope,
}

#[async_trait]
impl<S: Signer + Send + Sync> PaymentCandidateSigner for PayloadSigner<S> {
    async fn sign_payment(&self) -> Result<String, X402Error> {
        let transaction = build_signed_transfer_transaction(
            self.signer.as_ref(),
            &self.rpc_client,
            &self.terms.fee_payer,
            &self.terms.pay_to,
            &self.terms.asset,
            self.terms.amount,
        )
        .await?;
        let payload = ExactSolanaPayload { transaction };

        let b64 = match &self.envelope {
            Envelope::V1 { network } => Base64Bytes::encode_json(&v1::PaymentPayload {
                x402_version: v1::X402Version1,
                scheme: EXACT_SCHEME.to_string(),
                network: network.clone(),
                payload,
            })?,
            Envelope::V2 { accepted, resource } => Base64Bytes::encode_json(&v2::PaymentPayload {
                x402_version: v2::X402Version2,
                accepted: accepted.clone(),
                resource: resource.clone(),
                payload,
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
    use solana_keypair::Keypair;

    const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    const PAY_TO: &str = "2wKupLR9q6wXYppw8Gr2NvWxKBUqm4PPJKkQfoxHDBg4";
    const FEE_PAYER: &str = "GVJJ7rdGiXr5xaYbRwRbjfaJL7fmwRygFi1H6aGqDveb";

    fn keypair() -> Keypair {
        Keypair::new_from_array([7u8; 32])
    }

    fn client(rpc_url: Option<&str>) -> SolanaExactClient<Keypair> {
        SolanaExactClient::new(
            Arc::new(keypair()),
            Arc::new(SolanaRpcClients::new(rpc_url.map(str::to_string))),
        )
    }

    fn v2_requirements(network: &str) -> serde_json::Value {
        json!({
            "scheme": "exact",
            "network": network,
            "amount": "10000",
            "asset": USDC_MINT,
            "payTo": PAY_TO,
            "maxTimeoutSeconds": 60,
            "extra": {"feePayer": FEE_PAYER}
        })
    }

    fn parse(body: serde_json::Value) -> PaymentRequired {
        parse_payment_required(&HeaderMap::new(), &serde_json::to_vec(&body).unwrap()).unwrap()
    }

    #[test]
    fn test_accepts_known_solana_networks_only() {
        let challenge = parse(json!({
            "x402Version": 2,
            "accepts": [
                v2_requirements("eip155:8453"),
                v2_requirements("solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp"),
                v2_requirements("solana:some-private-cluster"),
                {"scheme": "exact", "network": "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1", "amount": "1", "asset": USDC_MINT, "payTo": PAY_TO, "maxTimeoutSeconds": 60},
            ]
        }));
        let candidates = client(None).accept(&challenge);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].chain_id.reference, SOLANA_MAINNET_REFERENCE);
        assert_eq!(candidates[0].asset, USDC_MINT);
    }

    #[test]
    fn test_explicit_rpc_url_serves_any_solana_network() {
        let challenge = parse(json!({
            "x402Version": 2,
            "accepts": [v2_requirements("solana:some-private-cluster")]
        }));
        let candidates = client(Some("http://127.0.0.1:8899")).accept(&challenge);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_accepts_v1_by_network_name() {
        let challenge = parse(json!({
            "x402Version": 1,
            "accepts": [{
                "scheme": "exact",
                "network": "solana-devnet",
                "maxAmountRequired": "5000",
                "resource": "https://example.com",
                "description": "",
                "mimeType": "",
                "payTo": PAY_TO,
                "maxTimeoutSeconds": 60,
                "asset": USDC_MINT,
                "extra": {"feePayer": FEE_PAYER}
            }]
        }));
        let candidates = client(None).accept(&challenge);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].x402_version, 1);
        assert_eq!(candidates[0].chain_id.reference, SOLANA_DEVNET_REFERENCE);
    }

    #[test]
    fn test_rpc_clients_are_cached_per_network() {
        let rpc = SolanaRpcClients::new(None);
        let mainnet = ChainId::new(SOLANA_NAMESPACE, SOLANA_MAINNET_REFERENCE);
        let first = rpc.client_for(&mainnet).unwrap();
        let second = rpc.client_for(&mainnet).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            rpc.url_for(&ChainId::new(SOLANA_NAMESPACE, SOLANA_DEVNET_REFERENCE)),
            Some(SOLANA_DEVNET_RPC_URL.to_string())
        );
        assert!(rpc.client_for(&ChainId::new("eip155", "8453")).is_none());
    }

    #[test]
    fn test_compute_unit_limit_is_replaced_not_duplicated() {
        let mut ixs = vec![ComputeBudgetInstruction::set_compute_unit_price(5)];
        update_or_append_set_compute_unit_limit(&mut ixs, 1_000);
        update_or_append_set_compute_unit_limit(&mut ixs, 2_000);
        assert_eq!(ixs.len(), 2);
        assert_eq!(ixs[1], ComputeBudgetInstruction::set_compute_unit_limit(2_000));
    }

    #[test]
    fn test_signature_lands_at_signer_index() {
        let owner = keypair();
        let fee_payer: Pubkey = FEE_PAYER.parse().unwrap();
        let mint: Pubkey = USDC_MINT.parse().unwrap();
        let token_program = spl_token::id();
        let transfer = spl_token::instruction::transfer_checked(
            &token_program,
            &associated_token_address(&owner.pubkey(), &token_program, &mint),
            &mint,
            &associated_token_address(&PAY_TO.parse().unwrap(), &token_program, &mint),
            &owner.pubkey(),
            &[],
            10_000,
            6,
        )
        .unwrap();
        let (message, _) =
            build_message_to_simulate(fee_payer, &[transfer], 1, Hash::default()).unwrap();
        let tx = VersionedTransaction {
            signatures: vec![],
            message: VersionedMessage::V0(message),
        };
        let signed = sign_with_keypair(tx, &owner).unwrap();

        assert_eq!(signed.signatures.len(), 2);
        assert_eq!(signed.message.static_account_keys()[0], fee_payer);
        assert_eq!(signed.signatures[0], Signature::default());
        assert_ne!(signed.signatures[1], Signature::default());
        assert!(transaction_as_base64(&signed).is_ok());
    }

    #[test]
    fn test_sign_rejects_non_signer() {
        let fee_payer: Pubkey = FEE_PAYER.parse().unwrap();
        let (message, _) = build_message_to_simulate(fee_payer, &[], 1, Hash::default()).unwrap();
        let tx = VersionedTransaction {
            signatures: vec![],
            message: VersionedMessage::V0(message),
        };
        assert!(matches!(
            sign_with_keypair(tx, &keypair()),
            Err(X402Error::SigningError(_))
        ));
    }

    #[test]
    fn test_priority_fee_ignores_zero_fees() {
        let fees = vec![
            RpcPrioritizationFee {
                slot: 1,
                prioritization_fee: 0,
            },
            RpcPrioritizationFee {
                slot: 2,
                prioritization_fee: 7,
            },
            RpcPrioritizationFee {
                slot: 3,
                prioritization_fee: 3,
            },
        ];
        assert_eq!(pick_priority_fee(&fees), 3);
        assert_eq!(pick_priority_fee(&[]), 1);
    }
}
