//! Solana wallet: a base58 ed25519 keypair.

use once_cell::sync::OnceCell;
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use std::fmt;
use std::sync::Arc;

use super::Wallet;
use crate::client::SchemeRegistry;
use crate::error::ConfigError;
use crate::scheme::solana_exact::{SolanaExactClient, SolanaRpcClients};

pub struct SvmWallet {
    private_key: String,
    rpc_url: Option<String>,
    keypair: OnceCell<Arc<Keypair>>,
    rpc: OnceCell<Arc<SolanaRpcClients>>,
}

impl fmt::Debug for SvmWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SvmWallet")
            .field("pubkey", &self.keypair.get().map(|k| k.pubkey()))
            .field("rpc_url", &self.rpc_url)
            .finish_non_exhaustive()
    }
}

impl SvmWallet {
    /// Wallet for a base58 keypair (64 bytes) or secret key (32 bytes).
    ///
    /// The key is stored verbatim and decoded on first use.
    pub fn new(private_key: impl Into<String>) -> Result<Self, ConfigError> {
        let private_key = private_key.into();
        if private_key.trim().is_empty() {
            return Err(ConfigError::EmptySvmKey);
        }
        Ok(Self {
            private_key,
            rpc_url: None,
            keypair: OnceCell::new(),
            rpc: OnceCell::new(),
        })
    }

    /// Uses `rpc_url` for every Solana network instead of the public endpoints.
    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = Some(rpc_url.into());
        self.rpc = OnceCell::new();
        self
    }

    pub fn rpc_url(&self) -> Option<&str> {
        self.rpc_url.as_deref()
    }

    /// Public key. Decodes (and caches) the keypair on first call.
    pub fn pubkey(&self) -> Result<Pubkey, ConfigError> {
        Ok(self.keypair()?.pubkey())
    }

    fn keypair(&self) -> Result<&Arc<Keypair>, ConfigError> {
        self.keypair.get_or_try_init(|| {
            let bytes = bs58::decode(self.private_key.trim())
                .into_vec()
                .map_err(invalid_key)?;
            let keypair = match bytes.len() {
                64 => Keypair::try_from(bytes.as_slice()).map_err(invalid_key)?,
                32 => {
                    let mut secret = [0u8; 32];
                    secret.copy_from_slice(&bytes);
                    Keypair::new_from_array(secret)
                }
                len => return Err(invalid_key(format!("expected 32 or 64 bytes, got {len}"))),
            };
            tracing::debug!(pubkey = %keypair.pubkey(), "Resolved Solana keypair");
            Ok(Arc::new(keypair))
        })
    }

    fn rpc(&self) -> Arc<SolanaRpcClients> {
        Arc::clone(
            self.rpc
                .get_or_init(|| Arc::new(SolanaRpcClients::new(self.rpc_url.clone()))),
        )
    }
}

impl Wallet for SvmWallet {
    fn register(&self, registry: &mut dyn SchemeRegistry) -> Result<(), ConfigError> {
        let keypair = Arc::clone(self.keypair()?);
        registry.register_scheme(Arc::new(SolanaExactClient::new(keypair, self.rpc())));
        Ok(())
    }
}

fn invalid_key(e: impl fmt::Display) -> ConfigError {
    ConfigError::InvalidKey {
        chain: "Solana",
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallets::tests::RecordingRegistry;

    fn keypair() -> Keypair {
        Keypair::new_from_array([7u8; 32])
    }

    #[test]
    fn test_empty_key_is_rejected() {
        assert!(matches!(SvmWallet::new(""), Err(ConfigError::EmptySvmKey)));
        assert!(matches!(SvmWallet::new("   "), Err(ConfigError::EmptySvmKey)));
    }

    #[test]
    fn test_keypair_and_secret_encodings() {
        let expected = keypair();
        let full = SvmWallet::new(expected.to_base58_string()).unwrap();
        assert_eq!(full.private_key, expected.to_base58_string());
        assert_eq!(full.pubkey().unwrap(), expected.pubkey());

        let secret = SvmWallet::new(bs58::encode([7u8; 32]).into_string()).unwrap();
        assert_eq!(secret.pubkey().unwrap(), expected.pubkey());
    }

    #[test]
    fn test_invalid_key_fails_on_register() {
        let wallet = SvmWallet::new("0OIl").unwrap();
        let mut registry = RecordingRegistry::default();
        let err = wallet.register(&mut registry).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKey { chain: "Solana", .. }));

        let short = SvmWallet::new(bs58::encode([1u8; 16]).into_string()).unwrap();
        assert!(short.pubkey().is_err());
    }

    #[test]
    fn test_register_adds_solana_exact() {
        let wallet = SvmWallet::new(keypair().to_base58_string())
            .unwrap()
            .with_rpc_url("http://127.0.0.1:8899");
        assert_eq!(wallet.rpc_url(), Some("http://127.0.0.1:8899"));
        let mut registry = RecordingRegistry::default();
        wallet.register(&mut registry).unwrap();
        assert_eq!(registry.schemes, vec!["solana:exact"]);
    }

    #[test]
    fn test_debug_hides_key() {
        let encoded = keypair().to_base58_string();
        let wallet = SvmWallet::new(encoded.clone()).unwrap();
        wallet.pubkey().unwrap();
        assert!(!format!("{wallet:?}").contains(&encoded));
    }
}
