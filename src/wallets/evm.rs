//! EVM wallet: a raw secp256k1 key or a BIP-39 mnemonic with BIP-44 derivation.

use alloy_primitives::Address;
use alloy_signer_local::coins_bip39::English;
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

use super::Wallet;
use crate::client::SchemeRegistry;
use crate::error::ConfigError;
use crate::scheme::eip155_exact::Eip155ExactClient;

/// Options accepted by [`EvmWallet::new`]. Exactly one of `private_key` or
/// `mnemonic` must be set.
#[derive(Clone, Default)]
pub struct EvmWalletOptions {
    /// Hex-encoded secp256k1 key, with or without `0x`.
    pub private_key: Option<String>,
    /// BIP-39 phrase (English wordlist).
    pub mnemonic: Option<String>,
    /// BIP-44 account index, used when no explicit path is set.
    pub account_index: u32,
    /// Explicit derivation path; overrides `account_index`.
    pub derivation_path: Option<String>,
    /// BIP-39 passphrase, empty by default.
    pub passphrase: Option<String>,
}

impl fmt::Debug for EvmWalletOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmWalletOptions")
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "<redacted>"))
            .field("account_index", &self.account_index)
            .field("derivation_path", &self.derivation_path)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
enum EvmCredential {
    PrivateKey(String),
    Mnemonic {
        phrase: String,
        derivation_path: String,
        passphrase: String,
    },
}

pub struct EvmWallet {
    credential: EvmCredential,
    signer: OnceCell<Arc<PrivateKeySigner>>,
}

impl fmt::Debug for EvmWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("EvmWallet");
        match &self.credential {
            EvmCredential::PrivateKey(_) => debug.field("credential", &"private_key"),
            EvmCredential::Mnemonic {
                derivation_path, ..
            } => debug.field("derivation_path", derivation_path),
        };
        debug
            .field("address", &self.signer.get().map(|s| s.address()))
            .finish()
    }
}

impl EvmWallet {
    /// Validates the credential combination. Keys are not parsed yet.
    pub fn new(options: EvmWalletOptions) -> Result<Self, ConfigError> {
        let EvmWalletOptions {
            private_key,
            mnemonic,
            account_index,
            derivation_path,
            passphrase,
        } = options;
        let credential = match (private_key, mnemonic) {
            (None, None) => return Err(ConfigError::MissingEvmCredential),
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingEvmCredentials),
            (Some(_), None) if derivation_path.is_some() => {
                return Err(ConfigError::DerivationPathWithoutMnemonic);
            }
            (Some(private_key), None) => EvmCredential::PrivateKey(private_key),
            (None, Some(phrase)) => EvmCredential::Mnemonic {
                phrase,
                derivation_path: derivation_path
                    .unwrap_or_else(|| default_derivation_path(account_index)),
                passphrase: passphrase.unwrap_or_default(),
            },
        };
        Ok(Self {
            credential,
            signer: OnceCell::new(),
        })
    }

    pub fn from_private_key(private_key: impl Into<String>) -> Self {
        Self {
            credential: EvmCredential::PrivateKey(private_key.into()),
            signer: OnceCell::new(),
        }
    }

    /// Mnemonic wallet at `m/44'/60'/0'/0/{account_index}` with an empty passphrase.
    pub fn from_mnemonic(mnemonic: impl Into<String>, account_index: u32) -> Self {
        Self {
            credential: EvmCredential::Mnemonic {
                phrase: mnemonic.into(),
                derivation_path: default_derivation_path(account_index),
                passphrase: String::new(),
            },
            signer: OnceCell::new(),
        }
    }

    /// Derivation path in use, `None` for raw-key wallets.
    pub fn derivation_path(&self) -> Option<&str> {
        match &self.credential {
            EvmCredential::PrivateKey(_) => None,
            EvmCredential::Mnemonic {
                derivation_path, ..
            } => Some(derivation_path),
        }
    }

    /// Account address. Resolves (and caches) the signer on first call.
    pub fn address(&self) -> Result<Address, ConfigError> {
        Ok(self.signer()?.address())
    }

    fn signer(&self) -> Result<&Arc<PrivateKeySigner>, ConfigError> {
        self.signer.get_or_try_init(|| {
            let signer = match &self.credential {
                EvmCredential::PrivateKey(private_key) => private_key
                    .trim()
                    .parse::<PrivateKeySigner>()
                    .map_err(invalid_key)?,
                EvmCredential::Mnemonic {
                    phrase,
                    derivation_path,
                    passphrase,
                } => MnemonicBuilder::<English>::default()
                    .phrase(phrase.as_str())
                    .derivation_path(derivation_path.as_str())
                    .map_err(invalid_key)?
                    .password(passphrase.as_str())
                    .build()
                    .map_err(invalid_key)?,
            };
            tracing::debug!(address = %signer.address(), "Resolved EVM signer");
            Ok(Arc::new(signer))
        })
    }
}

impl Wallet for EvmWallet {
    fn register(&self, registry: &mut dyn SchemeRegistry) -> Result<(), ConfigError> {
        let signer = Arc::clone(self.signer()?);
        registry.register_scheme(Arc::new(Eip155ExactClient::new(signer)));
        Ok(())
    }
}

fn default_derivation_path(account_index: u32) -> String {
    format!("m/44'/60'/0'/0/{account_index}")
}

fn invalid_key(e: impl fmt::Display) -> ConfigError {
    ConfigError::InvalidKey {
        chain: "EVM",
        reason: e.to_string(),
    }
}
