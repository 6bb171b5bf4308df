//! Credential resolution: turns the caller's credential inputs into wallets or a
//! ready-made payment client.
//!
//! Exactly one source must be given:
//!
//! - a single wallet,
//! - a non-empty list of wallets,
//! - a raw EVM key or mnemonic (legacy shortcut, builds one [`EvmWallet`](crate::wallets::EvmWallet)),
//! - a pre-built payment client, used verbatim.

use std::fmt;
use std::sync::Arc;

use crate::client::PaymentClientFlavor;
use crate::error::ConfigError;
use crate::policy::PaymentPolicy;
use crate::wallets::Wallet;

/// Credential inputs, all optional. `C` is the pre-built payment client type.
pub struct Credentials<C> {
    pub wallet: Option<Arc<dyn Wallet>>,
    pub wallets: Vec<Arc<dyn Wallet>>,
    pub private_key: Option<String>,
    pub mnemonic: Option<String>,
    pub account_index: u32,
    pub derivation_path: Option<String>,
    pub passphrase: Option<String>,
    pub x402_client: Option<C>,
}

impl<C> Default for Credentials<C> {
    fn default() -> Self {
        Self {
            wallet: None,
            wallets: Vec::new(),
            private_key: None,
            mnemonic: None,
            account_index: 0,
            derivation_path: None,
            passphrase: None,
            x402_client: None,
        }
    }
}

impl<C> fmt::Debug for Credentials<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("wallet", &self.wallet)
            .field("wallets", &self.wallets)
            .field("private_key", &self.private_key.is_some())
            .field("mnemonic", &self.mnemonic.is_some())
            .field("account_index", &self.account_index)
            .field("derivation_path", &self.derivation_path)
            .field("x402_client", &self.x402_client.is_some())
            .finish_non_exhaustive()
    }
}

/// Which credential source was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Wallet,
    Wallets,
    Legacy,
    Prebuilt,
}

/// Checks that exactly one credential source is present.
pub fn select_source<C>(credentials: &Credentials<C>) -> Result<CredentialSource, ConfigError> {
    let present = [
        (credentials.wallet.is_some(), CredentialSource::Wallet),
        (!credentials.wallets.is_empty(), CredentialSource::Wallets),
        (
            credentials.private_key.is_some() || credentials.mnemonic.is_some(),
            CredentialSource::Legacy,
        ),
        (credentials.x402_client.is_some(), CredentialSource::Prebuilt),
    ];
    let mut sources = present
        .into_iter()
        .filter_map(|(is_present, source)| is_present.then_some(source));
    match (sources.next(), sources.next()) {
        (None, _) => Err(ConfigError::MissingCredentialSource),
        (Some(source), None) => Ok(source),
        (Some(_), Some(_)) => Err(ConfigError::MultipleCredentialSources),
    }
}

/// The outcome of credential resolution.
pub enum Resolved<C> {
    Wallets(Vec<Arc<dyn Wallet>>),
    Prebuilt(C),
}

impl<C> fmt::Debug for Resolved<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::Wallets(wallets) => f.debug_tuple("Wallets").field(wallets).finish(),
            Resolved::Prebuilt(_) => f.write_str("Prebuilt(..)"),
        }
    }
}

/// Normalizes the credential source into a wallet list, or passes a pre-built
/// client through untouched.
pub fn resolve_wallets<C>(credentials: Credentials<C>) -> Result<Resolved<C>, ConfigError> {
    let source = select_source(&credentials)?;
    let Credentials {
        wallet,
        wallets,
        private_key,
        mnemonic,
        account_index,
        derivation_path,
        passphrase,
        x402_client,
    } = credentials;
    let resolved = match source {
        CredentialSource::Prebuilt => x402_client.map(Resolved::Prebuilt),
        CredentialSource::Wallet => wallet.map(|wallet| Resolved::Wallets(vec![wallet])),
        CredentialSource::Wallets => Some(Resolved::Wallets(wallets)),
        #[cfg(feature = "evm")]
        CredentialSource::Legacy => {
            let wallet: Arc<dyn Wallet> =
                Arc::new(crate::wallets::EvmWallet::new(crate::wallets::EvmWalletOptions {
                    private_key,
                    mnemonic,
                    account_index,
                    derivation_path,
                    passphrase,
                })?);
            Some(Resolved::Wallets(vec![wallet]))
        }
        #[cfg(not(feature = "evm"))]
        CredentialSource::Legacy => {
            let _ = (private_key, mnemonic, account_index, derivation_path, passphrase);
            return Err(ConfigError::FeatureDisabled("evm"));
        }
    };
    resolved.ok_or(ConfigError::MissingCredentialSource)
}

/// Builds a payment client of flavor `C`: wallets register first, in order,
/// then policies, in order.
pub fn build_payment_client<C: PaymentClientFlavor>(
    wallets: &[Arc<dyn Wallet>],
    policies: &[Arc<dyn PaymentPolicy>],
) -> Result<C, ConfigError> {
    let mut client = C::empty();
    for wallet in wallets {
        wallet.register(&mut client)?;
    }
    for policy in policies {
        client.register_policy(Arc::clone(policy));
    }
    tracing::debug!(
        wallets = wallets.len(),
        policies = policies.len(),
        "Built x402 payment client"
    );
    Ok(client)
}

/// Resolves credentials and produces the payment client.
///
/// A pre-built client is returned as is; `policies` are not applied to it.
pub fn create_x402_client<C: PaymentClientFlavor>(
    credentials: Credentials<C>,
    policies: &[Arc<dyn PaymentPolicy>],
) -> Result<C, ConfigError> {
    match resolve_wallets(credentials)? {
        Resolved::Prebuilt(client) => {
            if !policies.is_empty() {
                tracing::warn!(
                    policies = policies.len(),
                    "Ignoring policies: a pre-built x402_client is used as is, register policies on it directly"
                );
            }
            Ok(client)
        }
        Resolved::Wallets(wallets) => build_payment_client(&wallets, policies),
    }
}
