//! File-based client configuration.
//!
//! [`ClientConfig`] mirrors the facade builder as JSON, so a deployment can keep
//! wallets, policies and endpoint settings out of code:
//!
//! ```json
//! {
//!   "wallets": [
//!     { "chain": "evm", "private_key": "$EVM_PRIVATE_KEY" },
//!     { "chain": "svm", "private_key": "${SVM_PRIVATE_KEY}", "rpc_url": "https://api.devnet.solana.com" }
//!   ],
//!   "policies": [
//!     { "prefer_network": "eip155:8453" },
//!     { "max_amount": "1000000" }
//!   ],
//!   "base_url": "https://llm.qntx.fun/v1",
//!   "timeout_secs": 120
//! }
//! ```
//!
//! # Environment Variable Resolution
//!
//! Secrets and endpoints are [`LiteralOrEnv`] values: a literal, `$VAR`, or
//! `${VAR}`. References are resolved while the file is parsed; a missing
//! variable fails the parse.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

use crate::error::ConfigError;
use crate::policy::{MaxAmount, PaymentPolicy, PreferNetwork, PreferScheme};
use crate::wallets::Wallet;

/// A value given literally or as an environment variable reference.
#[derive(Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    /// Returns the variable name if `s` is `$VAR` or `${VAR}`.
    fn parse_env_var_syntax(s: &str) -> Option<&str> {
        if let Some(braced) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
            Some(braced)
        } else {
            s.strip_prefix('$').filter(|name| {
                !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
            })
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Values may be secrets; only the type is shown.
impl<T> fmt::Debug for LiteralOrEnv<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LiteralOrEnv<{}>(..)", std::any::type_name::<T>())
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = match Self::parse_env_var_syntax(&s) {
            Some(var_name) => std::env::var(var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{var_name}' not found (referenced as '{s}')"
                ))
            })?,
            None => s,
        };
        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {e}")))?;
        Ok(LiteralOrEnv(parsed))
    }
}

impl<T: Serialize> Serialize for LiteralOrEnv<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

/// Errors reading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

/// Client configuration, as read from JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub wallets: Vec<WalletConfig>,
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
    pub base_url: Option<LiteralOrEnv<Url>>,
    pub api_key: Option<LiteralOrEnv<String>>,
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigFileError::FileRead(path.to_path_buf(), e))?;
        content.parse()
    }

    /// Builds the configured wallets, in file order.
    pub fn build_wallets(&self) -> Result<Vec<Arc<dyn Wallet>>, ConfigError> {
        self.wallets.iter().map(WalletConfig::build).collect()
    }

    /// Builds the configured policies, in file order.
    pub fn build_policies(&self) -> Vec<Arc<dyn PaymentPolicy>> {
        self.policies.iter().map(PolicyConfig::build).collect()
    }
}

impl FromStr for ClientConfig {
    type Err = ConfigFileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

/// One wallet entry, tagged by `"chain"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "chain", rename_all = "lowercase")]
pub enum WalletConfig {
    Evm(EvmWalletConfig),
    Svm(SvmWalletConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvmWalletConfig {
    pub private_key: Option<LiteralOrEnv<String>>,
    pub mnemonic: Option<LiteralOrEnv<String>>,
    #[serde(default)]
    pub account_index: u32,
    pub derivation_path: Option<String>,
    pub passphrase: Option<LiteralOrEnv<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SvmWalletConfig {
    pub private_key: LiteralOrEnv<String>,
    pub rpc_url: Option<LiteralOrEnv<Url>>,
}

impl WalletConfig {
    pub fn build(&self) -> Result<Arc<dyn Wallet>, ConfigError> {
        match self {
            #[cfg(feature = "evm")]
            WalletConfig::Evm(config) => {
                let wallet = crate::wallets::EvmWallet::new(crate::wallets::EvmWalletOptions {
                    private_key: config.private_key.clone().map(LiteralOrEnv::into_inner),
                    mnemonic: config.mnemonic.clone().map(LiteralOrEnv::into_inner),
                    account_index: config.account_index,
                    derivation_path: config.derivation_path.clone(),
                    passphrase: config.passphrase.clone().map(LiteralOrEnv::into_inner),
                })?;
                Ok(Arc::new(wallet))
            }
            #[cfg(not(feature = "evm"))]
            WalletConfig::Evm(_) => Err(ConfigError::FeatureDisabled("evm")),
            #[cfg(feature = "svm")]
            WalletConfig::Svm(config) => {
                let mut wallet = crate::wallets::SvmWallet::new(config.private_key.clone().into_inner())?;
                if let Some(rpc_url) = &config.rpc_url {
                    wallet = wallet.with_rpc_url(rpc_url.as_str());
                }
                Ok(Arc::new(wallet))
            }
            #[cfg(not(feature = "svm"))]
            WalletConfig::Svm(_) => Err(ConfigError::FeatureDisabled("svm")),
        }
    }
}

/// One policy entry, e.g. `{"prefer_network": "base"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyConfig {
    PreferNetwork(String),
    PreferScheme(String),
    MaxAmount(LiteralOrEnv<U256>),
}

impl PolicyConfig {
    pub fn build(&self) -> Arc<dyn PaymentPolicy> {
        match self {
            PolicyConfig::PreferNetwork(network) => Arc::new(PreferNetwork::new(network)),
            PolicyConfig::PreferScheme(scheme) => Arc::new(PreferScheme(scheme.clone())),
            PolicyConfig::MaxAmount(amount) => Arc::new(MaxAmount(**amount)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyKind;

    #[test]
    fn test_env_var_syntax() {
        assert_eq!(LiteralOrEnv::<String>::parse_env_var_syntax("$API_KEY"), Some("API_KEY"));
        assert_eq!(LiteralOrEnv::<String>::parse_env_var_syntax("${API_KEY}"), Some("API_KEY"));
        assert_eq!(LiteralOrEnv::<String>::parse_env_var_syntax("$"), None);
        assert_eq!(LiteralOrEnv::<String>::parse_env_var_syntax("$A-B"), None);
        assert_eq!(LiteralOrEnv::<String>::parse_env_var_syntax("literal"), None);
    }

    #[test]
    fn test_env_reference_resolves_at_parse_time() {
        let Ok(path) = std::env::var("PATH") else {
            return;
        };
        let value: LiteralOrEnv<String> = serde_json::from_str(r#""${PATH}""#).unwrap();
        assert_eq!(*value, path);

        let missing = serde_json::from_str::<LiteralOrEnv<String>>(
            r#""$X402_OPENAI_TEST_VARIABLE_THAT_IS_NEVER_SET""#,
        );
        let err = missing.unwrap_err().to_string();
        assert!(err.contains("X402_OPENAI_TEST_VARIABLE_THAT_IS_NEVER_SET"), "{err}");
    }

    #[test]
    fn test_debug_does_not_print_values() {
        let value = LiteralOrEnv::from_literal("super-secret".to_string());
        assert!(!format!("{value:?}").contains("super-secret"));
    }

    #[test]
    fn test_parse_full_config() {
        let config: ClientConfig = r#"{
            "wallets": [
                {"chain": "evm", "mnemonic": "test test test test test test test test test test test junk", "account_index": 1},
                {"chain": "svm", "private_key": "4NMwxzmYj2uvHuq8xoqhY8RXg63KSVJM1DXkpbmkUY7YQWuoyQgFnnzn6yo3CMnqZasnNPNuAT2TLwQsCaKkUddp", "rpc_url": "http://127.0.0.1:8899"}
            ],
            "policies": [
                {"prefer_network": "base"},
                {"prefer_scheme": "exact"},
                {"max_amount": "1000000"}
            ],
            "base_url": "https://llm.qntx.fun/v1",
            "api_key": "x402",
            "timeout_secs": 30
        }"#
        .parse()
        .unwrap();

        assert_eq!(config.wallets.len(), 2);
        assert!(matches!(&config.wallets[0], WalletConfig::Evm(evm) if evm.account_index == 1));
        assert_eq!(
            config.policies[2],
            PolicyConfig::MaxAmount(LiteralOrEnv::from_literal(U256::from(1_000_000u64)))
        );
        assert_eq!(config.base_url.as_deref().map(Url::as_str), Some("https://llm.qntx.fun/v1"));
        assert_eq!(config.timeout_secs, Some(30));
        assert_eq!(config.connect_timeout_secs, None);

        let kinds: Vec<_> = config.build_policies().iter().map(|p| p.kind()).collect();
        assert_eq!(
            kinds,
            vec![PolicyKind::Preference, PolicyKind::Preference, PolicyKind::Limit]
        );
    }

    #[cfg(all(feature = "evm", feature = "svm"))]
    #[test]
    fn test_build_wallets_validates_credentials() {
        let config: ClientConfig = r#"{"wallets": [{"chain": "evm"}]}"#.parse().unwrap();
        assert!(matches!(
            config.build_wallets(),
            Err(ConfigError::MissingEvmCredential)
        ));

        let config: ClientConfig = r#"{"wallets": [{"chain": "svm", "private_key": ""}]}"#
            .parse()
            .unwrap();
        assert!(matches!(config.build_wallets(), Err(ConfigError::EmptySvmKey)));
    }

    #[test]
    fn test_unknown_chain_is_rejected() {
        let err = r#"{"wallets": [{"chain": "aptos", "private_key": "0x01"}]}"#
            .parse::<ClientConfig>()
            .unwrap_err();
        assert!(matches!(err, ConfigFileError::JsonParse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ClientConfig::load_from_path("/nonexistent/x402-openai.json").unwrap_err();
        assert!(matches!(err, ConfigFileError::FileRead(path, _) if path.ends_with("x402-openai.json")));
    }
}
