//! Wallets: credential material for one chain family.
//!
//! A wallet holds a raw key or a mnemonic and knows which scheme clients can
//! spend from it. Key material is parsed or derived on first [`Wallet::register`]
//! and cached, so constructing a wallet is cheap and never fails on bad keys.
//!
//! | Wallet | Feature | Registers |
//! |--------|---------|-----------|
//! | [`EvmWallet`] | `evm` | `eip155` "exact" (ERC-3009 over EIP-712), v1 and v2 |
//! | [`SvmWallet`] | `svm` | `solana` "exact" (SPL `TransferChecked`), v1 and v2 |

use std::fmt::Debug;

use crate::client::SchemeRegistry;
use crate::error::ConfigError;

#[cfg(feature = "evm")]
pub mod evm;
#[cfg(feature = "svm")]
pub mod svm;

#[cfg(feature = "evm")]
pub use evm::{EvmWallet, EvmWalletOptions};
#[cfg(feature = "svm")]
pub use svm::SvmWallet;

/// A signing identity that registers its payment capabilities with a client.
pub trait Wallet: Send + Sync + Debug {
    /// Registers the scheme clients this wallet can pay with.
    ///
    /// Fails with [`ConfigError::InvalidKey`] when the key material cannot be used.
    fn register(&self, registry: &mut dyn SchemeRegistry) -> Result<(), ConfigError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::policy::PaymentPolicy;
    use crate::scheme::{X402SchemeClient, X402SchemeId};
    use std::sync::Arc;

    /// Records the scheme ids registered into it.
    #[derive(Default)]
    pub struct RecordingRegistry {
        pub schemes: Vec<String>,
        pub policies: usize,
    }

    impl SchemeRegistry for RecordingRegistry {
        fn register_scheme(&mut self, scheme: Arc<dyn X402SchemeClient>) {
            self.schemes
                .push(format!("{}:{}", scheme.namespace(), scheme.scheme()));
        }

        fn register_policy(&mut self, _policy: Arc<dyn PaymentPolicy>) {
            self.policies += 1;
        }
    }

    /// Wallet registering a fixed scheme id, for resolver and builder tests.
    #[derive(Debug)]
    pub struct FakeWallet(pub &'static str);

    impl Wallet for FakeWallet {
        fn register(&self, registry: &mut dyn SchemeRegistry) -> Result<(), ConfigError> {
            registry.register_scheme(Arc::new(FakeScheme(self.0)));
            Ok(())
        }
    }

    /// Accepts every V2 offer in its namespace; the payment header is the namespace itself.
    pub struct FakeScheme(pub &'static str);

    impl X402SchemeId for FakeScheme {
        fn namespace(&self) -> &str {
            self.0
        }

        fn scheme(&self) -> &str {
            "exact"
        }
    }

    impl X402SchemeClient for FakeScheme {
        fn accept(
            &self,
            payment_required: &crate::proto::PaymentRequired,
        ) -> Vec<crate::scheme::PaymentCandidate> {
            payment_required
                .accepts()
                .iter()
                .filter_map(|json| json.parse::<crate::proto::v2::PaymentRequirements>().ok())
                .filter(|r| r.network.namespace == self.0)
                .map(|r| crate::scheme::PaymentCandidate {
                    chain_id: r.network,
                    asset: r.asset,
                    amount: alloy_primitives::U256::from_str_radix(&r.amount, 10).unwrap(),
                    scheme: r.scheme,
                    x402_version: payment_required.x402_version(),
                    pay_to: r.pay_to,
                    signer: Box::new(crate::scheme::tests::StaticSigner(self.0)),
                })
                .collect()
        }
    }
}
