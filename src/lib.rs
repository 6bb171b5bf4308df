//! OpenAI-compatible HTTP client with transparent [x402](https://www.x402.org) payments.
//!
//! An x402 gateway answers unpaid requests with `402 Payment Required` and a list
//! of acceptable payment options. This crate intercepts that response, picks an
//! option the configured wallets can pay, signs the payment, and retries the
//! request once with the payment header attached.
//!
//! # Overview
//!
//! - [`wallets`] - EVM and Solana wallets that register payment capabilities.
//! - [`credentials`] - exactly-one-of validation of wallet inputs and payment client assembly.
//! - [`policy`] - network, scheme and amount policies that rank payment options.
//! - [`client`] - [`X402Client`](client::X402Client) and its blocking counterpart
//!   [`X402ClientSync`](client::X402ClientSync), which parse 402 challenges and sign payments.
//! - [`transport`] - the payment-interception transports (blocking, async, and as
//!   `reqwest-middleware`), all driven by one [`PaymentFlow`](transport::PaymentFlow).
//! - [`openai`] - [`X402OpenAI`] and [`BlockingX402OpenAI`], the client facades.
//! - [`config`] - JSON configuration files with `$VAR` resolution.
//! - [`proto`], [`scheme`], [`chain`], [`networks`] - x402 wire types, scheme clients and chain identifiers.
//!
//! # Features
//!
//! - `evm` (default) - [`EvmWallet`](wallets::EvmWallet) and the `eip155` "exact" scheme.
//! - `svm` (default) - [`SvmWallet`](wallets::SvmWallet) and the `solana` "exact" scheme.
//! - `telemetry` - `tracing` spans around payment signing and middleware handling.
//!
//! # Example
//!
//! ```rust,no_run
//! use x402_openai::BlockingX402OpenAI;
//! use x402_openai::policy::{max_amount, prefer_network};
//! use x402_openai::wallets::SvmWallet;
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = BlockingX402OpenAI::builder()
//!     .wallet(SvmWallet::new(std::env::var("SVM_PRIVATE_KEY")?)?)
//!     .policy(prefer_network("solana"))
//!     .policy(max_amount(1_000_000))
//!     .build()?;
//!
//! let models = client.get("models")?;
//! println!("{}", String::from_utf8_lossy(models.body()));
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod chain;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod networks;
pub mod openai;
pub mod policy;
pub mod proto;
pub mod scheme;
pub mod timestamp;
pub mod transport;
pub mod util;
pub mod wallets;

pub use error::{ConfigError, RequestError, X402Error};
pub use openai::{BlockingX402OpenAI, X402OpenAI, X402OpenAIBuilder};
