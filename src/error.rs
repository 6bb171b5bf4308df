//! Error types.
//!
//! [`ConfigError`] is raised while building wallets, payment clients and facades,
//! and is always fatal to that constructor. [`X402Error`] describes a 402 challenge
//! that could not be answered; the transports catch it, log it and hand the
//! original 402 back to the caller.

use crate::config::ConfigFileError;

/// Construction-time configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Provide exactly one credential source: 'wallet', 'wallets', 'private_key'/'mnemonic', or 'x402_client'."
    )]
    MissingCredentialSource,

    #[error(
        "Provide only one credential source: 'wallet', 'wallets', 'private_key'/'mnemonic', or 'x402_client'."
    )]
    MultipleCredentialSources,

    #[error("EvmWallet requires 'private_key' or 'mnemonic'")]
    MissingEvmCredential,

    #[error("EvmWallet accepts only one of 'private_key' or 'mnemonic'")]
    ConflictingEvmCredentials,

    #[error("'derivation_path' requires 'mnemonic'")]
    DerivationPathWithoutMnemonic,

    #[error("SvmWallet requires a non-empty 'private_key'")]
    EmptySvmKey,

    #[error("Invalid {chain} key material: {reason}")]
    InvalidKey { chain: &'static str, reason: String },

    #[error("'{0}' wallets need the `{0}` cargo feature")]
    FeatureDisabled(&'static str),

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("Invalid default header: {0}")]
    InvalidHeader(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    ConfigFile(#[from] ConfigFileError),
}

/// Errors that prevent a 402 challenge from being paid.
#[derive(Debug, thiserror::Error)]
pub enum X402Error {
    #[error("No matching payment option found")]
    NoMatchingPaymentOption,

    #[error("Request is not cloneable (streaming body?)")]
    RequestNotCloneable,

    #[error("Failed to parse 402 response: {0}")]
    ParseError(String),

    #[error("Failed to sign payment: {0}")]
    SigningError(String),

    #[error("Signed payment is not a valid header value")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Errors from the blocking facade's request helpers.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("Failed to encode request body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] http::Error),
}
