//! Protocol types for x402 payment challenges and payloads.
//!
//! Both protocol versions are understood:
//!
//! - **V1** ([`v1`]): challenge in the JSON response body, network names, `X-PAYMENT` header
//! - **V2** ([`v2`]): challenge in the `PAYMENT-REQUIRED` header, CAIP-2 chain IDs,
//!   `PAYMENT-SIGNATURE` header
//!
//! [`parse_payment_required`] turns the headers and body of a 402 response into
//! a [`PaymentRequired`], keeping each offered requirement as verbatim JSON so
//! that scheme clients can deserialize it into their own types and echo it back.

use http::{HeaderMap, HeaderName};
use serde::{Deserialize, Serialize};

use crate::error::X402Error;
use crate::util::Base64Bytes;

pub mod v1;
pub mod v2;

/// Header carrying the base64 JSON challenge of a V2 402 response.
pub const PAYMENT_REQUIRED_HEADER: HeaderName = HeaderName::from_static("payment-required");
/// Header carrying a signed V2 payment.
pub const PAYMENT_SIGNATURE_HEADER: HeaderName = HeaderName::from_static("payment-signature");
/// Header carrying a signed V1 payment.
pub const X_PAYMENT_HEADER: HeaderName = HeaderName::from_static("x-payment");

/// Verbatim JSON for payment requirements.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OriginalJson(pub Box<serde_json::value::RawValue>);

impl OriginalJson {
    pub fn get(&self) -> &str {
        self.0.get()
    }

    /// Deserializes the verbatim JSON into a concrete requirements type.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(self.0.get())
    }
}

/// A parsed 402 challenge, either version.
#[derive(Debug, Clone)]
pub enum PaymentRequired {
    V1(v1::PaymentRequired<OriginalJson>),
    V2(v2::PaymentRequired<OriginalJson>),
}

impl PaymentRequired {
    pub fn x402_version(&self) -> u8 {
        match self {
            PaymentRequired::V1(_) => v1::X402Version1::VALUE,
            PaymentRequired::V2(_) => v2::X402Version2::VALUE,
        }
    }

    /// The header the signed payment must travel in.
    pub fn payment_header_name(&self) -> HeaderName {
        match self {
            PaymentRequired::V1(_) => X_PAYMENT_HEADER,
            PaymentRequired::V2(_) => PAYMENT_SIGNATURE_HEADER,
        }
    }

    pub fn accepts(&self) -> &[OriginalJson] {
        match self {
            PaymentRequired::V1(payment_required) => &payment_required.accepts,
            PaymentRequired::V2(payment_required) => &payment_required.accepts,
        }
    }

    /// Error message the gateway attached to the challenge, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            PaymentRequired::V1(payment_required) => payment_required.error.as_deref(),
            PaymentRequired::V2(payment_required) => payment_required.error.as_deref(),
        }
    }
}

/// Parses a 402 response into a [`PaymentRequired`].
///
/// The V2 `PAYMENT-REQUIRED` header wins; otherwise the body is tried as a V2
/// document and then as a V1 document.
pub fn parse_payment_required(headers: &HeaderMap, body: &[u8]) -> Result<PaymentRequired, X402Error> {
    let v2_from_header = headers
        .get(PAYMENT_REQUIRED_HEADER)
        .and_then(|h| Base64Bytes::from(h.as_bytes()).decode().ok())
        .and_then(|b| serde_json::from_slice::<v2::PaymentRequired<OriginalJson>>(&b).ok());
    if let Some(payment_required) = v2_from_header {
        tracing::trace!("Parsed V2 payment required from header");
        return Ok(PaymentRequired::V2(payment_required));
    }

    if let Ok(payment_required) = serde_json::from_slice::<v2::PaymentRequired<OriginalJson>>(body) {
        tracing::trace!("Parsed V2 payment required from body");
        return Ok(PaymentRequired::V2(payment_required));
    }

    match serde_json::from_slice::<v1::PaymentRequired<OriginalJson>>(body) {
        Ok(payment_required) => {
            tracing::trace!("Parsed V1 payment required from body");
            Ok(PaymentRequired::V1(payment_required))
        }
        Err(e) => Err(X402Error::ParseError(format!(
            "Invalid 402 response: no usable PAYMENT-REQUIRED header and body is not an x402 document ({e})"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use serde_json::json;

    fn v2_challenge() -> serde_json::Value {
        json!({
            "x402Version": 2,
            "resource": {"url": "https://llm.qntx.fun/v1/chat/completions", "description": "chat", "mimeType": "application/json"},
            "accepts": [{
                "scheme": "exact",
                "network": "eip155:8453",
                "amount": "10000",
                "asset": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "maxTimeoutSeconds": 300,
                "extra": {"name": "USD Coin", "version": "2"}
            }]
        })
    }

    #[test]
    fn test_parse_v2_from_header() {
        let encoded = Base64Bytes::encode_json(&v2_challenge()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            PAYMENT_REQUIRED_HEADER,
            HeaderValue::from_str(&encoded.to_string()).unwrap(),
        );
        let parsed = parse_payment_required(&headers, b"{}").unwrap();
        assert_eq!(parsed.x402_version(), 2);
        assert_eq!(parsed.accepts().len(), 1);
        assert_eq!(parsed.payment_header_name(), PAYMENT_SIGNATURE_HEADER);
        let requirements: v2::PaymentRequirements = parsed.accepts()[0].parse().unwrap();
        assert_eq!(requirements.network.to_string(), "eip155:8453");
        assert_eq!(requirements.amount, "10000");
    }

    #[test]
    fn test_parse_v2_from_body_fallback() {
        let body = serde_json::to_vec(&v2_challenge()).unwrap();
        let parsed = parse_payment_required(&HeaderMap::new(), &body).unwrap();
        assert!(matches!(parsed, PaymentRequired::V2(_)));
    }

    #[test]
    fn test_parse_v1_from_body() {
        let body = json!({
            "x402Version": 1,
            "error": "X-PAYMENT header is required",
            "accepts": [{
                "scheme": "exact",
                "network": "base-sepolia",
                "maxAmountRequired": "1000",
                "resource": "https://example.com/paid",
                "description": "",
                "mimeType": "application/json",
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "maxTimeoutSeconds": 60,
                "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
                "extra": {"name": "USDC", "version": "2"}
            }]
        });
        let parsed =
            parse_payment_required(&HeaderMap::new(), &serde_json::to_vec(&body).unwrap()).unwrap();
        assert_eq!(parsed.x402_version(), 1);
        assert_eq!(parsed.payment_header_name(), X_PAYMENT_HEADER);
        assert_eq!(parsed.error(), Some("X-PAYMENT header is required"));
        let requirements: v1::PaymentRequirements = parsed.accepts()[0].parse().unwrap();
        assert_eq!(requirements.network, "base-sepolia");
        assert_eq!(requirements.max_amount_required, "1000");
    }

    #[test]
    fn test_parse_v1_without_accepts_yields_no_options() {
        let body = json!({"x402Version": 1, "error": "insufficient_funds"});
        let parsed =
            parse_payment_required(&HeaderMap::new(), &serde_json::to_vec(&body).unwrap()).unwrap();
        assert!(matches!(parsed, PaymentRequired::V1(_)));
        assert!(parsed.accepts().is_empty());
        assert_eq!(parsed.error(), Some("insufficient_funds"));
    }

    #[test]
    fn test_parse_garbage_is_parse_error() {
        let mut headers = HeaderMap::new();
        headers.insert(PAYMENT_REQUIRED_HEADER, HeaderValue::from_static("%%%"));
        let err = parse_payment_required(&headers, b"<html>Payment Required</html>").unwrap_err();
        assert!(matches!(err, X402Error::ParseError(_)));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let body = json!({"x402Version": 3, "accepts": []});
        let err = parse_payment_required(&HeaderMap::new(), &serde_json::to_vec(&body).unwrap())
            .unwrap_err();
        assert!(matches!(err, X402Error::ParseError(_)));
    }
}
