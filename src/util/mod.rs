//! Utility types shared by the protocol and scheme modules.
//!
//! - [`b64`] - Base64 encoding/decoding of x402 header values

pub mod b64;

#[cfg(test)]
pub(crate) mod log_capture;

pub use b64::*;
