//! The per-request payment state machine shared by the blocking and async transports.
//!
//! ```text
//! Idle -> Sent -> NotPayment
//!              -> PaymentRequired -> Done                 (challenge not payable)
//!                                 -> Retrying -> Done     (retry answered)
//!                                             -> Failed   (retry answered 402 again)
//! ```
//!
//! The machine holds no I/O. Drivers report what happened and perform the
//! returned [`FlowAction`]. A flow is used for exactly one request, so at most
//! one retry is ever issued.

use http::{HeaderMap, Method, StatusCode};
use std::fmt::Display;

use crate::client::PaymentMetadata;
use crate::error::X402Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Sent,
    NotPayment,
    PaymentRequired,
    Retrying,
    Done,
    Failed,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::NotPayment | FlowState::Done | FlowState::Failed)
    }
}

/// What the driver must do next.
#[derive(Debug)]
pub enum FlowAction {
    /// Return the response just received.
    Return,
    /// Read the 402 body and pass the challenge to the payment handler.
    ReadChallenge,
    /// Send the retry with these payment headers merged in.
    Retry(HeaderMap),
    /// Return the original 402 response.
    ReturnOriginal,
}

#[derive(Debug)]
pub struct PaymentFlow {
    state: FlowState,
}

impl Default for PaymentFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentFlow {
    pub fn new() -> Self {
        Self {
            state: FlowState::Idle,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// The original request is about to be sent.
    pub fn dispatch(&mut self, method: &Method, url: &dyn Display) {
        tracing::debug!(%method, %url, "x402: dispatching request");
        self.state = FlowState::Sent;
    }

    /// A response arrived, for the original request or for the retry.
    pub fn on_response(&mut self, status: StatusCode) -> FlowAction {
        match self.state {
            FlowState::Sent if status == StatusCode::PAYMENT_REQUIRED => {
                tracing::debug!("x402: received 402, signing payment");
                self.state = FlowState::PaymentRequired;
                FlowAction::ReadChallenge
            }
            FlowState::Sent => {
                self.state = FlowState::NotPayment;
                FlowAction::Return
            }
            FlowState::Retrying if status == StatusCode::PAYMENT_REQUIRED => {
                tracing::warn!("x402: payment rejected, retry still answered 402");
                self.state = FlowState::Failed;
                FlowAction::Return
            }
            FlowState::Retrying => {
                tracing::debug!(%status, "x402: paid request completed");
                self.state = FlowState::Done;
                FlowAction::Return
            }
            _ => FlowAction::Return,
        }
    }

    /// The payment handler answered (or the challenge could not be attempted).
    pub fn on_payment(
        &mut self,
        outcome: Result<(HeaderMap, PaymentMetadata), X402Error>,
    ) -> FlowAction {
        if self.state != FlowState::PaymentRequired {
            return FlowAction::ReturnOriginal;
        }
        match outcome {
            Ok((headers, metadata)) => {
                tracing::debug!(
                    x402_version = metadata.x402_version,
                    scheme = %metadata.scheme,
                    chain_id = %metadata.chain_id,
                    amount = %metadata.amount,
                    pay_to = %metadata.pay_to,
                    "x402: retrying with payment"
                );
                self.state = FlowState::Retrying;
                FlowAction::Retry(headers)
            }
            Err(error) => {
                tracing::error!(%error, "x402: payment signing failed");
                self.state = FlowState::Done;
                FlowAction::ReturnOriginal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::metadata;

    fn sent() -> PaymentFlow {
        let mut flow = PaymentFlow::new();
        flow.dispatch(&Method::POST, &"https://llm.qntx.fun/v1/chat/completions");
        flow
    }

    #[test]
    fn test_non_402_is_returned_as_is() {
        let mut flow = sent();
        assert!(matches!(flow.on_response(StatusCode::OK), FlowAction::Return));
        assert_eq!(flow.state(), FlowState::NotPayment);
        assert!(flow.state().is_terminal());
    }

    #[test]
    fn test_paid_retry_completes() {
        let mut flow = sent();
        assert!(matches!(
            flow.on_response(StatusCode::PAYMENT_REQUIRED),
            FlowAction::ReadChallenge
        ));
        let action = flow.on_payment(Ok((HeaderMap::new(), metadata())));
        assert!(matches!(action, FlowAction::Retry(_)));
        assert_eq!(flow.state(), FlowState::Retrying);
        assert!(matches!(flow.on_response(StatusCode::OK), FlowAction::Return));
        assert_eq!(flow.state(), FlowState::Done);
    }

    #[test]
    fn test_second_402_is_terminal() {
        let mut flow = sent();
        flow.on_response(StatusCode::PAYMENT_REQUIRED);
        flow.on_payment(Ok((HeaderMap::new(), metadata())));
        assert!(matches!(
            flow.on_response(StatusCode::PAYMENT_REQUIRED),
            FlowAction::Return
        ));
        assert_eq!(flow.state(), FlowState::Failed);
        // A flow never asks for a second retry.
        assert!(matches!(
            flow.on_payment(Ok((HeaderMap::new(), metadata()))),
            FlowAction::ReturnOriginal
        ));
    }

    #[test]
    fn test_signing_failure_returns_original() {
        let mut flow = sent();
        flow.on_response(StatusCode::PAYMENT_REQUIRED);
        let action = flow.on_payment(Err(X402Error::NoMatchingPaymentOption));
        assert!(matches!(action, FlowAction::ReturnOriginal));
        assert_eq!(flow.state(), FlowState::Done);
    }
}
