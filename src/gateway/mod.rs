use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rust_decimal::Decimal;

mod simulated;

pub use simulated::SimulatedGateway;

/// Rejection code for a capture the processor has already settled.
pub const ORDER_ALREADY_CAPTURED: &str = "ORDER_ALREADY_CAPTURED";
/// Rejection code for a refund the processor has already settled.
pub const CAPTURE_FULLY_REFUNDED: &str = "CAPTURE_FULLY_REFUNDED";

/// Narrow view of an external payment processor. Response shapes stay in this
/// module; the payment adapter maps them onto booking payment details.
pub trait PaymentGateway: Send + Sync {
    fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError>;
    fn capture_order(&self, order_id: &str) -> Result<GatewayCapture, GatewayError>;
    fn refund_capture(&self, request: &RefundRequest) -> Result<GatewayRefund, GatewayError>;

    /// The capture the processor recorded for an order, if any.
    fn get_capture(&self, order_id: &str) -> Result<Option<GatewayCapture>, GatewayError>;
    /// The refund the processor recorded against a capture, if any.
    fn get_refund(&self, capture_id: &str) -> Result<Option<GatewayRefund>, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub correlation_id: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrder {
    pub order_id: String,
    pub approval_link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementState {
    Completed,
    Pending,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCapture {
    pub order_id: String,
    pub state: SettlementState,
    pub capture_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub payer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRequest {
    pub correlation_id: String,
    pub capture_id: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRefund {
    pub refund_id: String,
    pub state: SettlementState,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway did not answer within {0}ms")]
    Timeout(u64),
    #[error("gateway rejected the request ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("gateway transport failure: {0}")]
    Transport(String),
}

impl GatewayError {
    /// The processor refused because an earlier attempt already went through.
    pub fn is_already_settled(&self) -> bool {
        matches!(
            self,
            GatewayError::Rejected { code, .. }
                if code == ORDER_ALREADY_CAPTURED || code == CAPTURE_FULLY_REFUNDED
        )
    }
}

/// Runs one gateway call on a helper thread and gives up after `timeout`.
/// An abandoned call keeps running and may still settle at the processor; a
/// retry refused as already settled is reconciled through the read-back calls.
pub fn call_with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, GatewayError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, GatewayError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // Receiver may be gone after a timeout
        let _ = tx.send(call());
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            Err(GatewayError::Timeout(timeout.as_millis() as u64))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(GatewayError::Transport(
            "gateway call ended without a response".to_string(),
        )),
    }
}
