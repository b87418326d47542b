use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use log::debug;
use rust_decimal::Decimal;

use super::{
    CAPTURE_FULLY_REFUNDED, GatewayCapture, GatewayError, GatewayOrder, GatewayRefund,
    ORDER_ALREADY_CAPTURED, OrderRequest, PaymentGateway, RefundRequest, SettlementState,
};

/// In-process stand-in for the payment processor. Every order counts as
/// approved by the payer, so a capture succeeds unless a failure is injected.
/// Ids derive from the correlation id, so they do not depend on call order.
pub struct SimulatedGateway {
    approval_base_url: String,
    state: Mutex<SimState>,
}

#[derive(Default)]
struct SimState {
    orders_per_booking: HashMap<String, u32>,
    orders: HashMap<String, SimOrder>,
    captures: HashMap<String, SimCapture>,
    latency: Option<Duration>,
    fail_orders: bool,
    decline_captures: bool,
    fail_refunds: bool,
    order_calls: u32,
    capture_calls: u32,
    refund_calls: u32,
}

#[derive(Debug)]
struct SimOrder {
    amount: Decimal,
    currency: String,
    capture: Option<GatewayCapture>,
}

#[derive(Debug)]
struct SimCapture {
    amount: Decimal,
    currency: String,
    refund: Option<GatewayRefund>,
}

impl SimulatedGateway {
    pub fn new(approval_base_url: impl Into<String>) -> Self {
        Self {
            approval_base_url: approval_base_url.into(),
            state: Mutex::default(),
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.latency = Some(latency);
        }
    }

    pub fn fail_orders(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_orders = fail;
        }
    }

    pub fn decline_captures(&self, decline: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.decline_captures = decline;
        }
    }

    pub fn fail_refunds(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_refunds = fail;
        }
    }

    pub fn order_calls(&self) -> u32 {
        self.state.lock().map_or(0, |s| s.order_calls)
    }

    pub fn capture_calls(&self) -> u32 {
        self.state.lock().map_or(0, |s| s.capture_calls)
    }

    pub fn refund_calls(&self) -> u32 {
        self.state.lock().map_or(0, |s| s.refund_calls)
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimState>, GatewayError> {
        let state = self
            .state
            .lock()
            .map_err(|_| GatewayError::Transport("simulated gateway poisoned".to_string()))?;
        if let Some(latency) = state.latency {
            // Hold the lock while sleeping: the processor answers one call at a time
            thread::sleep(latency);
        }
        Ok(state)
    }
}

fn rejected(code: &str, message: String) -> GatewayError {
    GatewayError::Rejected {
        code: code.to_string(),
        message,
    }
}

impl PaymentGateway for SimulatedGateway {
    fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError> {
        let mut state = self.lock()?;
        state.order_calls += 1;
        if state.fail_orders {
            return Err(GatewayError::Transport("order endpoint unavailable".to_string()));
        }
        if request.amount <= Decimal::ZERO {
            return Err(rejected(
                "INVALID_AMOUNT",
                format!("amount {} must be positive", request.amount),
            ));
        }

        let attempt = state
            .orders_per_booking
            .entry(request.correlation_id.clone())
            .or_insert(0);
        *attempt += 1;
        let order_id = format!("ORDER-{}-{}", request.correlation_id, attempt);
        state.orders.insert(
            order_id.clone(),
            SimOrder {
                amount: request.amount,
                currency: request.currency.clone(),
                capture: None,
            },
        );
        debug!("Simulated order {} for {} {}", order_id, request.amount, request.currency);

        Ok(GatewayOrder {
            approval_link: format!("{}?token={}", self.approval_base_url, order_id),
            order_id,
        })
    }

    fn capture_order(&self, order_id: &str) -> Result<GatewayCapture, GatewayError> {
        let mut state = self.lock()?;
        state.capture_calls += 1;
        let decline = state.decline_captures;

        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| rejected("RESOURCE_NOT_FOUND", format!("unknown order {order_id}")))?;
        if order.capture.is_some() {
            return Err(rejected(
                ORDER_ALREADY_CAPTURED,
                format!("order {order_id} was already captured"),
            ));
        }
        if decline {
            return Ok(GatewayCapture {
                order_id: order_id.to_string(),
                state: SettlementState::Declined,
                capture_id: String::new(),
                amount: order.amount,
                currency: order.currency.clone(),
                payer_id: None,
            });
        }

        let capture_id = order_id.replacen("ORDER", "CAPTURE", 1);
        let capture = GatewayCapture {
            order_id: order_id.to_string(),
            state: SettlementState::Completed,
            capture_id: capture_id.clone(),
            amount: order.amount,
            currency: order.currency.clone(),
            payer_id: Some(format!("PAYER-{order_id}")),
        };
        order.capture = Some(capture.clone());
        state.captures.insert(
            capture_id,
            SimCapture {
                amount: capture.amount,
                currency: capture.currency.clone(),
                refund: None,
            },
        );
        Ok(capture)
    }

    fn refund_capture(&self, request: &RefundRequest) -> Result<GatewayRefund, GatewayError> {
        let mut state = self.lock()?;
        state.refund_calls += 1;
        if state.fail_refunds {
            return Err(rejected(
                "REFUND_FAILED",
                format!("refund of {} declined", request.capture_id),
            ));
        }

        let capture = state.captures.get_mut(&request.capture_id).ok_or_else(|| {
            rejected(
                "RESOURCE_NOT_FOUND",
                format!("unknown capture {}", request.capture_id),
            )
        })?;
        if capture.refund.is_some() {
            return Err(rejected(
                CAPTURE_FULLY_REFUNDED,
                format!("capture {} was already refunded", request.capture_id),
            ));
        }
        if request.amount > capture.amount || request.currency != capture.currency {
            return Err(rejected(
                "REFUND_AMOUNT_EXCEEDED",
                format!(
                    "refund {} {} exceeds capture {} {}",
                    request.amount, request.currency, capture.amount, capture.currency
                ),
            ));
        }

        let refund = GatewayRefund {
            refund_id: request.capture_id.replacen("CAPTURE", "REFUND", 1),
            state: SettlementState::Completed,
            amount: request.amount,
            currency: request.currency.clone(),
        };
        capture.refund = Some(refund.clone());
        Ok(refund)
    }

    fn get_capture(&self, order_id: &str) -> Result<Option<GatewayCapture>, GatewayError> {
        let state = self.lock()?;
        state
            .orders
            .get(order_id)
            .map(|order| order.capture.clone())
            .ok_or_else(|| rejected("RESOURCE_NOT_FOUND", format!("unknown order {order_id}")))
    }

    fn get_refund(&self, capture_id: &str) -> Result<Option<GatewayRefund>, GatewayError> {
        let state = self.lock()?;
        state
            .captures
            .get(capture_id)
            .map(|capture| capture.refund.clone())
            .ok_or_else(|| {
                rejected("RESOURCE_NOT_FOUND", format!("unknown capture {capture_id}"))
            })
    }
}
