use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::booking::{Booking, BookingId, CaptureRecord, ExchangeSnapshot, PaymentStatus, RefundRecord};
use crate::booking_store::BookingStore;
use crate::config::Settings;
use crate::error::Error;
use crate::gateway::{
    call_with_timeout, GatewayCapture, GatewayRefund, OrderRequest, PaymentGateway, RefundRequest,
    SettlementState,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCreated {
    pub order_id: String,
    pub approval_link: String,
}

/// Drives the external processor on behalf of bookings. Each operation reads
/// the booking's current payment status before touching the gateway, and only
/// writes back after the gateway has confirmed.
#[derive(Clone)]
pub struct PaymentGatewayAdapter {
    gateway: Arc<dyn PaymentGateway>,
    settings: Settings,
}

impl PaymentGatewayAdapter {
    pub fn new(gateway: Arc<dyn PaymentGateway>, settings: Settings) -> Self {
        Self { gateway, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn convert(&self, total_price: Decimal) -> Result<ExchangeSnapshot, Error> {
        let settlement_amount = total_price
            .checked_mul(self.settings.exchange_rate)
            .ok_or(Error::SettlementOverflow {
                amount: total_price,
                rate: self.settings.exchange_rate,
            })?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Ok(ExchangeSnapshot {
            rate: self.settings.exchange_rate,
            local_currency: self.settings.local_currency.clone(),
            settlement_currency: self.settings.settlement_currency.clone(),
            settlement_amount,
        })
    }

    pub fn create_order(
        &self,
        store: &mut impl BookingStore,
        booking_id: BookingId,
    ) -> Result<OrderCreated, Error> {
        let booking = store.load(booking_id)?;
        booking.ensure_orderable()?;

        if booking.payment_status() == PaymentStatus::Pending {
            if let (Some(order_id), Some(approval_link)) = (
                booking.payment().order_id(),
                booking.payment().approval_link(),
            ) {
                info!("Booking {} already has open order {}", booking_id, order_id);
                return Ok(OrderCreated {
                    order_id: order_id.to_string(),
                    approval_link: approval_link.to_string(),
                });
            }
        }

        let exchange = match booking.payment().exchange() {
            Some(exchange) => exchange.clone(),
            None => self.convert(booking.total_price())?,
        };
        let request = OrderRequest {
            correlation_id: booking_id.to_string(),
            amount: exchange.settlement_amount,
            currency: exchange.settlement_currency.clone(),
        };

        let gateway = Arc::clone(&self.gateway);
        let order = call_with_timeout(self.settings.gateway_timeout, move || {
            gateway.create_order(&request)
        })?;

        info!(
            "Created order {} for booking {}: {} {} at rate {}",
            order.order_id,
            booking_id,
            exchange.settlement_amount,
            exchange.settlement_currency,
            exchange.rate
        );

        let booking = store.load_mut(booking_id)?;
        booking.record_order(
            order.order_id.clone(),
            order.approval_link.clone(),
            exchange,
            Utc::now(),
        )?;

        Ok(OrderCreated {
            order_id: order.order_id,
            approval_link: order.approval_link,
        })
    }

    pub fn capture_order(
        &self,
        store: &mut impl BookingStore,
        order_id: &str,
    ) -> Result<CaptureRecord, Error> {
        let booking_id = store
            .find_by_order(order_id)
            .ok_or_else(|| Error::OrderNotFound(order_id.to_string()))?;
        let booking = store.load(booking_id)?;

        // Retried capture: report the stored one, never charge twice
        if booking.payment_status() == PaymentStatus::Paid {
            if let Some(capture) = booking.payment().capture() {
                info!("Order {} already captured as {}", order_id, capture.capture_id);
                return Ok(capture.clone());
            }
        }
        booking.ensure_capturable()?;
        let expected = booking.payment().exchange().cloned();

        let gateway = Arc::clone(&self.gateway);
        let owned_order_id = order_id.to_string();
        let response = match call_with_timeout(self.settings.gateway_timeout, move || {
            gateway.capture_order(&owned_order_id)
        }) {
            Ok(response) => response,
            // An earlier attempt that timed out on our side went through
            Err(e) if e.is_already_settled() => self.recorded_capture(order_id)?,
            Err(e) => {
                return Err(Error::PaymentCaptureFailed {
                    order_id: order_id.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        if response.order_id != order_id {
            return Err(Error::PaymentCaptureFailed {
                order_id: order_id.to_string(),
                reason: format!("gateway answered for order {}", response.order_id),
            });
        }
        if response.state != SettlementState::Completed {
            return Err(Error::PaymentCaptureFailed {
                order_id: order_id.to_string(),
                reason: format!("capture state {:?}", response.state),
            });
        }

        if let Some(expected) = expected {
            if expected.settlement_amount != response.amount
                || expected.settlement_currency != response.currency
            {
                warn!(
                    "Booking {} captured {} {} but order was for {} {}",
                    booking_id,
                    response.amount,
                    response.currency,
                    expected.settlement_amount,
                    expected.settlement_currency
                );
            }
        }

        let now = Utc::now();
        let capture = CaptureRecord {
            capture_id: response.capture_id,
            amount: response.amount,
            currency: response.currency,
            captured_at: now,
            payer_id: response.payer_id,
        };
        store.load_mut(booking_id)?.mark_paid(capture.clone(), now)?;
        info!("Booking {} paid, capture {}", booking_id, capture.capture_id);

        Ok(capture)
    }

    pub fn refund_order(
        &self,
        store: &mut impl BookingStore,
        booking_id: BookingId,
    ) -> Result<RefundRecord, Error> {
        let refund = self.request_refund(store.load(booking_id)?)?;
        store
            .load_mut(booking_id)?
            .mark_refunded(refund.clone(), refund.refunded_at)?;
        info!("Booking {} refunded as {}", booking_id, refund.refund_id);
        Ok(refund)
    }

    /// Gateway half of a refund. Leaves the booking untouched so callers can
    /// apply the result together with their own transition.
    pub(crate) fn request_refund(&self, booking: &Booking) -> Result<RefundRecord, Error> {
        booking.ensure_refundable()?;
        let (Some(capture), Some(exchange)) =
            (booking.payment().capture(), booking.payment().exchange())
        else {
            return Err(Error::RefundFailed {
                booking: booking.id(),
                reason: "missing capture or exchange snapshot".to_string(),
            });
        };

        // Exactly the order-time conversion of the total, never a fresh rate
        let request = RefundRequest {
            correlation_id: booking.id().to_string(),
            capture_id: capture.capture_id.clone(),
            amount: exchange.settlement_amount,
            currency: exchange.settlement_currency.clone(),
        };

        let gateway = Arc::clone(&self.gateway);
        let response = match call_with_timeout(self.settings.gateway_timeout, move || {
            gateway.refund_capture(&request)
        }) {
            Ok(response) => response,
            Err(e) if e.is_already_settled() => {
                self.recorded_refund(booking.id(), &capture.capture_id)?
            }
            Err(e) => {
                return Err(Error::RefundFailed {
                    booking: booking.id(),
                    reason: e.to_string(),
                });
            }
        };

        if response.state != SettlementState::Completed {
            return Err(Error::RefundFailed {
                booking: booking.id(),
                reason: format!("refund state {:?}", response.state),
            });
        }

        Ok(RefundRecord {
            refund_id: response.refund_id,
            amount: response.amount,
            currency: response.currency,
            refunded_at: Utc::now(),
        })
    }

    fn recorded_capture(&self, order_id: &str) -> Result<GatewayCapture, Error> {
        warn!("Order {} was already captured, reading the capture back", order_id);
        let gateway = Arc::clone(&self.gateway);
        let owned_order_id = order_id.to_string();
        call_with_timeout(self.settings.gateway_timeout, move || {
            gateway.get_capture(&owned_order_id)
        })
        .map_err(|e| e.to_string())
        .and_then(|capture| capture.ok_or_else(|| "no capture on record".to_string()))
        .map_err(|reason| Error::PaymentCaptureFailed {
            order_id: order_id.to_string(),
            reason,
        })
    }

    fn recorded_refund(
        &self,
        booking_id: BookingId,
        capture_id: &str,
    ) -> Result<GatewayRefund, Error> {
        warn!(
            "Capture {} of booking {} was already refunded, reading the refund back",
            capture_id, booking_id
        );
        let gateway = Arc::clone(&self.gateway);
        let owned_capture_id = capture_id.to_string();
        call_with_timeout(self.settings.gateway_timeout, move || {
            gateway.get_refund(&owned_capture_id)
        })
        .map_err(|e| e.to_string())
        .and_then(|refund| refund.ok_or_else(|| "no refund on record".to_string()))
        .map_err(|reason| Error::RefundFailed {
            booking: booking_id,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::booking::tests::pending_booking;
    use crate::booking::BookingStateError;
    use crate::gateway::SimulatedGateway;

    fn adapter(gateway: Arc<SimulatedGateway>) -> PaymentGatewayAdapter {
        let settings = Settings {
            exchange_rate: Decimal::new(5, 1),
            ..Settings::default()
        };
        PaymentGatewayAdapter::new(gateway, settings)
    }

    fn store_with_pending() -> HashMap<BookingId, Booking> {
        let mut store = HashMap::new();
        BookingStore::insert(&mut store, pending_booking(1, 7)).unwrap();
        store
    }

    #[test]
    fn conversion_rounds_to_cents() {
        let adapter = adapter(Arc::new(SimulatedGateway::new("u")));

        let snapshot = adapter.convert(Decimal::new(3333, 2)).unwrap();

        assert_eq!(snapshot.settlement_amount, Decimal::new(1667, 2));
        assert_eq!(snapshot.local_currency, "EGP");
        assert_eq!(snapshot.settlement_currency, "USD");
    }

    #[test]
    fn conversion_overflow_is_an_error() {
        let adapter = PaymentGatewayAdapter::new(
            Arc::new(SimulatedGateway::new("u")),
            Settings {
                exchange_rate: Decimal::new(1_000_000_000, 0),
                ..Settings::default()
            },
        );

        let result = adapter.convert(Decimal::MAX);

        assert!(matches!(result, Err(Error::SettlementOverflow { .. })));
    }

    #[test]
    fn create_order_stores_snapshot_and_is_reused() {
        let gateway = Arc::new(SimulatedGateway::new("https://pay.test"));
        let adapter = adapter(gateway.clone());
        let mut store = store_with_pending();

        let first = adapter.create_order(&mut store, 1).unwrap();
        let second = adapter.create_order(&mut store, 1).unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.order_calls(), 1);
        let exchange = store.load(1).unwrap().payment().exchange().unwrap().clone();
        assert_eq!(exchange.settlement_amount, Decimal::new(15, 0));
        assert_eq!(exchange.rate, Decimal::new(5, 1));
    }

    #[test]
    fn failed_order_leaves_booking_untouched() {
        let gateway = Arc::new(SimulatedGateway::new("https://pay.test"));
        gateway.fail_orders(true);
        let adapter = adapter(gateway);
        let mut store = store_with_pending();

        let result = adapter.create_order(&mut store, 1);

        assert!(matches!(result, Err(Error::Gateway(_))));
        let booking = store.load(1).unwrap();
        assert_eq!(booking.payment().order_id(), None);
        assert_eq!(booking.version(), 0);
    }

    #[test]
    fn capture_is_idempotent() {
        let gateway = Arc::new(SimulatedGateway::new("https://pay.test"));
        let adapter = adapter(gateway.clone());
        let mut store = store_with_pending();
        let order = adapter.create_order(&mut store, 1).unwrap();

        let first = adapter.capture_order(&mut store, &order.order_id).unwrap();
        let second = adapter.capture_order(&mut store, &order.order_id).unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.capture_calls(), 1);
        assert_eq!(store.load(1).unwrap().payment_status(), PaymentStatus::Paid);
    }

    #[test]
    fn declined_capture_changes_nothing() {
        let gateway = Arc::new(SimulatedGateway::new("https://pay.test"));
        let adapter = adapter(gateway.clone());
        let mut store = store_with_pending();
        let order = adapter.create_order(&mut store, 1).unwrap();
        let version = store.load(1).unwrap().version();
        gateway.decline_captures(true);

        let result = adapter.capture_order(&mut store, &order.order_id);

        assert!(matches!(result, Err(Error::PaymentCaptureFailed { .. })));
        let booking = store.load(1).unwrap();
        assert_eq!(booking.payment_status(), PaymentStatus::Pending);
        assert_eq!(booking.version(), version);
    }

    #[test]
    fn capture_of_unknown_order() {
        let adapter = adapter(Arc::new(SimulatedGateway::new("https://pay.test")));
        let mut store = store_with_pending();

        let result = adapter.capture_order(&mut store, "ORDER-404");

        assert!(matches!(result, Err(Error::OrderNotFound(id)) if id == "ORDER-404"));
    }

    #[test]
    fn refund_uses_order_time_rate() {
        let gateway = Arc::new(SimulatedGateway::new("https://pay.test"));
        let mut store = store_with_pending();
        let order = adapter(gateway.clone()).create_order(&mut store, 1).unwrap();
        adapter(gateway.clone())
            .capture_order(&mut store, &order.order_id)
            .unwrap();

        // Rate changed since the order was opened
        let later = PaymentGatewayAdapter::new(
            gateway.clone(),
            Settings {
                exchange_rate: Decimal::new(9, 1),
                ..Settings::default()
            },
        );
        let refund = later.refund_order(&mut store, 1).unwrap();

        assert_eq!(refund.amount, Decimal::new(15, 0));
        assert_eq!(refund.currency, "USD");
        assert_eq!(store.load(1).unwrap().payment_status(), PaymentStatus::Refunded);
    }

    #[test]
    fn refund_of_unpaid_booking_is_refused_without_gateway_call() {
        let gateway = Arc::new(SimulatedGateway::new("https://pay.test"));
        let adapter = adapter(gateway.clone());
        let mut store = store_with_pending();

        let result = adapter.refund_order(&mut store, 1);

        assert!(matches!(
            result,
            Err(Error::BookingState(BookingStateError::RefundRequiresPayment(
                PaymentStatus::Pending
            )))
        ));
        assert_eq!(gateway.refund_calls(), 0);
        assert_eq!(store.load(1).unwrap().payment_status(), PaymentStatus::Pending);
    }

    #[test]
    fn failed_refund_keeps_paid() {
        let gateway = Arc::new(SimulatedGateway::new("https://pay.test"));
        let adapter = adapter(gateway.clone());
        let mut store = store_with_pending();
        let order = adapter.create_order(&mut store, 1).unwrap();
        adapter.capture_order(&mut store, &order.order_id).unwrap();
        gateway.fail_refunds(true);

        let result = adapter.refund_order(&mut store, 1);

        assert!(matches!(result, Err(Error::RefundFailed { booking: 1, .. })));
        assert_eq!(store.load(1).unwrap().payment_status(), PaymentStatus::Paid);
    }

    fn slow_adapter(gateway: Arc<SimulatedGateway>) -> PaymentGatewayAdapter {
        PaymentGatewayAdapter::new(
            gateway,
            Settings {
                exchange_rate: Decimal::new(5, 1),
                gateway_timeout: Duration::from_millis(50),
                ..Settings::default()
            },
        )
    }

    #[test]
    fn capture_that_landed_after_timeout_is_reconciled() {
        let gateway = Arc::new(SimulatedGateway::new("https://pay.test"));
        let adapter = slow_adapter(gateway.clone());
        let mut store = store_with_pending();
        let order = adapter.create_order(&mut store, 1).unwrap();
        gateway.set_latency(Duration::from_millis(200));

        let first = adapter.capture_order(&mut store, &order.order_id);
        assert!(matches!(first, Err(Error::PaymentCaptureFailed { .. })));
        assert_eq!(store.load(1).unwrap().payment_status(), PaymentStatus::Pending);

        // Waits for the abandoned call to finish at the gateway
        gateway.set_latency(Duration::ZERO);
        let retry = adapter.capture_order(&mut store, &order.order_id).unwrap();

        assert_eq!(retry.capture_id, "CAPTURE-1-1");
        assert_eq!(retry.amount, Decimal::new(15, 0));
        assert_eq!(gateway.capture_calls(), 2);
        let booking = store.load(1).unwrap();
        assert_eq!(booking.payment_status(), PaymentStatus::Paid);
        assert_eq!(booking.payment().capture(), Some(&retry));
    }

    #[test]
    fn refund_that_landed_after_timeout_is_reconciled() {
        let gateway = Arc::new(SimulatedGateway::new("https://pay.test"));
        let adapter = slow_adapter(gateway.clone());
        let mut store = store_with_pending();
        let order = adapter.create_order(&mut store, 1).unwrap();
        adapter.capture_order(&mut store, &order.order_id).unwrap();
        gateway.set_latency(Duration::from_millis(200));

        let first = adapter.refund_order(&mut store, 1);
        assert!(matches!(first, Err(Error::RefundFailed { booking: 1, .. })));
        assert_eq!(store.load(1).unwrap().payment_status(), PaymentStatus::Paid);

        gateway.set_latency(Duration::ZERO);
        let retry = adapter.refund_order(&mut store, 1).unwrap();

        assert_eq!(retry.refund_id, "REFUND-1-1");
        assert_eq!(gateway.refund_calls(), 2);
        assert_eq!(store.load(1).unwrap().payment_status(), PaymentStatus::Refunded);
    }

    #[test]
    fn slow_gateway_times_out_without_mutation() {
        let gateway = Arc::new(SimulatedGateway::new("https://pay.test"));
        gateway.set_latency(Duration::from_millis(300));
        let adapter = PaymentGatewayAdapter::new(
            gateway,
            Settings {
                gateway_timeout: Duration::from_millis(20),
                ..Settings::default()
            },
        );
        let mut store = store_with_pending();

        let result = adapter.create_order(&mut store, 1);

        assert!(matches!(
            result,
            Err(Error::Gateway(crate::gateway::GatewayError::Timeout(20)))
        ));
        assert_eq!(store.load(1).unwrap().payment().order_id(), None);
    }
}
