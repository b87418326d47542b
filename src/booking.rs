use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::pricing::PriceQuote;

pub type BookingId = u32;
pub type UserId = u32;
pub type ScreenId = u32;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Rejected | BookingStatus::Completed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        };
        f.write_str(name)
    }
}

/// Conversion recorded when the gateway order is created. Refunds reuse it
/// verbatim; it is never recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSnapshot {
    pub rate: Decimal,
    pub local_currency: String,
    pub settlement_currency: String,
    pub settlement_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub capture_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub captured_at: DateTime<Utc>,
    pub payer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRecord {
    pub refund_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub refunded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentDetails {
    order_id: Option<String>,
    approval_link: Option<String>,
    exchange: Option<ExchangeSnapshot>,
    capture: Option<CaptureRecord>,
    refund: Option<RefundRecord>,
}

impl PaymentDetails {
    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref()
    }

    pub fn approval_link(&self) -> Option<&str> {
        self.approval_link.as_deref()
    }

    pub fn exchange(&self) -> Option<&ExchangeSnapshot> {
        self.exchange.as_ref()
    }

    pub fn capture(&self) -> Option<&CaptureRecord> {
        self.capture.as_ref()
    }

    pub fn refund(&self) -> Option<&RefundRecord> {
        self.refund.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct Booking {
    id: BookingId,
    user: UserId,
    screen: ScreenId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    days: u32,
    daily_price: Decimal,
    total_price: Decimal,
    status: BookingStatus,
    payment_status: PaymentStatus,
    payment: PaymentDetails,
    notes: Option<String>,
    attachment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    version: u64,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BookingStateError {
    // Status errors
    #[error("Booking is already approved")]
    AlreadyApproved,
    #[error("Booking is {0} and can no longer change status")]
    AlreadyTerminal(BookingStatus),
    #[error("Cannot complete a booking that has not been approved")]
    CompleteRequiresApproval,
    #[error("Cannot complete a booking whose payment is {0}")]
    CompleteRequiresPayment(PaymentStatus),

    // Payment errors
    #[error("Cannot open a payment order for a {0} booking")]
    OrderOnClosedBooking(BookingStatus),
    #[error("Payment is already {0}")]
    PaymentAlreadySettled(PaymentStatus),
    #[error("Cannot capture payment for a rejected booking")]
    CaptureOnRejected,
    #[error("No payment order has been created")]
    MissingOrder,
    #[error("Cannot refund a booking whose payment is {0}")]
    RefundRequiresPayment(PaymentStatus),
    #[error("Paid booking carries no capture id")]
    MissingCapture,
    #[error("Paid booking carries no exchange-rate snapshot")]
    MissingExchangeSnapshot,

    // Removal errors
    #[error("Cannot delete a paid booking before it is refunded or completed")]
    DeleteWhilePaid,
}

impl Booking {
    pub fn new(
        id: BookingId,
        user: UserId,
        screen: ScreenId,
        quote: &PriceQuote,
        notes: Option<String>,
        attachment: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user,
            screen,
            start: quote.start,
            end: quote.end,
            days: quote.days,
            daily_price: quote.daily_price,
            total_price: quote.total_price,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment: PaymentDetails::default(),
            notes,
            attachment,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            version: 0,
        }
    }

    pub fn id(&self) -> BookingId {
        self.id
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn screen(&self) -> ScreenId {
        self.screen
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn daily_price(&self) -> Decimal {
        self.daily_price
    }

    pub fn total_price(&self) -> Decimal {
        self.total_price
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment(&self) -> &PaymentDetails {
        &self.payment
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn attachment(&self) -> Option<&str> {
        self.attachment.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<(), BookingStateError> {
        match self.status {
            BookingStatus::Pending => {
                self.status = BookingStatus::Approved;
                self.touch(now);
                Ok(())
            }
            BookingStatus::Approved => Err(BookingStateError::AlreadyApproved),
            terminal => Err(BookingStateError::AlreadyTerminal(terminal)),
        }
    }

    pub fn ensure_rejectable(&self) -> Result<(), BookingStateError> {
        if self.status.is_terminal() {
            Err(BookingStateError::AlreadyTerminal(self.status))
        } else {
            Ok(())
        }
    }

    /// Rejects a booking that holds no captured funds.
    pub fn reject(&mut self, now: DateTime<Utc>) -> Result<(), BookingStateError> {
        self.ensure_rejectable()?;
        if self.payment_status == PaymentStatus::Paid {
            return Err(BookingStateError::PaymentAlreadySettled(PaymentStatus::Paid));
        }
        self.status = BookingStatus::Rejected;
        self.touch(now);
        Ok(())
    }

    /// Rejects a paid booking together with its confirmed refund, so the two
    /// fields land in one step.
    pub fn reject_refunded(
        &mut self,
        refund: RefundRecord,
        now: DateTime<Utc>,
    ) -> Result<(), BookingStateError> {
        self.ensure_rejectable()?;
        self.ensure_refundable()?;
        self.status = BookingStatus::Rejected;
        self.payment_status = PaymentStatus::Refunded;
        self.payment.refund = Some(refund);
        self.touch(now);
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), BookingStateError> {
        match (self.status, self.payment_status) {
            (BookingStatus::Approved, PaymentStatus::Paid) => {
                self.status = BookingStatus::Completed;
                self.touch(now);
                Ok(())
            }
            (BookingStatus::Approved, payment) => {
                Err(BookingStateError::CompleteRequiresPayment(payment))
            }
            (BookingStatus::Pending, _) => Err(BookingStateError::CompleteRequiresApproval),
            (terminal, _) => Err(BookingStateError::AlreadyTerminal(terminal)),
        }
    }

    pub fn ensure_orderable(&self) -> Result<(), BookingStateError> {
        if self.status.is_terminal() {
            return Err(BookingStateError::OrderOnClosedBooking(self.status));
        }
        match self.payment_status {
            PaymentStatus::Pending | PaymentStatus::Failed => Ok(()),
            settled => Err(BookingStateError::PaymentAlreadySettled(settled)),
        }
    }

    pub fn record_order(
        &mut self,
        order_id: String,
        approval_link: String,
        exchange: ExchangeSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), BookingStateError> {
        self.ensure_orderable()?;
        self.payment.order_id = Some(order_id);
        self.payment.approval_link = Some(approval_link);
        // A replacement order keeps the first conversion
        if self.payment.exchange.is_none() {
            self.payment.exchange = Some(exchange);
        }
        self.touch(now);
        Ok(())
    }

    pub fn ensure_capturable(&self) -> Result<(), BookingStateError> {
        if self.status == BookingStatus::Rejected {
            return Err(BookingStateError::CaptureOnRejected);
        }
        if self.payment.order_id.is_none() {
            return Err(BookingStateError::MissingOrder);
        }
        match self.payment_status {
            PaymentStatus::Pending | PaymentStatus::Failed => Ok(()),
            settled => Err(BookingStateError::PaymentAlreadySettled(settled)),
        }
    }

    pub fn mark_paid(
        &mut self,
        capture: CaptureRecord,
        now: DateTime<Utc>,
    ) -> Result<(), BookingStateError> {
        self.ensure_capturable()?;
        self.payment_status = PaymentStatus::Paid;
        self.payment.capture = Some(capture);
        self.touch(now);
        Ok(())
    }

    pub fn ensure_refundable(&self) -> Result<(), BookingStateError> {
        if self.payment_status != PaymentStatus::Paid {
            return Err(BookingStateError::RefundRequiresPayment(self.payment_status));
        }
        if self.payment.capture.is_none() {
            return Err(BookingStateError::MissingCapture);
        }
        if self.payment.exchange.is_none() {
            return Err(BookingStateError::MissingExchangeSnapshot);
        }
        Ok(())
    }

    pub fn mark_refunded(
        &mut self,
        refund: RefundRecord,
        now: DateTime<Utc>,
    ) -> Result<(), BookingStateError> {
        self.ensure_refundable()?;
        self.payment_status = PaymentStatus::Refunded;
        self.payment.refund = Some(refund);
        self.touch(now);
        Ok(())
    }

    // Funds still held by the gateway must be refunded (or the booking
    // completed) before the record can go away.
    pub fn ensure_deletable(&self) -> Result<(), BookingStateError> {
        if self.payment_status == PaymentStatus::Paid && self.status != BookingStatus::Completed {
            Err(BookingStateError::DeleteWhilePaid)
        } else {
            Ok(())
        }
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) -> Result<(), BookingStateError> {
        self.ensure_deletable()?;
        self.deleted_at = Some(now);
        self.touch(now);
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

#[derive(Serialize)]
pub struct BookingOutput {
    booking: BookingId,
    user: UserId,
    screen: ScreenId,
    start: String,
    end: String,
    days: u32,
    daily_price: String,
    total: String,
    status: String,
    payment_status: String,
    order_id: String,
    settlement_amount: String,
    settlement_currency: String,
    capture_id: String,
    refund_id: String,
}

impl From<Booking> for BookingOutput {
    fn from(booking: Booking) -> Self {
        let exchange = booking.payment.exchange.as_ref();
        Self {
            booking: booking.id,
            user: booking.user,
            screen: booking.screen,
            start: booking.start.format("%Y-%m-%d").to_string(),
            end: booking.end.format("%Y-%m-%d").to_string(),
            days: booking.days,
            daily_price: format!("{:.2}", booking.daily_price),
            total: format!("{:.2}", booking.total_price),
            status: booking.status.to_string(),
            payment_status: booking.payment_status.to_string(),
            order_id: booking.payment.order_id.clone().unwrap_or_default(),
            settlement_amount: exchange
                .map(|e| format!("{:.2}", e.settlement_amount))
                .unwrap_or_default(),
            settlement_currency: exchange
                .map(|e| e.settlement_currency.clone())
                .unwrap_or_default(),
            capture_id: booking
                .payment
                .capture
                .as_ref()
                .map(|c| c.capture_id.clone())
                .unwrap_or_default(),
            refund_id: booking
                .payment
                .refund
                .as_ref()
                .map(|r| r.refund_id.clone())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pricing::parse_date;

    pub(crate) fn pending_booking(id: BookingId, user: UserId) -> Booking {
        let quote = PriceQuote {
            start: parse_date("2024-01-01").unwrap(),
            end: parse_date("2024-01-03").unwrap(),
            daily_price: Decimal::new(10, 0),
            days: 3,
            total_price: Decimal::new(30, 0),
        };
        Booking::new(id, user, 1, &quote, None, None, Utc::now())
    }

    fn snapshot() -> ExchangeSnapshot {
        ExchangeSnapshot {
            rate: Decimal::new(5, 1),
            local_currency: "EGP".to_string(),
            settlement_currency: "USD".to_string(),
            settlement_amount: Decimal::new(15, 0),
        }
    }

    fn capture() -> CaptureRecord {
        CaptureRecord {
            capture_id: "CAP-1".to_string(),
            amount: Decimal::new(15, 0),
            currency: "USD".to_string(),
            captured_at: Utc::now(),
            payer_id: None,
        }
    }

    fn refund() -> RefundRecord {
        RefundRecord {
            refund_id: "REF-1".to_string(),
            amount: Decimal::new(15, 0),
            currency: "USD".to_string(),
            refunded_at: Utc::now(),
        }
    }

    pub(crate) fn paid_booking(id: BookingId, user: UserId) -> Booking {
        let mut booking = pending_booking(id, user);
        booking
            .record_order("ORDER-1".to_string(), "link".to_string(), snapshot(), Utc::now())
            .unwrap();
        booking.mark_paid(capture(), Utc::now()).unwrap();
        booking
    }

    #[test]
    fn complete_requires_approval_and_payment() {
        let mut unpaid = pending_booking(1, 1);
        unpaid.approve(Utc::now()).unwrap();
        let version = unpaid.version();

        let result = unpaid.complete(Utc::now());

        assert_eq!(
            result,
            Err(BookingStateError::CompleteRequiresPayment(PaymentStatus::Pending))
        );
        assert_eq!(unpaid.status(), BookingStatus::Approved);
        assert_eq!(unpaid.version(), version);

        let mut paid_unapproved = paid_booking(2, 1);
        assert_eq!(
            paid_unapproved.complete(Utc::now()),
            Err(BookingStateError::CompleteRequiresApproval)
        );

        paid_unapproved.approve(Utc::now()).unwrap();
        paid_unapproved.complete(Utc::now()).unwrap();
        assert_eq!(paid_unapproved.status(), BookingStatus::Completed);
    }

    #[test]
    fn terminal_states_accept_no_transition() {
        let mut booking = pending_booking(1, 1);
        booking.reject(Utc::now()).unwrap();

        assert_eq!(
            booking.approve(Utc::now()),
            Err(BookingStateError::AlreadyTerminal(BookingStatus::Rejected))
        );
        assert_eq!(
            booking.reject(Utc::now()),
            Err(BookingStateError::AlreadyTerminal(BookingStatus::Rejected))
        );
        assert_eq!(
            booking.complete(Utc::now()),
            Err(BookingStateError::AlreadyTerminal(BookingStatus::Rejected))
        );
        assert_eq!(booking.payment_status(), PaymentStatus::Pending);
    }

    #[test]
    fn plain_reject_refuses_paid_booking() {
        let mut booking = paid_booking(1, 1);

        let result = booking.reject(Utc::now());

        assert_eq!(
            result,
            Err(BookingStateError::PaymentAlreadySettled(PaymentStatus::Paid))
        );
        assert_eq!(booking.status(), BookingStatus::Pending);
    }

    #[test]
    fn reject_refunded_updates_both_fields() {
        let mut booking = paid_booking(1, 1);

        booking.reject_refunded(refund(), Utc::now()).unwrap();

        assert_eq!(booking.status(), BookingStatus::Rejected);
        assert_eq!(booking.payment_status(), PaymentStatus::Refunded);
        assert_eq!(booking.payment().refund().unwrap().refund_id, "REF-1");
    }

    #[test]
    fn refund_requires_paid() {
        let mut booking = pending_booking(1, 1);

        let result = booking.mark_refunded(refund(), Utc::now());

        assert_eq!(
            result,
            Err(BookingStateError::RefundRequiresPayment(PaymentStatus::Pending))
        );
        assert_eq!(booking.payment_status(), PaymentStatus::Pending);
    }

    #[test]
    fn capture_needs_an_order_and_open_booking() {
        let mut no_order = pending_booking(1, 1);
        assert_eq!(
            no_order.mark_paid(capture(), Utc::now()),
            Err(BookingStateError::MissingOrder)
        );

        let mut rejected = pending_booking(2, 1);
        rejected
            .record_order("ORDER-2".to_string(), "link".to_string(), snapshot(), Utc::now())
            .unwrap();
        rejected.reject(Utc::now()).unwrap();
        assert_eq!(
            rejected.mark_paid(capture(), Utc::now()),
            Err(BookingStateError::CaptureOnRejected)
        );
        assert_eq!(rejected.payment_status(), PaymentStatus::Pending);
    }

    #[test]
    fn replacement_order_keeps_first_exchange_snapshot() {
        let mut booking = pending_booking(1, 1);
        booking
            .record_order("ORDER-1".to_string(), "a".to_string(), snapshot(), Utc::now())
            .unwrap();

        let mut other = snapshot();
        other.rate = Decimal::new(9, 1);
        booking
            .record_order("ORDER-2".to_string(), "b".to_string(), other, Utc::now())
            .unwrap();

        assert_eq!(booking.payment().order_id(), Some("ORDER-2"));
        assert_eq!(booking.payment().exchange().unwrap().rate, Decimal::new(5, 1));
    }

    #[test]
    fn paid_booking_cannot_be_deleted() {
        let mut booking = paid_booking(1, 1);

        assert_eq!(
            booking.soft_delete(Utc::now()),
            Err(BookingStateError::DeleteWhilePaid)
        );
        assert!(!booking.is_deleted());
    }
}
