use crate::actor::{Action, Actor};
use crate::booking::{BookingId, RefundRecord};
use crate::booking_store::BookingStore;
use crate::error::Error;
use crate::payment::PaymentGatewayAdapter;

/// Admin refund that leaves the booking's status alone; only the payment
/// status moves to refunded.
#[derive(Debug)]
pub struct RefundBooking {
    actor: Actor,
    booking: BookingId,
}

impl RefundBooking {
    pub fn new(actor: Actor, booking: BookingId) -> Self {
        Self { actor, booking }
    }

    pub fn process(
        &self,
        store: &mut impl BookingStore,
        payments: &PaymentGatewayAdapter,
    ) -> Result<RefundRecord, Error> {
        self.actor
            .authorize(Action::Refund, store.load(self.booking)?)?;
        payments.refund_order(store, self.booking)
    }
}
