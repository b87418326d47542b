use crate::actor::{Action, Actor};
use crate::booking::{Booking, BookingId};
use crate::booking_store::BookingStore;
use crate::error::Error;
use crate::payment::{OrderCreated, PaymentGatewayAdapter};

#[derive(Debug)]
pub struct InitiatePayment {
    actor: Actor,
    booking: BookingId,
}

impl InitiatePayment {
    pub fn new(actor: Actor, booking: BookingId) -> Self {
        Self { actor, booking }
    }

    pub fn process(
        &self,
        store: &mut impl BookingStore,
        payments: &PaymentGatewayAdapter,
    ) -> Result<OrderCreated, Error> {
        self.actor.authorize(Action::Pay, store.load(self.booking)?)?;
        payments.create_order(store, self.booking)
    }
}

#[derive(Debug)]
pub struct CapturePayment {
    actor: Actor,
    order_id: String,
}

impl CapturePayment {
    pub fn new(actor: Actor, order_id: impl Into<String>) -> Self {
        Self {
            actor,
            order_id: order_id.into(),
        }
    }

    /// Returns the booking as it stands after the capture.
    pub fn process(
        &self,
        store: &mut impl BookingStore,
        payments: &PaymentGatewayAdapter,
    ) -> Result<Booking, Error> {
        let booking_id = store
            .find_by_order(&self.order_id)
            .ok_or_else(|| Error::OrderNotFound(self.order_id.clone()))?;
        self.actor.authorize(Action::Pay, store.load(booking_id)?)?;
        payments.capture_order(store, &self.order_id)?;
        Ok(store.load(booking_id)?.clone())
    }
}
