use chrono::Utc;
use log::info;

use crate::actor::{Action, Actor};
use crate::booking::{BookingId, PaymentStatus};
use crate::booking_store::BookingStore;
use crate::error::Error;
use crate::payment::PaymentGatewayAdapter;

#[derive(Debug)]
pub struct RejectBooking {
    actor: Actor,
    booking: BookingId,
}

impl RejectBooking {
    pub fn new(actor: Actor, booking: BookingId) -> Self {
        Self { actor, booking }
    }

    // A paid booking is refunded through the gateway first. Status and payment
    // status only change once the refund is confirmed; a failed refund leaves
    // the booking exactly as it was.
    pub fn process(
        &self,
        store: &mut impl BookingStore,
        payments: &PaymentGatewayAdapter,
    ) -> Result<(), Error> {
        let booking = store.load(self.booking)?;
        self.actor.authorize(Action::Reject, booking)?;
        booking.ensure_rejectable()?;

        if booking.payment_status() != PaymentStatus::Paid {
            store.load_mut(self.booking)?.reject(Utc::now())?;
            info!("Booking {} rejected", self.booking);
            return Ok(());
        }

        let refund = payments.request_refund(booking)?;
        let refund_id = refund.refund_id.clone();
        store
            .load_mut(self.booking)?
            .reject_refunded(refund, Utc::now())?;
        info!(
            "Booking {} rejected and refunded as {}",
            self.booking, refund_id
        );
        Ok(())
    }
}
