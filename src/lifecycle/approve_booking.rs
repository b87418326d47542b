use chrono::Utc;
use log::info;

use crate::actor::{Action, Actor};
use crate::booking::BookingId;
use crate::booking_store::BookingStore;
use crate::error::Error;

#[derive(Debug)]
pub struct ApproveBooking {
    actor: Actor,
    booking: BookingId,
}

impl ApproveBooking {
    pub fn new(actor: Actor, booking: BookingId) -> Self {
        Self { actor, booking }
    }

    pub fn process(&self, store: &mut impl BookingStore) -> Result<(), Error> {
        let booking = store.load_mut(self.booking)?;
        self.actor.authorize(Action::Approve, booking)?;
        booking.approve(Utc::now())?;
        info!("Booking {} approved by {}", self.booking, self.actor.id());
        Ok(())
    }
}
