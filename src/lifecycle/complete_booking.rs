use chrono::Utc;
use log::info;

use crate::actor::{Action, Actor};
use crate::booking::BookingId;
use crate::booking_store::BookingStore;
use crate::error::Error;

#[derive(Debug)]
pub struct CompleteBooking {
    actor: Actor,
    booking: BookingId,
}

impl CompleteBooking {
    pub fn new(actor: Actor, booking: BookingId) -> Self {
        Self { actor, booking }
    }

    pub fn process(&self, store: &mut impl BookingStore) -> Result<(), Error> {
        let booking = store.load_mut(self.booking)?;
        self.actor.authorize(Action::Complete, booking)?;
        booking.complete(Utc::now())?;
        info!("Booking {} completed", self.booking);
        Ok(())
    }
}
