use chrono::Utc;
use log::info;

use crate::actor::{Action, Actor};
use crate::attachment::AttachmentStore;
use crate::booking::BookingId;
use crate::booking_store::BookingStore;
use crate::error::Error;

#[derive(Debug)]
pub struct DeleteBooking {
    actor: Actor,
    booking: BookingId,
}

impl DeleteBooking {
    pub fn new(actor: Actor, booking: BookingId) -> Self {
        Self { actor, booking }
    }

    // The attachment is released before the record is marked deleted; if the
    // upload service refuses, the booking stays as it was.
    pub fn process(
        &self,
        store: &mut impl BookingStore,
        attachments: &dyn AttachmentStore,
    ) -> Result<(), Error> {
        let booking = store.load(self.booking)?;
        self.actor.authorize(Action::Delete, booking)?;
        booking.ensure_deletable()?;

        if let Some(reference) = booking.attachment() {
            attachments
                .release(reference)
                .map_err(|reason| Error::Attachment {
                    reference: reference.to_string(),
                    reason,
                })?;
        }

        store.load_mut(self.booking)?.soft_delete(Utc::now())?;
        info!("Booking {} deleted by {}", self.booking, self.actor.id());
        Ok(())
    }
}
