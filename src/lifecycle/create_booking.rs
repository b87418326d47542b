use chrono::Utc;
use log::{info, warn};

use crate::actor::Actor;
use crate::attachment::AttachmentStore;
use crate::booking::{Booking, BookingId, ScreenId};
use crate::booking_store::BookingStore;
use crate::error::Error;
use crate::pricing::{compute_price, PriceQuote};
use crate::screen::ScreenAvailability;

#[derive(Debug)]
pub struct CreateBooking {
    actor: Actor,
    id: BookingId,
    screen: ScreenId,
    start: String,
    end: String,
    notes: Option<String>,
    attachment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedBooking {
    pub booking: Booking,
    pub price: PriceQuote,
}

impl CreateBooking {
    pub fn new(actor: Actor, id: BookingId, screen: ScreenId, start: &str, end: &str) -> Self {
        Self {
            actor,
            id,
            screen,
            start: start.to_string(),
            end: end.to_string(),
            notes: None,
            attachment: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_attachment(mut self, name: impl Into<String>) -> Self {
        self.attachment = Some(name.into());
        self
    }

    pub fn id(&self) -> BookingId {
        self.id
    }

    // Validation and pricing run before anything is stored, so a rejected
    // request leaves no booking and no uploaded file behind.
    pub fn process(
        &self,
        store: &mut impl BookingStore,
        screens: &dyn ScreenAvailability,
        attachments: &dyn AttachmentStore,
    ) -> Result<CreatedBooking, Error> {
        let screen = screens
            .get(self.screen)
            .ok_or(Error::ScreenNotFound(self.screen))?;
        let price = compute_price(&screen, &self.start, &self.end)?;

        let attachment = match &self.attachment {
            Some(name) => Some(attachments.persist(name).map_err(|reason| Error::Attachment {
                reference: name.clone(),
                reason,
            })?),
            None => None,
        };

        let booking = Booking::new(
            self.id,
            self.actor.id(),
            self.screen,
            &price,
            self.notes.clone(),
            attachment.clone(),
            Utc::now(),
        );

        if let Err(e) = store.insert(booking.clone()) {
            if let Some(reference) = &attachment {
                if let Err(reason) = attachments.release(reference) {
                    warn!("Orphaned attachment {}: {}", reference, reason);
                }
            }
            return Err(e);
        }

        info!(
            "Booking {} created for screen {}: {} days at {} = {}",
            self.id, self.screen, price.days, price.daily_price, price.total_price
        );

        if let Err(reason) = screens.record_advertisement(self.screen) {
            warn!(
                "Advertisement counter for screen {} not updated: {}",
                self.screen, reason
            );
        }

        Ok(CreatedBooking { booking, price })
    }
}
