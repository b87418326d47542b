use std::sync::Arc;

use log::info;
use serde::Deserialize;

mod approve_booking;
mod complete_booking;
mod create_booking;
mod delete_booking;
mod pay_booking;
mod refund_booking;
mod reject_booking;

pub use approve_booking::ApproveBooking;
pub use complete_booking::CompleteBooking;
pub use create_booking::{CreateBooking, CreatedBooking};
pub use delete_booking::DeleteBooking;
pub use pay_booking::{CapturePayment, InitiatePayment};
pub use refund_booking::RefundBooking;
pub use reject_booking::RejectBooking;

use crate::actor::{Action, Actor, Role};
use crate::attachment::AttachmentStore;
use crate::booking::{Booking, BookingId, BookingStateError, ScreenId, UserId};
use crate::booking_store::BookingStore;
use crate::error::Error;
use crate::payment::PaymentGatewayAdapter;
use crate::screen::ScreenAvailability;

/// Collaborators every lifecycle operation may reach. Cheap to clone; each
/// worker holds its own copy.
#[derive(Clone)]
pub struct Services {
    pub screens: Arc<dyn ScreenAvailability>,
    pub payments: PaymentGatewayAdapter,
    pub attachments: Arc<dyn AttachmentStore>,
}

pub fn view_booking<'a>(
    actor: &Actor,
    store: &'a impl BookingStore,
    id: BookingId,
) -> Result<&'a Booking, Error> {
    let booking = store.load(id)?;
    actor.authorize(Action::View, booking)?;
    Ok(booking)
}

#[derive(Debug, Deserialize)]
pub struct CommandRow {
    action: String,
    actor: UserId,
    role: String,
    booking: BookingId,
    screen: Option<ScreenId>,
    start: Option<String>,
    end: Option<String>,
    notes: Option<String>,
    attachment: Option<String>,
}

impl CommandRow {
    pub fn booking(&self) -> BookingId {
        self.booking
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn actor(&self) -> UserId {
        self.actor
    }

    // Only creation is replay-sensitive; every other action is guarded by the
    // booking's own state.
    pub fn should_dedupe(&self) -> bool {
        self.action == "create"
    }
}

#[derive(Debug)]
pub enum Command {
    Create(CreateBooking),
    Pay(InitiatePayment),
    Capture { actor: Actor, booking: BookingId },
    Approve(ApproveBooking),
    Reject(RejectBooking),
    Complete(CompleteBooking),
    Refund(RefundBooking),
    Delete(DeleteBooking),
}

impl TryFrom<CommandRow> for Command {
    type Error = Error;

    fn try_from(row: CommandRow) -> Result<Self, Self::Error> {
        let role = match row.role.as_str() {
            "user" => Role::User,
            "admin" => Role::Admin,
            _ => return Err(Error::InvalidCommandRow(row.booking)),
        };
        let actor = Actor::new(row.actor, role);
        let booking = row.booking;

        match row.action.as_str() {
            "create" => {
                let (Some(screen), Some(start), Some(end)) = (row.screen, row.start, row.end)
                else {
                    return Err(Error::InvalidCommandRow(booking));
                };
                let mut create = CreateBooking::new(actor, booking, screen, &start, &end);
                if let Some(notes) = row.notes {
                    create = create.with_notes(notes);
                }
                if let Some(attachment) = row.attachment {
                    create = create.with_attachment(attachment);
                }
                Ok(Command::Create(create))
            }
            "pay" => Ok(Command::Pay(InitiatePayment::new(actor, booking))),
            "capture" => Ok(Command::Capture { actor, booking }),
            "approve" => Ok(Command::Approve(ApproveBooking::new(actor, booking))),
            "reject" => Ok(Command::Reject(RejectBooking::new(actor, booking))),
            "complete" => Ok(Command::Complete(CompleteBooking::new(actor, booking))),
            "refund" => Ok(Command::Refund(RefundBooking::new(actor, booking))),
            "delete" => Ok(Command::Delete(DeleteBooking::new(actor, booking))),
            _ => Err(Error::InvalidCommandRow(booking)),
        }
    }
}

impl Command {
    pub fn process(
        &self,
        store: &mut impl BookingStore,
        services: &Services,
    ) -> Result<(), Error> {
        match self {
            Command::Create(c) => {
                c.process(store, services.screens.as_ref(), services.attachments.as_ref())?;
            }
            Command::Pay(c) => {
                let order = c.process(store, &services.payments)?;
                info!("Approval link: {}", order.approval_link);
            }
            // The payer's approval arrives out of band; replaying it from a
            // command log means capturing whatever order the booking holds.
            Command::Capture { actor, booking } => {
                let order_id = store
                    .load(*booking)?
                    .payment()
                    .order_id()
                    .ok_or(BookingStateError::MissingOrder)?
                    .to_string();
                CapturePayment::new(*actor, order_id).process(store, &services.payments)?;
            }
            Command::Approve(c) => c.process(store)?,
            Command::Reject(c) => c.process(store, &services.payments)?,
            Command::Complete(c) => c.process(store)?,
            Command::Refund(c) => {
                c.process(store, &services.payments)?;
            }
            Command::Delete(c) => c.process(store, services.attachments.as_ref())?,
        }
        Ok(())
    }
}
