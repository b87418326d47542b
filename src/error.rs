use rust_decimal::Decimal;

use crate::actor::Action;
use crate::booking::{BookingId, BookingStateError, ScreenId, UserId};
use crate::gateway::GatewayError;
use crate::screen::ScreenStatus;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Usage: cargo run -- <screens.csv> <commands.csv>")]
    MissingArgument,

    #[error("Invalid configuration for {key}: {value:?}")]
    InvalidConfig { key: &'static str, value: String },

    #[error("Invalid date: {0:?}")]
    InvalidDate(String),

    #[error("Invalid date range: end {end} is not after start {start}")]
    InvalidDateRange { start: String, end: String },

    #[error("Screen {screen} is not bookable (status {status})")]
    ScreenUnavailable { screen: ScreenId, status: ScreenStatus },

    #[error("Screen {0} has no valid daily price")]
    InvalidPriceConfiguration(ScreenId),

    #[error("Settlement of {amount} at rate {rate} is out of range")]
    SettlementOverflow { amount: Decimal, rate: Decimal },

    #[error("Invalid command row for booking {0}")]
    InvalidCommandRow(BookingId),

    #[error("Booking {0} not found")]
    BookingNotFound(BookingId),

    #[error("Screen {0} not found")]
    ScreenNotFound(ScreenId),

    #[error("No booking holds payment order {0}")]
    OrderNotFound(String),

    #[error("Actor {actor} may not {action} booking {booking}")]
    Unauthorized {
        actor: UserId,
        action: Action,
        booking: BookingId,
    },

    #[error("Booking state error: {0}")]
    BookingState(#[from] BookingStateError),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Capture of order {order_id} failed: {reason}")]
    PaymentCaptureFailed { order_id: String, reason: String },

    #[error("Refund for booking {booking} failed: {reason}")]
    RefundFailed { booking: BookingId, reason: String },

    #[error("Booking {0} already exists")]
    DuplicateBooking(BookingId),

    #[error("Attachment {reference} could not be released: {reason}")]
    Attachment { reference: String, reason: String },
}

/// Coarse classification callers branch on, independent of the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Authorization,
    StateConflict,
    Gateway,
    PaymentCaptureFailed,
    RefundFailed,
    Persistence,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Csv(_) | Error::Io(_) | Error::MissingArgument => ErrorKind::Io,
            Error::InvalidConfig { .. }
            | Error::InvalidDate(_)
            | Error::InvalidDateRange { .. }
            | Error::ScreenUnavailable { .. }
            | Error::InvalidPriceConfiguration(_)
            | Error::SettlementOverflow { .. }
            | Error::InvalidCommandRow(_) => ErrorKind::Validation,
            Error::BookingNotFound(_) | Error::ScreenNotFound(_) | Error::OrderNotFound(_) => {
                ErrorKind::NotFound
            }
            Error::Unauthorized { .. } => ErrorKind::Authorization,
            Error::BookingState(_) => ErrorKind::StateConflict,
            Error::Gateway(_) => ErrorKind::Gateway,
            Error::PaymentCaptureFailed { .. } => ErrorKind::PaymentCaptureFailed,
            Error::RefundFailed { .. } => ErrorKind::RefundFailed,
            Error::DuplicateBooking(_) | Error::Attachment { .. } => ErrorKind::Persistence,
        }
    }
}
