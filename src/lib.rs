pub mod actor;
pub mod attachment;
pub mod booking;
pub mod booking_store;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod payment;
pub mod pricing;
pub mod screen;

pub use booking::{Booking, BookingStatus, PaymentStatus};
pub use error::{Error, ErrorKind};
pub use lifecycle::{Command, CommandRow, Services};
