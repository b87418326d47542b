use std::fmt;

use crate::booking::{Booking, UserId};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    id: UserId,
    role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Pay,
    Approve,
    Reject,
    Complete,
    Refund,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::View => "view",
            Action::Pay => "pay for",
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::Complete => "complete",
            Action::Refund => "refund",
            Action::Delete => "delete",
        };
        f.write_str(name)
    }
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn user(id: UserId) -> Self {
        Self::new(id, Role::User)
    }

    pub fn admin(id: UserId) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owners may view, pay for and delete their own bookings; every status
    /// change is reserved for admins.
    pub fn authorize(&self, action: Action, booking: &Booking) -> Result<(), Error> {
        let allowed = match action {
            Action::View | Action::Pay | Action::Delete => {
                self.is_admin() || booking.user() == self.id
            }
            Action::Approve | Action::Reject | Action::Complete | Action::Refund => {
                self.is_admin()
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(Error::Unauthorized {
                actor: self.id,
                action,
                booking: booking.id(),
            })
        }
    }
}
