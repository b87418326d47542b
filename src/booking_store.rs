use std::collections::HashMap;

use crate::booking::{Booking, BookingId};
use crate::error::Error;

// Mutation goes through `&mut self`, so whoever holds the store is the single
// writer for every record in it. Sharing across threads means sharding by
// booking id (see main) or wrapping the store in a lock; status and payment
// status then always change together. Soft-deleted records stay in the map
// but are invisible to every lookup.
pub trait BookingStore {
    fn insert(&mut self, booking: Booking) -> Result<(), Error>;
    fn get(&self, id: BookingId) -> Option<&Booking>;
    fn get_mut(&mut self, id: BookingId) -> Option<&mut Booking>;
    fn find_by_order(&self, order_id: &str) -> Option<BookingId>;
    fn live(&self) -> Vec<&Booking>;

    fn load(&self, id: BookingId) -> Result<&Booking, Error> {
        self.get(id).ok_or(Error::BookingNotFound(id))
    }

    fn load_mut(&mut self, id: BookingId) -> Result<&mut Booking, Error> {
        self.get_mut(id).ok_or(Error::BookingNotFound(id))
    }
}

impl BookingStore for HashMap<BookingId, Booking> {
    fn insert(&mut self, booking: Booking) -> Result<(), Error> {
        // Ids of soft-deleted bookings are not reused
        if self.contains_key(&booking.id()) {
            return Err(Error::DuplicateBooking(booking.id()));
        }
        HashMap::insert(self, booking.id(), booking);
        Ok(())
    }

    fn get(&self, id: BookingId) -> Option<&Booking> {
        HashMap::get(self, &id).filter(|b| !b.is_deleted())
    }

    fn get_mut(&mut self, id: BookingId) -> Option<&mut Booking> {
        HashMap::get_mut(self, &id).filter(|b| !b.is_deleted())
    }

    fn find_by_order(&self, order_id: &str) -> Option<BookingId> {
        self.values()
            .filter(|b| !b.is_deleted())
            .find(|b| b.payment().order_id() == Some(order_id))
            .map(Booking::id)
    }

    fn live(&self) -> Vec<&Booking> {
        let mut bookings: Vec<_> = self.values().filter(|b| !b.is_deleted()).collect();
        bookings.sort_by_key(|b| b.id());
        bookings
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::booking::tests::{paid_booking, pending_booking};

    #[test]
    fn duplicate_id_rejected() {
        let mut store: HashMap<BookingId, Booking> = HashMap::new();
        BookingStore::insert(&mut store, pending_booking(1, 1)).unwrap();

        let result = BookingStore::insert(&mut store, pending_booking(1, 2));

        assert!(matches!(result, Err(Error::DuplicateBooking(1))));
        assert_eq!(store.load(1).unwrap().user(), 1);
    }

    #[test]
    fn soft_deleted_bookings_are_hidden() {
        let mut store: HashMap<BookingId, Booking> = HashMap::new();
        BookingStore::insert(&mut store, pending_booking(1, 1)).unwrap();
        BookingStore::insert(&mut store, pending_booking(2, 1)).unwrap();

        store.load_mut(1).unwrap().soft_delete(Utc::now()).unwrap();

        assert!(matches!(store.load(1), Err(Error::BookingNotFound(1))));
        assert_eq!(store.live().len(), 1);
        assert!(matches!(
            BookingStore::insert(&mut store, pending_booking(1, 1)),
            Err(Error::DuplicateBooking(1))
        ));
    }

    #[test]
    fn lookup_by_order_id() {
        let mut store: HashMap<BookingId, Booking> = HashMap::new();
        BookingStore::insert(&mut store, pending_booking(1, 1)).unwrap();
        BookingStore::insert(&mut store, paid_booking(2, 1)).unwrap();

        assert_eq!(store.find_by_order("ORDER-1"), Some(2));
        assert_eq!(store.find_by_order("ORDER-9"), None);
    }
}
