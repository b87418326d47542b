#![no_main]
use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use screen_booking::actor::Actor;
use screen_booking::attachment::InMemoryAttachments;
use screen_booking::booking::{Booking, BookingId, BookingStatus, PaymentStatus};
use screen_booking::booking_store::BookingStore;
use screen_booking::config::Settings;
use screen_booking::gateway::SimulatedGateway;
use screen_booking::lifecycle::{
    ApproveBooking, CapturePayment, CompleteBooking, CreateBooking, DeleteBooking,
    InitiatePayment, RefundBooking, RejectBooking,
};
use screen_booking::payment::PaymentGatewayAdapter;
use screen_booking::screen::{Screen, ScreenCatalog, ScreenStatus};

const DATES: [&str; 4] = ["2024-01-01", "2024-01-03", "2024-02-29", "2024-01-02T12:00:00Z"];

#[derive(Debug, Clone)]
enum FuzzOp {
    Create {
        booking: BookingId,
        screen: u32,
        start: usize,
        end: usize,
    },
    Pay { actor: Actor, booking: BookingId },
    Capture { actor: Actor, booking: BookingId },
    Approve { actor: Actor, booking: BookingId },
    Reject { actor: Actor, booking: BookingId },
    Complete { actor: Actor, booking: BookingId },
    Refund { actor: Actor, booking: BookingId },
    Delete { actor: Actor, booking: BookingId },
    FlipRefunds(bool),
    FlipCaptures(bool),
}

impl<'a> Arbitrary<'a> for FuzzOp {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        // Few ids so operations keep hitting the same bookings
        let booking: BookingId = u.int_in_range(0..=3)?;
        let actor = match u.int_in_range(0..=2)? {
            0 => Actor::admin(1),
            1 => Actor::user(7),
            _ => Actor::user(8),
        };

        match u.int_in_range(0..=9)? {
            0 => Ok(FuzzOp::Create {
                booking,
                screen: u.int_in_range(1..=3)?,
                start: u.int_in_range(0..=3)?,
                end: u.int_in_range(0..=3)?,
            }),
            1 => Ok(FuzzOp::Pay { actor, booking }),
            2 => Ok(FuzzOp::Capture { actor, booking }),
            3 => Ok(FuzzOp::Approve { actor, booking }),
            4 => Ok(FuzzOp::Reject { actor, booking }),
            5 => Ok(FuzzOp::Complete { actor, booking }),
            6 => Ok(FuzzOp::Refund { actor, booking }),
            7 => Ok(FuzzOp::Delete { actor, booking }),
            8 => Ok(FuzzOp::FlipRefunds(u.arbitrary()?)),
            _ => Ok(FuzzOp::FlipCaptures(u.arbitrary()?)),
        }
    }
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    ops: Vec<FuzzOp>,
}

fn check_invariants(store: &HashMap<BookingId, Booking>, totals: &HashMap<BookingId, Decimal>) {
    for booking in store.live() {
        assert!(booking.end() > booking.start());
        assert_eq!(
            booking.total_price(),
            booking.daily_price() * Decimal::from(booking.days())
        );
        if let Some(total) = totals.get(&booking.id()) {
            assert_eq!(booking.total_price(), *total);
        }
        if booking.status() == BookingStatus::Completed {
            assert_eq!(booking.payment_status(), PaymentStatus::Paid);
        }
        match booking.payment_status() {
            PaymentStatus::Paid => assert!(booking.payment().capture().is_some()),
            PaymentStatus::Refunded => assert!(booking.payment().refund().is_some()),
            _ => {}
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    let screens: ScreenCatalog = [
        Screen::new(1, Some(Decimal::new(10, 0)), ScreenStatus::Active),
        Screen::new(2, Some(Decimal::new(10, 0)), ScreenStatus::Maintenance),
        Screen::new(3, None, ScreenStatus::Active),
    ]
    .into_iter()
    .collect();
    let gateway = Arc::new(SimulatedGateway::new("https://pay.fuzz"));
    let payments = PaymentGatewayAdapter::new(
        gateway.clone(),
        Settings {
            gateway_timeout: Duration::from_secs(5),
            ..Settings::default()
        },
    );
    let attachments = InMemoryAttachments::new();
    let mut store: HashMap<BookingId, Booking> = HashMap::new();
    let mut totals: HashMap<BookingId, Decimal> = HashMap::new();

    for op in &input.ops {
        let _ = match op {
            FuzzOp::Create {
                booking,
                screen,
                start,
                end,
            } => CreateBooking::new(Actor::user(7), *booking, *screen, DATES[*start], DATES[*end])
                .process(&mut store, &screens, &attachments)
                .map(|created| {
                    totals.insert(*booking, created.price.total_price);
                }),
            FuzzOp::Pay { actor, booking } => InitiatePayment::new(*actor, *booking)
                .process(&mut store, &payments)
                .map(|_| ()),
            FuzzOp::Capture { actor, booking } => {
                let order_id = store
                    .load(*booking)
                    .ok()
                    .and_then(|b| b.payment().order_id().map(str::to_string));
                match order_id {
                    Some(order_id) => CapturePayment::new(*actor, order_id)
                        .process(&mut store, &payments)
                        .map(|_| ()),
                    None => Ok(()),
                }
            }
            FuzzOp::Approve { actor, booking } => {
                ApproveBooking::new(*actor, *booking).process(&mut store)
            }
            FuzzOp::Reject { actor, booking } => {
                RejectBooking::new(*actor, *booking).process(&mut store, &payments)
            }
            FuzzOp::Complete { actor, booking } => {
                CompleteBooking::new(*actor, *booking).process(&mut store)
            }
            FuzzOp::Refund { actor, booking } => RefundBooking::new(*actor, *booking)
                .process(&mut store, &payments)
                .map(|_| ()),
            FuzzOp::Delete { actor, booking } => {
                DeleteBooking::new(*actor, *booking).process(&mut store, &attachments)
            }
            FuzzOp::FlipRefunds(fail) => {
                gateway.fail_refunds(*fail);
                Ok(())
            }
            FuzzOp::FlipCaptures(decline) => {
                gateway.decline_captures(*decline);
                Ok(())
            }
        };

        check_invariants(&store, &totals);
    }
});
