use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use rust_decimal::Decimal;

use crate::error::Error;
use crate::screen::Screen;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub daily_price: Decimal,
    pub days: u32,
    pub total_price: Decimal,
}

/// Accepts a bare calendar date (midnight UTC) or an RFC 3339 timestamp.
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>, Error> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .ok_or_else(|| Error::InvalidDate(raw.to_string()));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::InvalidDate(raw.to_string()))
}

/// Inclusive day count: both the first and the last day are billed, and a
/// partial trailing day counts as a whole one.
pub fn billable_days(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<u32, Error> {
    let span = end - start;
    if span <= TimeDelta::zero() {
        return Err(Error::InvalidDateRange {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        });
    }
    // Compare whole deltas so sub-second remainders still count
    let whole = span.num_days();
    let spanned = whole + i64::from(span > TimeDelta::days(whole));
    u32::try_from(spanned + 1).map_err(|_| Error::InvalidDateRange {
        start: start.to_rfc3339(),
        end: end.to_rfc3339(),
    })
}

pub fn compute_price(screen: &Screen, start: &str, end: &str) -> Result<PriceQuote, Error> {
    let start = parse_date(start)?;
    let end = parse_date(end)?;
    let days = billable_days(start, end)?;

    if !screen.is_active() {
        return Err(Error::ScreenUnavailable {
            screen: screen.id(),
            status: screen.status(),
        });
    }

    let daily_price = match screen.daily_price() {
        Some(price) if price > Decimal::ZERO => price,
        _ => return Err(Error::InvalidPriceConfiguration(screen.id())),
    };

    let total_price = daily_price
        .checked_mul(Decimal::from(days))
        .ok_or(Error::InvalidPriceConfiguration(screen.id()))?;

    Ok(PriceQuote {
        start,
        end,
        daily_price,
        days,
        total_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::ScreenStatus;

    fn active(price: i64) -> Screen {
        Screen::new(1, Some(Decimal::new(price, 0)), ScreenStatus::Active)
    }

    #[test]
    fn both_ends_are_billed() {
        let quote = compute_price(&active(10), "2024-01-01", "2024-01-03").unwrap();

        assert_eq!(quote.days, 3);
        assert_eq!(quote.total_price, Decimal::new(30, 0));
        assert_eq!(quote.daily_price, Decimal::new(10, 0));
    }

    #[test]
    fn partial_day_rounds_up() {
        let quote = compute_price(
            &active(10),
            "2024-01-01T00:00:00Z",
            "2024-01-02T06:00:00Z",
        )
        .unwrap();

        // 30 hours spans two days, plus the inclusive start day
        assert_eq!(quote.days, 3);
    }

    #[test]
    fn fractional_seconds_are_not_truncated() {
        let start = parse_date("2024-01-01T00:00:00Z").unwrap();

        let half_second = billable_days(start, parse_date("2024-01-01T00:00:00.500Z").unwrap());
        let day_and_a_bit = billable_days(start, parse_date("2024-01-02T00:00:00.500Z").unwrap());
        let exact_day = billable_days(start, parse_date("2024-01-02T00:00:00Z").unwrap());

        assert_eq!(half_second.unwrap(), 2);
        assert_eq!(day_and_a_bit.unwrap(), 3);
        assert_eq!(exact_day.unwrap(), 2);
    }

    #[test]
    fn offsets_are_normalised_to_utc() {
        let quote = compute_price(
            &active(7),
            "2024-03-01T02:00:00+02:00",
            "2024-03-02T00:00:00Z",
        )
        .unwrap();

        assert_eq!(quote.days, 2);
        assert_eq!(quote.total_price, Decimal::new(14, 0));
    }

    #[test]
    fn end_before_or_at_start_rejected() {
        let same_day = compute_price(&active(10), "2024-01-01", "2024-01-01");
        let reversed = compute_price(&active(10), "2024-01-05", "2024-01-01");

        assert!(matches!(same_day, Err(Error::InvalidDateRange { .. })));
        assert!(matches!(reversed, Err(Error::InvalidDateRange { .. })));
    }

    #[test]
    fn unparseable_date_rejected() {
        let result = compute_price(&active(10), "tomorrow", "2024-01-03");

        assert!(matches!(result, Err(Error::InvalidDate(d)) if d == "tomorrow"));
    }

    #[test]
    fn inactive_screen_rejected() {
        let screen = Screen::new(4, Some(Decimal::new(10, 0)), ScreenStatus::Maintenance);

        let result = compute_price(&screen, "2024-01-01", "2024-01-03");

        assert!(matches!(
            result,
            Err(Error::ScreenUnavailable {
                screen: 4,
                status: ScreenStatus::Maintenance
            })
        ));
    }

    #[test]
    fn missing_or_non_positive_price_rejected() {
        let missing = Screen::new(2, None, ScreenStatus::Active);
        let zero = Screen::new(3, Some(Decimal::ZERO), ScreenStatus::Active);

        assert!(matches!(
            compute_price(&missing, "2024-01-01", "2024-01-03"),
            Err(Error::InvalidPriceConfiguration(2))
        ));
        assert!(matches!(
            compute_price(&zero, "2024-01-01", "2024-01-03"),
            Err(Error::InvalidPriceConfiguration(3))
        ));
    }

    #[test]
    fn total_overflow_is_a_price_error() {
        let screen = Screen::new(
            5,
            Some(Decimal::from_i128_with_scale(10_i128.pow(24), 0)),
            ScreenStatus::Active,
        );

        let result = compute_price(&screen, "2000-01-01", "9000-01-01");

        assert!(matches!(result, Err(Error::InvalidPriceConfiguration(5))));
    }

    #[test]
    fn fractional_rates_stay_exact() {
        let screen = Screen::new(1, Some(Decimal::new(1999, 2)), ScreenStatus::Active);

        let quote = compute_price(&screen, "2024-02-27", "2024-03-01").unwrap();

        // leap year: 27, 28, 29 Feb and 1 Mar
        assert_eq!(quote.days, 4);
        assert_eq!(quote.total_price, Decimal::new(7996, 2));
    }
}
