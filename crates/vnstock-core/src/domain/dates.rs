use time::macros::{format_description, offset, time};
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset, Weekday};

use crate::ValidationError;

/// Exchange-local offset. Vietnam has no daylight saving time.
pub const VN_OFFSET: UtcOffset = offset!(+7);

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<Date, ValidationError> {
    let trimmed = input.trim();
    Date::parse(trimmed, format_description!("[year]-[month]-[day]")).map_err(|_| {
        ValidationError::InvalidDate {
            value: trimmed.to_owned(),
        }
    })
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Format a date as `DD-MM-YYYY`.
pub fn format_date_dmy(date: Date) -> String {
    format!(
        "{:02}-{:02}-{:04}",
        date.day(),
        u8::from(date.month()),
        date.year()
    )
}

pub fn today_vn() -> Date {
    OffsetDateTime::now_utc().to_offset(VN_OFFSET).date()
}

/// Session date that intraday ticks belong to at local time `now`: weekends
/// and Monday before 08:30 map back to the previous Friday.
pub fn trading_date_at(now: PrimitiveDateTime) -> Date {
    let date = now.date();
    let back = match date.weekday() {
        Weekday::Saturday => 1,
        Weekday::Sunday => 2,
        Weekday::Monday if now.time() < time!(8:30) => 3,
        _ => 0,
    };
    date - Duration::days(back)
}

pub fn trading_date_vn() -> Date {
    let now = OffsetDateTime::now_utc().to_offset(VN_OFFSET);
    trading_date_at(PrimitiveDateTime::new(now.date(), now.time()))
}

/// Fails when `start` is after `end`.
pub fn ensure_ordered(start: Date, end: Date) -> Result<(), ValidationError> {
    if start > end {
        return Err(ValidationError::InvalidDateRange {
            start: format_date(start),
            end: format_date(end),
        });
    }
    Ok(())
}

/// Epoch seconds of local midnight at the start of `date`.
pub fn vn_midnight_epoch(date: Date) -> i64 {
    PrimitiveDateTime::new(date, Time::MIDNIGHT)
        .assume_offset(VN_OFFSET)
        .unix_timestamp()
}

/// Local wall-clock time for an epoch value in seconds.
pub fn epoch_to_vn(seconds: i64) -> Option<PrimitiveDateTime> {
    OffsetDateTime::from_unix_timestamp(seconds)
        .ok()
        .map(|value| {
            let local = value.to_offset(VN_OFFSET);
            PrimitiveDateTime::new(local.date(), local.time())
        })
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime};

    use super::*;

    #[test]
    fn parses_iso_dates() {
        assert_eq!(parse_date("2024-01-31"), Ok(date!(2024 - 01 - 31)));
        assert!(matches!(
            parse_date("31/01/2024"),
            Err(ValidationError::InvalidDate { .. })
        ));
    }

    #[test]
    fn formats_both_orders() {
        let value = date!(2024 - 03 - 05);
        assert_eq!(format_date(value), "2024-03-05");
        assert_eq!(format_date_dmy(value), "05-03-2024");
    }

    #[test]
    fn rejects_reversed_range() {
        let err = ensure_ordered(date!(2024 - 02 - 01), date!(2024 - 01 - 01)).expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidDateRange { .. }));
    }

    #[test]
    fn converts_epoch_to_exchange_time() {
        // 2023-11-14T22:13:20Z
        let local = epoch_to_vn(1_700_000_000).expect("valid epoch");
        assert_eq!(local, datetime!(2023-11-15 05:13:20));
    }

    #[test]
    fn trading_date_rolls_back_outside_sessions() {
        // 2024-03-09 is a Saturday, 2024-03-11 a Monday.
        assert_eq!(trading_date_at(datetime!(2024-03-09 10:00)), date!(2024 - 03 - 08));
        assert_eq!(trading_date_at(datetime!(2024-03-10 10:00)), date!(2024 - 03 - 08));
        assert_eq!(trading_date_at(datetime!(2024-03-11 08:00)), date!(2024 - 03 - 08));
        assert_eq!(trading_date_at(datetime!(2024-03-11 09:00)), date!(2024 - 03 - 11));
    }

    #[test]
    fn midnight_epoch_uses_exchange_offset() {
        assert_eq!(vn_midnight_epoch(date!(1970 - 01 - 02)), 86_400 - 7 * 3_600);
    }
}
