use time::macros::time;
use time::{OffsetDateTime, Time, Weekday};
use time_tz::{timezones, OffsetDateTimeExt};

use super::MarketDataType;

const MARKET_OPEN: Time = time!(09:30);
const MARKET_CLOSE: Time = time!(16:00);

/// Returns `true` during NYSE regular trading hours, Monday to Friday 09:30 to 16:00 New York time.
///
/// Exchange holidays are not taken into account.
pub fn is_regular_trading_hours(now: OffsetDateTime) -> bool {
    let new_york = now.to_timezone(timezones::db::america::NEW_YORK);

    let weekday = !matches!(new_york.weekday(), Weekday::Saturday | Weekday::Sunday);
    let local_time = new_york.time();

    weekday && local_time >= MARKET_OPEN && local_time < MARKET_CLOSE
}

impl MarketDataType {
    /// Live data while the market is open, otherwise the last recorded values.
    pub fn for_time(now: OffsetDateTime) -> MarketDataType {
        if is_regular_trading_hours(now) {
            MarketDataType::Realtime
        } else {
            MarketDataType::Frozen
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_regular_trading_hours() {
        let cases = [
            // EDT is UTC-4
            (datetime!(2025-05-05 13:29:59 UTC), false),
            (datetime!(2025-05-05 13:30:00 UTC), true),
            (datetime!(2025-05-05 19:59:59 UTC), true),
            (datetime!(2025-05-05 20:00:00 UTC), false),
            // EST is UTC-5
            (datetime!(2025-01-06 14:45:00 UTC), true),
            (datetime!(2025-01-06 14:15:00 UTC), false),
            // weekend
            (datetime!(2025-05-03 15:00:00 UTC), false),
            (datetime!(2025-05-04 15:00:00 UTC), false),
            // offsets other than UTC
            (datetime!(2025-05-05 09:45:00 -4), true),
        ];

        for (now, expected) in cases {
            assert_eq!(is_regular_trading_hours(now), expected, "{now}");
        }
    }

    #[test]
    fn test_market_data_type_for_time() {
        assert_eq!(MarketDataType::for_time(datetime!(2025-05-05 14:00:00 UTC)), MarketDataType::Realtime);
        assert_eq!(MarketDataType::for_time(datetime!(2025-05-05 22:00:00 UTC)), MarketDataType::Frozen);
    }
}
