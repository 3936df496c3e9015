use anyhow::{Result, anyhow, bail};
use time::{OffsetDateTime, UtcOffset};

const NANOS_PER_MILLI: i128 = 1_000_000;
const MILLIS_PER_SECOND: u64 = 1_000;

/// Unit a source stores its epoch timestamps in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochUnit {
    Seconds,
    Millis,
}

pub fn epoch_to_unix_ms(raw: i64, unit: EpochUnit) -> Result<u64> {
    if raw <= 0 {
        bail!("epoch value must be positive, got {raw}");
    }

    let raw = u64::try_from(raw).map_err(|_| anyhow!("epoch value out of range"))?;
    let timestamp_unix_ms = match unit {
        EpochUnit::Millis => raw,
        EpochUnit::Seconds => raw
            .checked_mul(MILLIS_PER_SECOND)
            .ok_or_else(|| anyhow!("epoch seconds overflow milliseconds: {raw}"))?,
    };
    to_utc_datetime(timestamp_unix_ms)?;
    Ok(timestamp_unix_ms)
}

fn to_utc_datetime(timestamp_unix_ms: u64) -> Result<OffsetDateTime> {
    let nanos = i128::from(timestamp_unix_ms)
        .checked_mul(NANOS_PER_MILLI)
        .ok_or_else(|| anyhow!("timestamp overflow: {timestamp_unix_ms}"))?;
    Ok(OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|error| anyhow!("timestamp out of range {timestamp_unix_ms}: {error}"))?
        .to_offset(UtcOffset::UTC))
}

/// Whole seconds, rounded half up.
#[must_use]
pub const fn round_to_nearest_second(timestamp_unix_ms: u64) -> u64 {
    timestamp_unix_ms.saturating_add(MILLIS_PER_SECOND / 2) / MILLIS_PER_SECOND
}

pub fn format_unix_ms(timestamp_unix_ms: u64) -> Result<String> {
    let dt = to_utc_datetime(timestamp_unix_ms)?;
    Ok(format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        dt.millisecond()
    ))
}

#[cfg(test)]
mod tests {
    use super::{EpochUnit, epoch_to_unix_ms, format_unix_ms, round_to_nearest_second};

    #[test]
    fn seconds_scale_to_millis() {
        assert_eq!(
            epoch_to_unix_ms(1_770_274_803, EpochUnit::Seconds).expect("seconds should convert"),
            1_770_274_803_000
        );
    }

    #[test]
    fn millis_pass_through() {
        assert_eq!(
            epoch_to_unix_ms(1_770_274_803_000, EpochUnit::Millis).expect("millis should pass"),
            1_770_274_803_000
        );
    }

    #[test]
    fn rejects_zero_and_negative() {
        assert!(epoch_to_unix_ms(0, EpochUnit::Millis).is_err());
        let err = epoch_to_unix_ms(-5, EpochUnit::Seconds).expect_err("negative should fail");
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn rejects_values_past_the_calendar_range() {
        let err = epoch_to_unix_ms(900_000_000_000_000_000, EpochUnit::Millis)
            .expect_err("far future millis should fail");
        assert!(err.to_string().contains("out of range"));
        assert!(epoch_to_unix_ms(1_700_000_000_000, EpochUnit::Seconds).is_err());
    }

    #[test]
    fn rounds_half_up_to_seconds() {
        assert_eq!(round_to_nearest_second(10_000), 10);
        assert_eq!(round_to_nearest_second(10_400), 10);
        assert_eq!(round_to_nearest_second(10_500), 11);
    }

    #[test]
    fn formats_iso8601_utc_with_millis() {
        assert_eq!(
            format_unix_ms(1_770_274_803_042).expect("timestamp should format"),
            "2026-02-05T07:00:03.042Z"
        );
    }
}
