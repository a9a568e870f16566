use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::errors::ParseError;

/// Normalizes one of the service's heterogeneous date tokens into an
/// absolute instant.
///
/// The verifyReceipt service mixes three encodings across receipt styles:
/// epoch milliseconds as a decimal string (the `*_ms` twins and some
/// `expires_date` values), epoch seconds, and textual timestamps such as
/// `2011-02-17 06:20:57 Etc/GMT` or `... America/Los_Angeles`, whose zone
/// suffixes are not standard abbreviations and are rewritten before parsing.
///
/// A token that parses as an integer is epoch milliseconds when it has at
/// least 13 digits, epoch seconds otherwise. A present but unparseable token
/// is a hard error, never a silent `None`; absence is handled by callers.
pub(crate) fn parse_receipt_date(
    field: &'static str,
    value: &str,
) -> Result<DateTime<Utc>, ParseError> {
    let unparseable = || ParseError::Date {
        field,
        value: value.to_string(),
    };

    let token = value.trim();
    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        let epoch: i64 = token.parse().map_err(|_| unparseable())?;
        let instant = if token.len() >= 13 {
            Utc.timestamp_millis_opt(epoch).single()
        } else {
            Utc.timestamp_opt(epoch, 0).single()
        };
        return instant.ok_or_else(unparseable);
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(token) {
        return Ok(instant.with_timezone(&Utc));
    }

    let rewritten = rewrite_zone_suffix(token);
    if let Some((timestamp, zone)) = rewritten.rsplit_once(' ') {
        if let Some(offset) = zone_offset(zone) {
            if let Ok(naive) = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S") {
                return offset
                    .from_local_datetime(&naive)
                    .single()
                    .map(|instant| instant.with_timezone(&Utc))
                    .ok_or_else(unparseable);
            }
        }
    }
    if let Ok(instant) = DateTime::parse_from_str(&rewritten, "%Y-%m-%d %H:%M:%S %z") {
        return Ok(instant.with_timezone(&Utc));
    }

    Err(unparseable())
}

/// Coerces one of the service's stringly-typed integers (the `*_ms` date
/// twins). Failure is a hard error rather than a silent zero.
pub(crate) fn parse_receipt_int(field: &'static str, value: &str) -> Result<i64, ParseError> {
    value.trim().parse().map_err(|_| ParseError::Integer {
        field,
        value: value.to_string(),
    })
}

/// Coerces a non-negative integer (`quantity`); a negative token is as much
/// a hard error as a non-numeric one.
pub(crate) fn parse_receipt_uint(field: &'static str, value: &str) -> Result<i64, ParseError> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|count| i64::try_from(count).ok())
        .ok_or_else(|| ParseError::Integer {
            field,
            value: value.to_string(),
        })
}

/// Rewrites the service's non-standard zone names: the `Etc/` prefix is
/// dropped (`Etc/GMT` becomes `GMT`) and `America/Los_Angeles` becomes the
/// `PST` marker.
fn rewrite_zone_suffix(value: &str) -> String {
    value
        .replace("America/Los_Angeles", "PST")
        .replace("Etc/", "")
}

fn zone_offset(zone: &str) -> Option<FixedOffset> {
    match zone {
        "GMT" | "UTC" => FixedOffset::east_opt(0),
        "PST" => FixedOffset::west_opt(8 * 3600),
        "PDT" => FixedOffset::west_opt(7 * 3600),
        _ => None,
    }
}
