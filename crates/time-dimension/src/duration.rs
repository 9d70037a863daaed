//! ISO 8601 duration parsing for WMS interval steps.
//!
//! Capabilities documents advertise intervals as `start/end/step`, where the
//! step is a duration such as `PT10M`, `PT1H30M`, `P1D` or `P1DT6H`.
//! Year and month designators are rejected because they have no fixed length.

use chrono::Duration;

/// Parse an ISO 8601 duration into a fixed-length [`Duration`].
///
/// Supports weeks and days in the date part and hours, minutes and
/// (optionally fractional) seconds in the time part. Returns `None` for
/// anything else, including an empty `P` or `PT` designator.
pub fn parse_iso_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let rest = s.strip_prefix('P').or_else(|| s.strip_prefix('p'))?;

    let (date_part, time_part) = match rest.find(|c: char| c.eq_ignore_ascii_case(&'T')) {
        Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
        None => (rest, None),
    };

    let mut total_ms: i64 = 0;
    let mut components = 0;

    for (value, unit) in components_of(date_part)? {
        let ms_per_unit = match unit {
            'W' => 7.0 * 86_400_000.0,
            'D' => 86_400_000.0,
            _ => return None,
        };
        total_ms = total_ms.checked_add((value * ms_per_unit).round() as i64)?;
        components += 1;
    }

    if let Some(time_part) = time_part {
        let parsed = components_of(time_part)?;
        if parsed.is_empty() {
            return None;
        }
        for (value, unit) in parsed {
            let ms_per_unit = match unit {
                'H' => 3_600_000.0,
                'M' => 60_000.0,
                'S' => 1_000.0,
                _ => return None,
            };
            total_ms = total_ms.checked_add((value * ms_per_unit).round() as i64)?;
            components += 1;
        }
    }

    if components == 0 {
        return None;
    }

    Some(Duration::milliseconds(total_ms))
}

/// Step length in milliseconds, treating unparseable input as zero.
pub fn step_millis(s: &str) -> i64 {
    parse_iso_duration(s).map_or(0, |d| d.num_milliseconds())
}

/// Split `1DT` style designator runs into `(value, unit)` pairs.
fn components_of(part: &str) -> Option<Vec<(f64, char)>> {
    let mut out = Vec::new();
    let mut number = String::new();

    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            number.push(if c == ',' { '.' } else { c });
        } else if c.is_ascii_alphabetic() {
            if number.is_empty() {
                return None;
            }
            let value: f64 = number.parse().ok()?;
            out.push((value, c.to_ascii_uppercase()));
            number.clear();
        } else {
            return None;
        }
    }

    // Trailing digits without a designator
    if !number.is_empty() {
        return None;
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minutes() {
        assert_eq!(parse_iso_duration("PT10M"), Some(Duration::minutes(10)));
        assert_eq!(parse_iso_duration("PT30M"), Some(Duration::minutes(30)));
    }

    #[test]
    fn test_parse_combined_time_components() {
        assert_eq!(
            parse_iso_duration("PT1H30M15S"),
            Some(Duration::seconds(3600 + 1800 + 15))
        );
    }

    #[test]
    fn test_parse_day_only_and_day_time() {
        assert_eq!(parse_iso_duration("P1D"), Some(Duration::days(1)));
        assert_eq!(parse_iso_duration("P1DT6H"), Some(Duration::hours(30)));
        assert_eq!(parse_iso_duration("P2W"), Some(Duration::days(14)));
    }

    #[test]
    fn test_parse_fractional_seconds() {
        assert_eq!(parse_iso_duration("PT0.5S"), Some(Duration::milliseconds(500)));
    }

    #[test]
    fn test_reject_unknown_syntax() {
        assert_eq!(parse_iso_duration("PTX"), None);
        assert_eq!(parse_iso_duration("PT"), None);
        assert_eq!(parse_iso_duration("P"), None);
        assert_eq!(parse_iso_duration("10M"), None);
        assert_eq!(parse_iso_duration("P1M"), None);
        assert_eq!(parse_iso_duration("PT5"), None);
    }

    #[test]
    fn test_step_millis_unknown_is_zero() {
        assert_eq!(step_millis("PTX"), 0);
        assert_eq!(step_millis("PT6M"), 360_000);
    }
}
