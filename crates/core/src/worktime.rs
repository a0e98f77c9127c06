//! `HH:MM:SS` time-worked values as logged on ticket replies.

use crate::CoreError;

/// Parse `HH:MM:SS` or `HH:MM` into seconds.
pub fn parse_hms(text: &str) -> Result<i64, CoreError> {
    let err = || CoreError::InvalidDuration(text.to_string());
    let parts: Vec<&str> = text.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(err());
    }
    let mut fields = [0i64; 3];
    for (slot, part) in fields.iter_mut().zip(&parts) {
        *slot = part.parse::<i64>().map_err(|_| err())?;
        if *slot < 0 {
            return Err(err());
        }
    }
    let [h, m, s] = fields;
    if m >= 60 || s >= 60 {
        return Err(err());
    }
    h.checked_mul(3600)
        .and_then(|secs| secs.checked_add(m * 60 + s))
        .ok_or_else(err)
}

pub fn format_hms(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats() {
        assert_eq!(parse_hms("01:30:15").unwrap(), 5415);
        assert_eq!(parse_hms("0:45").unwrap(), 2700);
        assert_eq!(format_hms(5415), "01:30:15");
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(100 * 3600), "100:00:00");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_hms("").is_err());
        assert!(parse_hms("1").is_err());
        assert!(parse_hms("1:60").is_err());
        assert!(parse_hms("1:00:99").is_err());
        assert!(parse_hms("a:b:c").is_err());
        assert!(parse_hms("1:2:3:4").is_err());
    }

    #[test]
    fn oversized_hours_are_invalid() {
        assert!(matches!(
            parse_hms("9999999999999999:00:00"),
            Err(CoreError::InvalidDuration(_))
        ));
        assert!(parse_hms(&format!("{}:00", i64::MAX / 3600)).is_ok());
        assert!(parse_hms(&format!("{}:00", i64::MAX / 3600 + 1)).is_err());
    }
}
