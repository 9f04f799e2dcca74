//! Boundary validation of user-entered values.
//!
//! Malformed input is rejected here with a descriptive message before it can
//! reach the history store or the report pipeline.

use crate::core::TOTAL_CHANNELS;

/// Parse a time-window offset field.
///
/// Empty text means "use the default" (run start / last sample). Anything
/// else must parse as a non-negative number of seconds.
pub fn parse_time_offset(text: &str) -> Result<Option<f64>, &'static str> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    match text.parse::<f64>() {
        Ok(value) if value >= 0.0 && value.is_finite() => Ok(Some(value)),
        Ok(_) => Err("Time offset must be a non-negative number of seconds"),
        Err(_) => Err("Invalid time range. Please enter numbers only"),
    }
}

/// Parse the ambient-channel field.
///
/// The operator enters a one-based channel number; empty or unparseable text
/// disables ambient tracking for the run (matching how a blank field behaves
/// in the settings form).
pub fn parse_ambient_channel(text: &str) -> Option<usize> {
    let number: usize = text.trim().parse().ok()?;
    if (1..=TOTAL_CHANNELS).contains(&number) {
        Some(number - 1)
    } else {
        None
    }
}

/// Validate a zero-based channel index against the fixed layout.
pub fn is_valid_channel_index(channel: usize) -> Result<(), &'static str> {
    if channel < TOTAL_CHANNELS {
        Ok(())
    } else {
        Err("Channel index is outside the channel layout")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_offset_parsing() {
        assert_eq!(parse_time_offset(""), Ok(None));
        assert_eq!(parse_time_offset("  "), Ok(None));
        assert_eq!(parse_time_offset("12.5"), Ok(Some(12.5)));
        assert_eq!(parse_time_offset("0"), Ok(Some(0.0)));
        assert!(parse_time_offset("-3").is_err());
        assert!(parse_time_offset("ten").is_err());
        assert!(parse_time_offset("NaN").is_err());
    }

    #[test]
    fn ambient_channel_parsing() {
        assert_eq!(parse_ambient_channel("1"), Some(0));
        assert_eq!(parse_ambient_channel("160"), Some(159));
        assert_eq!(parse_ambient_channel(""), None);
        assert_eq!(parse_ambient_channel("0"), None);
        assert_eq!(parse_ambient_channel("161"), None);
        assert_eq!(parse_ambient_channel("room"), None);
    }

    #[test]
    fn channel_index_bounds() {
        assert!(is_valid_channel_index(0).is_ok());
        assert!(is_valid_channel_index(159).is_ok());
        assert!(is_valid_channel_index(160).is_err());
    }
}
