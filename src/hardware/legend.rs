//! Legend strings naming one digitizer channel.
//!
//! The canonical form is `Dev <device> chn <channel>`. Parsing only looks at
//! the tail of the string, so labels with a free-form prefix (device names
//! containing spaces, units, plot titles) still resolve.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{NevError, NevResult};
use crate::hardware::digitizer::ChannelKey;

static LEGEND_TAIL: Lazy<Regex> = Lazy::new(|| {
    // Anchored at the end so only the last ` chn <digits>` counts.
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(\S+) chn (\d+)\s*$").unwrap()
});

/// Canonical legend for a channel.
pub fn format_legend(key: ChannelKey) -> String {
    format!("Dev {} chn {}", key.device_id, key.channel)
}

/// Recover the channel a legend names.
pub fn parse_legend(text: &str) -> NevResult<ChannelKey> {
    let expected = "a legend ending in '<device> chn <channel>'";
    let caps = LEGEND_TAIL
        .captures(text)
        .ok_or_else(|| NevError::parse(expected, text))?;
    let device_id = caps[1]
        .parse::<u32>()
        .map_err(|_| NevError::parse(expected, text))?;
    let channel = caps[2]
        .parse::<u32>()
        .map_err(|_| NevError::parse(expected, text))?;
    Ok(ChannelKey::new(device_id, channel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_round_trip() {
        let key = ChannelKey::new(12, 3);
        assert_eq!(parse_legend(&format_legend(key)).unwrap(), key);
    }

    #[test]
    fn names_with_spaces_use_last_occurrence() {
        let key = parse_legend("Scope A chn 9 backup 2 chn 1").unwrap();
        assert_eq!(key, ChannelKey::new(2, 1));
        let key = parse_legend("My fancy digitizer 7 chn 0  ").unwrap();
        assert_eq!(key, ChannelKey::new(7, 0));
    }

    #[test]
    fn malformed_legends_fail() {
        assert!(parse_legend("Dev 3 channel 1").is_err());
        assert!(parse_legend("Dev x chn 1").is_err());
        assert!(parse_legend("").is_err());
    }
}
