//! Presentation timestamp helpers.
//!
//! MPEG-PS carries 33-bit timestamps on a 90 kHz clock. Throughout the Kino
//! crates, timestamps are exposed as `f64` seconds, with [`INVALID_TS`]
//! standing in for "no timestamp".

/// The MPEG system clock rate (90 kHz).
pub const PTS_CLOCK_RATE: u64 = 90_000;

/// Sentinel for a missing or undecodable timestamp.
pub const INVALID_TS: f64 = -1.0;

/// Convert a 90 kHz clock value to seconds.
pub fn clock_to_seconds(ticks: u64) -> f64 {
    ticks as f64 / PTS_CLOCK_RATE as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_to_seconds() {
        assert_eq!(clock_to_seconds(0), 0.0);
        assert_eq!(clock_to_seconds(90_000), 1.0);
        assert_eq!(clock_to_seconds(45_000), 0.5);
    }

    #[test]
    fn test_max_33_bit_clock() {
        // The full 33-bit range is a bit over 26.5 hours.
        let max = (1u64 << 33) - 1;
        let secs = clock_to_seconds(max);
        assert!(secs > 95_443.0 && secs < 95_444.0);
    }
}
