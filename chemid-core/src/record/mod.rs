//! Record values and the textual stream handed to the analysis tooling.
//!
//! The stream is one header line followed by one comma-separated row per
//! tick. Rows are formatted into fixed-capacity buffers so the firmware can
//! queue them without an allocator.

use core::fmt::{self, Write as _};

use heapless::String;

use crate::procedure::Phase;
use crate::sequencer::Transition;

pub mod parse;

pub use parse::{ParsedLine, ParsedRow, RecordColumn, RecordParseError, parse_line};

/// Column header emitted once before the first row.
pub const RECORD_HEADER: &str =
    "Elapsed Time (s), Voltage (mV), Current (mA), Temperature (deg C), SoC (%), Comments";

/// Maximum length of a formatted row, excluding the line terminator.
pub const MAX_RECORD_LINE: usize = 160;

/// Fixed-capacity buffer holding one formatted row.
pub type RecordLine = String<MAX_RECORD_LINE>;

/// One emitted sample.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Record {
    /// Whole seconds since the session started.
    pub elapsed_s: i64,
    pub voltage_mv: u16,
    /// Current with the phase sign policy already applied.
    pub current_ma: i32,
    pub temperature_c: f64,
    pub state_of_charge_pct: u8,
    /// Empty unless a transition fired on this tick.
    pub comment: &'static str,
    /// Phase after the tick.
    pub phase: Phase,
    pub transition: Option<Transition>,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {:.6}, {}, {}",
            self.elapsed_s,
            self.voltage_mv,
            self.current_ma,
            self.temperature_c,
            self.state_of_charge_pct,
            self.comment
        )
    }
}

/// A row did not fit into a [`RecordLine`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecordOverflow;

impl fmt::Display for RecordOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record exceeds {MAX_RECORD_LINE} bytes")
    }
}

/// Formats a record into a fixed-capacity line.
pub fn format_record(record: &Record) -> Result<RecordLine, RecordOverflow> {
    let mut line = RecordLine::new();
    write!(line, "{record}").map_err(|_| RecordOverflow)?;
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procedure::PHASE_POLICIES;

    fn record(current_ma: i32, comment: &'static str) -> Record {
        Record {
            elapsed_s: 7_205,
            voltage_mv: 16_512,
            current_ma,
            temperature_c: 24.5,
            state_of_charge_pct: 97,
            comment,
            phase: Phase::Discharge,
            transition: None,
        }
    }

    #[test]
    fn row_matches_column_layout() {
        let line = format_record(&record(-312, "")).expect("fits");
        assert_eq!(line.as_str(), "7205, 16512, -312, 24.500000, 97, ");
    }

    #[test]
    fn row_carries_comment_last() {
        let line = format_record(&record(180, "Measurement complete")).expect("fits");
        assert!(line.ends_with(", 97, Measurement complete"));
    }

    #[test]
    fn header_has_six_columns() {
        assert!(RECORD_HEADER.len() <= MAX_RECORD_LINE);
        assert_eq!(RECORD_HEADER.split(", ").count(), 6);
    }

    #[test]
    fn every_transition_comment_fits_a_row_without_commas() {
        for policy in &PHASE_POLICIES {
            assert!(!policy.entry_comment.contains(','), "{}", policy.entry_comment);
            let mut worst = record(i32::MIN, policy.entry_comment);
            worst.elapsed_s = i64::MAX;
            worst.temperature_c = -40.123_456;
            assert!(format_record(&worst).is_ok(), "{}", policy.entry_comment);
        }
    }

    #[test]
    fn absurd_temperature_overflows_instead_of_truncating() {
        let mut wide = record(0, "");
        wide.temperature_c = 1.0e200;
        assert_eq!(format_record(&wide), Err(RecordOverflow));
    }
}
