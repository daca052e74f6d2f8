//! Parser for previously captured record streams.
//!
//! Used by the emulator to replay a log through the sequencer and by tests to
//! inspect emitted lines. Numeric columns are comma-terminated; the comment is
//! the remainder of the line and may be empty.

use core::fmt;
use core::str::FromStr;

use winnow::combinator::terminated;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{rest, take_till};

use super::RECORD_HEADER;
use crate::telemetry::Reading;

/// Numeric columns of a record row, in stream order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordColumn {
    Elapsed,
    Voltage,
    Current,
    Temperature,
    StateOfCharge,
}

impl fmt::Display for RecordColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordColumn::Elapsed => f.write_str("elapsed time"),
            RecordColumn::Voltage => f.write_str("voltage"),
            RecordColumn::Current => f.write_str("current"),
            RecordColumn::Temperature => f.write_str("temperature"),
            RecordColumn::StateOfCharge => f.write_str("state of charge"),
        }
    }
}

/// Errors reported while parsing a record line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordParseError {
    /// The line ended before the column's terminating comma.
    MissingColumn(RecordColumn),
    /// The column text is not a valid number for its type.
    InvalidNumber(RecordColumn),
}

impl fmt::Display for RecordParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordParseError::MissingColumn(column) => write!(f, "missing {column} column"),
            RecordParseError::InvalidNumber(column) => write!(f, "invalid {column} value"),
        }
    }
}

/// A single data row.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ParsedRow<'a> {
    pub elapsed_s: i64,
    /// Measurement columns exactly as written; the current keeps its sign.
    pub reading: Reading,
    pub comment: &'a str,
}

/// Classification of one line of a record stream.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ParsedLine<'a> {
    Header,
    Blank,
    Row(ParsedRow<'a>),
}

/// Parses one line of a record stream. Trailing line terminators are ignored.
pub fn parse_line(line: &str) -> Result<ParsedLine<'_>, RecordParseError> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.trim().is_empty() {
        return Ok(ParsedLine::Blank);
    }
    if trimmed.trim_end() == RECORD_HEADER {
        return Ok(ParsedLine::Header);
    }

    let mut input = trimmed;
    parse_row(&mut input).map(ParsedLine::Row)
}

fn parse_row<'i>(input: &mut &'i str) -> Result<ParsedRow<'i>, RecordParseError> {
    let elapsed_s = number(input, RecordColumn::Elapsed)?;
    let voltage_mv = number(input, RecordColumn::Voltage)?;
    let current_ma = number(input, RecordColumn::Current)?;
    let temperature_c = number(input, RecordColumn::Temperature)?;
    let state_of_charge_pct = number(input, RecordColumn::StateOfCharge)?;
    let comment = comment(input);

    Ok(ParsedRow {
        elapsed_s,
        reading: Reading::new(voltage_mv, current_ma, temperature_c, state_of_charge_pct),
        comment,
    })
}

fn number<T>(input: &mut &str, column: RecordColumn) -> Result<T, RecordParseError>
where
    T: FromStr,
{
    let text = field(input).map_err(|_| RecordParseError::MissingColumn(column))?;
    text.parse()
        .map_err(|_| RecordParseError::InvalidNumber(column))
}

fn field<'i>(input: &mut &'i str) -> Result<&'i str, ErrMode<ContextError>> {
    terminated(take_till(0.., ','), ',')
        .map(str::trim)
        .parse_next(input)
}

fn comment<'i>(input: &mut &'i str) -> &'i str {
    let remainder: Result<&'i str, ErrMode<ContextError>> = rest.parse_next(input);
    remainder.map_or("", str::trim)
}
