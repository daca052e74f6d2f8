use std::collections::VecDeque;
use std::convert::Infallible;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use chemid_core::charger::NoopCharger;
use chemid_core::config::MeasurementConfig;
use chemid_core::procedure::Phase;
use chemid_core::record::{ParsedLine, Record, parse_line};
use chemid_core::sampling::{RecordSink, SamplingLoop, StepOutcome};
use chemid_core::sequencer::{Sequencer, Transition};
use chemid_core::telemetry::{Reading, TelemetrySource};

/// One data row loaded from a captured log.
#[derive(Clone, Debug, PartialEq)]
struct LoggedRow {
    line_number: usize,
    elapsed_s: u64,
    reading: Reading,
    comment: String,
}

/// Outcome of replaying a captured log through the sequencer.
#[derive(Debug, Default)]
pub struct ReplayReport {
    pub rows: usize,
    pub transitions: Vec<(i64, Transition)>,
    pub mismatches: Vec<String>,
    pub final_phase: Option<Phase>,
}

impl ReplayReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Re-derives the phase sequence of a captured log and checks it against the
/// comments and current signs recorded in it.
pub fn replay(path: &Path, config: MeasurementConfig) -> io::Result<ReplayReport> {
    let rows = load_rows(path)?;
    let sequencer = Sequencer::<Duration>::new(config)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;
    let gauge = ReplayGauge {
        readings: rows.iter().map(|row| row.reading).collect(),
    };
    let mut sampling = SamplingLoop::new(sequencer, gauge, NoopCharger::new(), DiscardSink);
    let mut report = ReplayReport {
        rows: rows.len(),
        ..ReplayReport::default()
    };

    for row in &rows {
        if sampling.is_finished() {
            report.mismatches.push(format!(
                "line {}: session already finished but the log continues",
                row.line_number
            ));
            break;
        }

        let outcome = sampling
            .step(Duration::from_secs(row.elapsed_s))
            .map_err(|err| io::Error::other(err.to_string()))?;
        let StepOutcome::Recorded { record, .. } = outcome else {
            continue;
        };
        compare(row, &record, &mut report);
        if let Some(transition) = record.transition {
            report.transitions.push((record.elapsed_s, transition));
        }
    }

    report.final_phase = Some(sampling.sequencer().phase());
    Ok(report)
}

fn compare(row: &LoggedRow, record: &Record, report: &mut ReplayReport) {
    if row.comment != record.comment {
        report.mismatches.push(format!(
            "line {}: logged comment {:?}, replay produced {:?}",
            row.line_number, row.comment, record.comment
        ));
    }
    if row.reading.current_ma != record.current_ma {
        report.mismatches.push(format!(
            "line {}: logged current {} mA, replay produced {} mA",
            row.line_number, row.reading.current_ma, record.current_ma
        ));
    }
}

fn load_rows(path: &Path) -> io::Result<Vec<LoggedRow>> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        let parsed = parse_line(&line).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}:{line_number}: {err}", path.display()),
            )
        })?;
        let ParsedLine::Row(row) = parsed else {
            continue;
        };
        let elapsed_s = u64::try_from(row.elapsed_s).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}:{line_number}: negative elapsed time", path.display()),
            )
        })?;
        rows.push(LoggedRow {
            line_number,
            elapsed_s,
            // The gauge reports a magnitude; the sign in the log is the sequencer's.
            reading: row.reading.with_current(row.reading.current_ma.saturating_abs()),
            comment: row.comment.to_string(),
        });
    }
    Ok(rows)
}

/// Telemetry source serving logged readings in order.
struct ReplayGauge {
    readings: VecDeque<Reading>,
}

impl ReplayGauge {
    fn current(&self) -> Reading {
        self.readings
            .front()
            .copied()
            .unwrap_or(Reading::new(0, 0, 0.0, 0))
    }
}

impl TelemetrySource for ReplayGauge {
    type Error = Infallible;

    fn read_voltage_mv(&mut self) -> Result<u16, Self::Error> {
        Ok(self.current().voltage_mv)
    }

    fn read_current_ma(&mut self) -> Result<i32, Self::Error> {
        Ok(self.current().current_ma)
    }

    fn read_temperature_c(&mut self) -> Result<f64, Self::Error> {
        Ok(self.current().temperature_c)
    }

    fn read_state_of_charge_pct(&mut self) -> Result<u8, Self::Error> {
        let value = self.current().state_of_charge_pct;
        self.readings.pop_front();
        Ok(value)
    }
}

struct DiscardSink;

impl RecordSink for DiscardSink {
    type Error = Infallible;

    fn write_header(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn write_record(&mut self, _record: &Record) -> Result<(), Self::Error> {
        Ok(())
    }
}
