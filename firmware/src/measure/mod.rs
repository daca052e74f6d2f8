//! Measurement surface bridging firmware tasks with `chemid-core`.
//!
//! Formatted record lines travel from the measurement task to the USB task
//! over a bounded channel. The measurement task never waits on the host: when
//! the channel is full the line is dropped and counted.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use chemid_core::clock::MonotonicInstant;
use chemid_core::config::MeasurementConfig;
use chemid_core::record::{Record, RecordLine, RecordOverflow, format_record};
use chemid_core::sampling::RecordSink;
#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::{Channel, Sender, TrySendError};
use embassy_time::Instant;

use crate::status;
use crate::telemetry;

/// Pack under test: 4S, 2000 mAh, 3.0 V per cell at zero charge.
pub const PACK_CONFIG: MeasurementConfig = MeasurementConfig::new(2_000, 3_000, 4);

/// Record lines buffered while the host is detached or slow.
pub const RECORD_QUEUE_DEPTH: usize = 16;

#[cfg(target_os = "none")]
type RecordMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type RecordMutex = NoopRawMutex;

/// Queue carrying formatted record lines to the USB task.
pub type RecordQueue = Channel<RecordMutex, RecordLine, RECORD_QUEUE_DEPTH>;

pub type RecordSender<'a> = Sender<'a, RecordMutex, RecordLine, RECORD_QUEUE_DEPTH>;

/// Embassy instant fed into the sequencer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl MonotonicInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> core::time::Duration {
        let micros = self.0.as_micros().saturating_sub(earlier.0.as_micros());
        core::time::Duration::from_micros(micros)
    }
}

pub fn core_duration_to_embassy(duration: core::time::Duration) -> embassy_time::Duration {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    embassy_time::Duration::from_micros(micros)
}

/// Record sink that hands formatted lines to the USB task.
///
/// The header is not queued: the USB task writes it at the start of every
/// host connection so each capture begins with the column names.
pub struct QueueRecordSink<'a> {
    sender: RecordSender<'a>,
}

impl<'a> QueueRecordSink<'a> {
    pub fn new(sender: RecordSender<'a>) -> Self {
        Self { sender }
    }
}

impl RecordSink for QueueRecordSink<'_> {
    type Error = RecordOverflow;

    fn write_header(&mut self) -> Result<(), Self::Error> {
        status::record_session_started();
        Ok(())
    }

    fn write_record(&mut self, record: &Record) -> Result<(), Self::Error> {
        let line = format_record(record)?;
        status::record_emitted(record.phase);
        if let Err(TrySendError::Full(_)) = self.sender.try_send(line) {
            let dropped = status::record_dropped_line();
            telemetry::log_dropped_line(record.elapsed_s, dropped);
        }
        Ok(())
    }
}
