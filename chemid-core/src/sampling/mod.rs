//! Fixed-cadence sampling loop.
//!
//! [`SamplingLoop::step`] performs one acquire, tick and emit pass and reports
//! how long the caller should wait before the next one. Sleeping is left to
//! the driver: [`SamplingLoop::run_blocking`] on the host, an async task on
//! the firmware.

use core::fmt;
use core::time::Duration;

use crate::charger::{ChargeStatus, ChargerAction, ChargerControl};
use crate::clock::{MonotonicInstant, Timebase};
use crate::procedure::Phase;
use crate::record::Record;
use crate::sequencer::{SequenceError, Sequencer};
use crate::telemetry::{TelemetryError, TelemetrySource};

/// Destination for the record stream.
pub trait RecordSink {
    type Error;

    /// Writes the column header. Called once, before the first record.
    fn write_header(&mut self) -> Result<(), Self::Error>;

    fn write_record(&mut self, record: &Record) -> Result<(), Self::Error>;
}

impl<T> RecordSink for &mut T
where
    T: RecordSink + ?Sized,
{
    type Error = T::Error;

    fn write_header(&mut self) -> Result<(), Self::Error> {
        (**self).write_header()
    }

    fn write_record(&mut self, record: &Record) -> Result<(), Self::Error> {
        (**self).write_record(record)
    }
}

/// Result of a single [`SamplingLoop::step`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum StepOutcome<E> {
    /// A record was produced and emitted.
    Recorded {
        record: Record,
        /// Charger status sampled one step after the charger was activated.
        charger_status: Option<ChargeStatus>,
        /// Delay before the next step, or `None` once the session is done.
        wait: Option<Duration>,
    },
    /// Telemetry failed within the retry budget; nothing was emitted.
    ReadFailed {
        error: TelemetryError<E>,
        consecutive: u8,
        retry_after: Duration,
    },
}

impl<E> StepOutcome<E> {
    /// Delay before the next step, or `None` when the loop should stop.
    pub const fn wait(&self) -> Option<Duration> {
        match self {
            StepOutcome::Recorded { wait, .. } => *wait,
            StepOutcome::ReadFailed { retry_after, .. } => Some(*retry_after),
        }
    }

    /// The emitted record, if any.
    pub const fn record(&self) -> Option<&Record> {
        match self {
            StepOutcome::Recorded { record, .. } => Some(record),
            StepOutcome::ReadFailed { .. } => None,
        }
    }
}

/// Reasons the sampling loop stops early.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LoopError<T, S> {
    /// Telemetry kept failing past the retry budget.
    Telemetry(TelemetryError<T>),
    /// The record sink rejected a line.
    Sink(S),
    Sequence(SequenceError),
}

impl<T, S> fmt::Display for LoopError<T, S>
where
    T: fmt::Debug,
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopError::Telemetry(err) => write!(f, "telemetry unavailable: {err}"),
            LoopError::Sink(err) => write!(f, "record sink failed: {err:?}"),
            LoopError::Sequence(err) => write!(f, "{err}"),
        }
    }
}

/// Totals reported once a blocking run completes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RunSummary {
    pub records: u32,
    pub read_failures: u32,
    pub elapsed: Duration,
    pub final_phase: Phase,
}

/// Couples a [`Sequencer`] with its collaborators.
pub struct SamplingLoop<I, T, C, S> {
    sequencer: Sequencer<I>,
    source: T,
    charger: C,
    sink: S,
    header_written: bool,
    consecutive_failures: u8,
    read_failures: u32,
    records: u32,
    verify_charging: bool,
}

impl<I, T, C, S> SamplingLoop<I, T, C, S>
where
    I: MonotonicInstant,
    T: TelemetrySource,
    C: ChargerControl,
    S: RecordSink,
{
    pub fn new(sequencer: Sequencer<I>, source: T, charger: C, sink: S) -> Self {
        Self {
            sequencer,
            source,
            charger,
            sink,
            header_written: false,
            consecutive_failures: 0,
            read_failures: 0,
            records: 0,
            verify_charging: false,
        }
    }

    pub fn sequencer(&self) -> &Sequencer<I> {
        &self.sequencer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn charger(&self) -> &C {
        &self.charger
    }

    pub fn is_finished(&self) -> bool {
        self.sequencer.is_finished()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            records: self.records,
            read_failures: self.read_failures,
            elapsed: self.sequencer.session().session_elapsed(),
            final_phase: self.sequencer.phase(),
        }
    }

    /// Acquires one reading, advances the sequencer and emits the record.
    ///
    /// Any error other than [`SequenceError::Finished`] switches the charger
    /// off before it is returned.
    pub fn step(&mut self, now: I) -> Result<StepOutcome<T::Error>, LoopError<T::Error, S::Error>> {
        if self.sequencer.is_finished() {
            return Err(LoopError::Sequence(SequenceError::Finished));
        }

        if !self.header_written {
            if let Err(err) = self.sink.write_header() {
                return Err(self.abort(LoopError::Sink(err)));
            }
            self.header_written = true;
        }

        let reading = match self.source.acquire() {
            Ok(reading) => {
                self.consecutive_failures = 0;
                reading
            }
            Err(error) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.read_failures = self.read_failures.saturating_add(1);
                let config = *self.sequencer.config();
                if self.consecutive_failures > config.read_retry_budget {
                    return Err(self.abort(LoopError::Telemetry(error)));
                }
                return Ok(StepOutcome::ReadFailed {
                    error,
                    consecutive: self.consecutive_failures,
                    retry_after: config.read_retry_backoff,
                });
            }
        };

        let charger_status = if core::mem::take(&mut self.verify_charging) {
            self.charger.status()
        } else {
            None
        };

        let record = self
            .sequencer
            .tick(&mut self.charger, now, reading)
            .map_err(LoopError::Sequence)?;
        if record
            .transition
            .is_some_and(|transition| transition.charger == Some(ChargerAction::Activate))
        {
            self.verify_charging = true;
        }

        if let Err(err) = self.sink.write_record(&record) {
            return Err(self.abort(LoopError::Sink(err)));
        }
        self.records = self.records.saturating_add(1);

        let wait = if record.phase.is_terminal() {
            None
        } else {
            Some(self.sequencer.config().sampling_period)
        };

        Ok(StepOutcome::Recorded {
            record,
            charger_status,
            wait,
        })
    }

    /// Runs steps until the session reaches [`Phase::Done`], sleeping on
    /// `timebase` between them. `observe` sees every outcome before the sleep.
    pub fn run_blocking<K, F>(
        &mut self,
        timebase: &mut K,
        mut observe: F,
    ) -> Result<RunSummary, LoopError<T::Error, S::Error>>
    where
        K: Timebase<Instant = I> + ?Sized,
        F: FnMut(&StepOutcome<T::Error>),
    {
        loop {
            let outcome = self.step(timebase.now())?;
            observe(&outcome);
            match outcome.wait() {
                Some(delay) => timebase.sleep(delay),
                None => return Ok(self.summary()),
            }
        }
    }

    fn abort(&mut self, err: LoopError<T::Error, S::Error>) -> LoopError<T::Error, S::Error> {
        self.charger.deactivate();
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::MeasurementConfig;
    use crate::telemetry::{Reading, TelemetryChannel};

    /// Gauge that fails a configurable number of times before every success.
    struct FlakyGauge {
        failures_left: u8,
        reading: Reading,
    }

    impl TelemetrySource for FlakyGauge {
        type Error = ();

        fn read_voltage_mv(&mut self) -> Result<u16, Self::Error> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(());
            }
            Ok(self.reading.voltage_mv)
        }

        fn read_current_ma(&mut self) -> Result<i32, Self::Error> {
            Ok(self.reading.current_ma)
        }

        fn read_temperature_c(&mut self) -> Result<f64, Self::Error> {
            Ok(self.reading.temperature_c)
        }

        fn read_state_of_charge_pct(&mut self) -> Result<u8, Self::Error> {
            Ok(self.reading.state_of_charge_pct)
        }
    }

    #[derive(Default)]
    struct LatchCharger {
        active: bool,
        deactivations: u8,
    }

    impl ChargerControl for LatchCharger {
        fn activate(&mut self) {
            self.active = true;
        }

        fn deactivate(&mut self) {
            self.active = false;
            self.deactivations += 1;
        }

        fn status(&mut self) -> Option<ChargeStatus> {
            Some(if self.active {
                ChargeStatus::Charging
            } else {
                ChargeStatus::NotCharging
            })
        }
    }

    #[derive(Default)]
    struct CountingSink {
        headers: u8,
        records: heapless::Vec<Record, 8>,
    }

    impl RecordSink for CountingSink {
        type Error = ();

        fn write_header(&mut self) -> Result<(), Self::Error> {
            self.headers += 1;
            Ok(())
        }

        fn write_record(&mut self, record: &Record) -> Result<(), Self::Error> {
            self.records.push(*record).map_err(|_| ())
        }
    }

    fn sampling(failures: u8) -> SamplingLoop<Duration, FlakyGauge, LatchCharger, CountingSink> {
        let config = MeasurementConfig::new(2_000, 3_000, 4);
        SamplingLoop::new(
            Sequencer::new(config).expect("valid config"),
            FlakyGauge {
                failures_left: failures,
                reading: Reading::new(14_500, 1_800, 23.0, 40),
            },
            LatchCharger::default(),
            CountingSink::default(),
        )
    }

    #[test]
    fn header_precedes_first_record_once() {
        let mut sampling = sampling(0);
        let mut clock = ManualClock::new();
        for _ in 0..3 {
            let outcome = sampling.step(clock.now()).expect("step");
            clock.sleep(outcome.wait().expect("still running"));
        }
        assert_eq!(sampling.sink().headers, 1);
        assert_eq!(sampling.sink().records.len(), 3);
    }

    #[test]
    fn read_failure_within_budget_emits_nothing() {
        let mut sampling = sampling(1);
        let outcome = sampling.step(Duration::ZERO).expect("retry");
        let StepOutcome::ReadFailed {
            error,
            consecutive,
            retry_after,
        } = outcome
        else {
            panic!("expected a read failure");
        };
        assert_eq!(error.channel, TelemetryChannel::Voltage);
        assert_eq!(consecutive, 1);
        assert_eq!(retry_after, Duration::from_millis(500));
        assert!(sampling.sink().records.is_empty());
        assert_eq!(sampling.sequencer().phase(), Phase::Init);
    }

    #[test]
    fn status_is_sampled_one_step_after_activation() {
        let mut sampling = sampling(0);
        let first = sampling.step(Duration::ZERO).expect("init");
        assert!(matches!(
            first,
            StepOutcome::Recorded {
                charger_status: None,
                ..
            }
        ));
        let second = sampling.step(Duration::from_secs(5)).expect("charge");
        assert!(matches!(
            second,
            StepOutcome::Recorded {
                charger_status: Some(ChargeStatus::Charging),
                ..
            }
        ));
        let third = sampling.step(Duration::from_secs(10)).expect("charge");
        assert!(matches!(
            third,
            StepOutcome::Recorded {
                charger_status: None,
                ..
            }
        ));
    }

    #[test]
    fn exhausted_budget_deactivates_charger() {
        let mut sampling = sampling(0);
        sampling.step(Duration::ZERO).expect("init");
        assert!(sampling.charger().active);

        sampling.source.failures_left = 3;
        assert!(sampling.step(Duration::from_secs(5)).is_ok());
        assert!(sampling.step(Duration::from_secs(6)).is_ok());
        let err = sampling
            .step(Duration::from_secs(7))
            .expect_err("budget exhausted");
        assert!(matches!(err, LoopError::Telemetry(_)));
        assert!(!sampling.charger().active);
        assert_eq!(sampling.charger().deactivations, 1);
        assert_eq!(sampling.summary().read_failures, 3);
    }
}
