use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use chemid_core::charger::ChargeStatus;
use chemid_core::clock::{ManualClock, MonotonicInstant, Timebase};
use chemid_core::config::MeasurementConfig;
use chemid_core::record::{RECORD_HEADER, Record, format_record};
use chemid_core::sampling::{RecordSink, RunSummary, SamplingLoop, StepOutcome};
use chemid_core::sequencer::Sequencer;

use crate::pack::{GaugeError, PackProfile, SimulatedPack};

/// Options for a simulated measurement session.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub config: MeasurementConfig,
    pub profile: PackProfile,
    pub output: PathBuf,
    /// Sleep on the host clock instead of advancing simulated time.
    pub realtime: bool,
    /// Echo every record line to stdout.
    pub echo: bool,
}

impl RunOptions {
    pub fn new(config: MeasurementConfig, profile: PackProfile) -> Self {
        Self {
            config,
            profile,
            output: default_log_path(profile),
            realtime: false,
            echo: true,
        }
    }
}

pub fn default_log_path(profile: PackProfile) -> PathBuf {
    PathBuf::from(format!("logs/chemid-{}.csv", profile.tag()))
}

/// Runs one full measurement cycle against a simulated pack.
pub fn run(options: &RunOptions) -> io::Result<RunSummary> {
    let pack = SimulatedPack::new(options.profile, &options.config);
    let log = RecordLog::create(&options.output, options.echo)?;

    eprintln!(
        "session: profile={} cells={} capacity={}mAh taper<{}mA termination<{}mV period={}s log={}",
        options.profile,
        options.config.cell_count,
        options.config.design_capacity_mah,
        options.config.charge_taper_threshold_ma(),
        options.config.termination_voltage_mv(),
        options.config.sampling_period.as_secs_f64(),
        options.output.display(),
    );

    let summary = if options.realtime {
        drive(options.config, &pack, log, HostClock::new())?
    } else {
        drive(options.config, &pack, log, ManualClock::new())?
    };

    eprintln!(
        "session: finished phase={} records={} read-failures={} elapsed={}",
        summary.final_phase,
        summary.records,
        summary.read_failures,
        format_elapsed(summary.elapsed),
    );
    Ok(summary)
}

fn drive<K>(
    config: MeasurementConfig,
    pack: &SimulatedPack,
    log: RecordLog,
    clock: K,
) -> io::Result<RunSummary>
where
    K: Timebase,
{
    let sequencer = Sequencer::<K::Instant>::new(config)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;
    let mut sampling = SamplingLoop::new(sequencer, pack.gauge(), pack.charger(), log);
    let mut timebase = PackTimebase::new(clock, pack.clone());

    sampling
        .run_blocking(&mut timebase, |outcome| narrate(outcome, pack))
        .map_err(|err| io::Error::other(err.to_string()))
}

fn narrate(outcome: &StepOutcome<GaugeError>, pack: &SimulatedPack) {
    match outcome {
        StepOutcome::Recorded {
            record,
            charger_status,
            ..
        } => {
            if let Some(transition) = record.transition {
                let action = transition
                    .charger
                    .map_or_else(String::new, |action| format!(" charger={action}"));
                eprintln!(
                    "[+{}] {} -> {}{action}",
                    format_elapsed_secs(record.elapsed_s),
                    transition.from,
                    transition.to,
                );
            }
            if *charger_status == Some(ChargeStatus::NotCharging) {
                eprintln!(
                    "[+{}] warning: charger enabled but not charging",
                    format_elapsed_secs(record.elapsed_s)
                );
            }
            if let Some(note) = pack.follow_operator(record) {
                eprintln!("[+{}] {note}", format_elapsed_secs(record.elapsed_s));
            }
        }
        StepOutcome::ReadFailed {
            error,
            consecutive,
            retry_after,
        } => {
            eprintln!(
                "telemetry: {error} (attempt {consecutive}, retrying in {}ms)",
                retry_after.as_millis()
            );
        }
    }
}

/// Timebase wrapper that keeps the pack model in step with the clock.
struct PackTimebase<K: Timebase> {
    inner: K,
    origin: Option<K::Instant>,
    pack: SimulatedPack,
}

impl<K: Timebase> PackTimebase<K> {
    fn new(inner: K, pack: SimulatedPack) -> Self {
        Self {
            inner,
            origin: None,
            pack,
        }
    }
}

impl<K: Timebase> Timebase for PackTimebase<K> {
    type Instant = K::Instant;

    fn now(&mut self) -> Self::Instant {
        let now = self.inner.now();
        let origin = *self.origin.get_or_insert(now);
        self.pack.advance_to(now.saturating_duration_since(origin));
        now
    }

    fn sleep(&mut self, duration: Duration) {
        self.inner.sleep(duration);
    }
}

/// Host monotonic instant.
#[derive(Clone, Copy, Debug)]
pub struct HostInstant(Instant);

impl MonotonicInstant for HostInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

/// Wall-clock timebase for `--realtime` runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostClock;

impl HostClock {
    pub fn new() -> Self {
        Self
    }
}

impl Timebase for HostClock {
    type Instant = HostInstant;

    fn now(&mut self) -> HostInstant {
        HostInstant(Instant::now())
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Record sink writing the CSV stream to a log file and optionally stdout.
pub struct RecordLog {
    writer: BufWriter<File>,
    echo: bool,
}

impl RecordLog {
    pub fn create(path: &Path, echo: bool) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            echo,
        })
    }

    fn append_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.writer, "{line}")?;
        if self.echo {
            println!("{line}");
        }
        self.writer.flush()
    }
}

impl RecordSink for RecordLog {
    type Error = io::Error;

    fn write_header(&mut self) -> io::Result<()> {
        self.append_line(RECORD_HEADER)
    }

    fn write_record(&mut self, record: &Record) -> io::Result<()> {
        let line = format_record(record)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        self.append_line(&line)
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("{}h{:02}m{:02}s", total / 3_600, (total / 60) % 60, total % 60)
}

fn format_elapsed_secs(elapsed_s: i64) -> String {
    format_elapsed(Duration::from_secs(elapsed_s.unsigned_abs()))
}
