mod pack;
mod replay;
mod session;

use std::env;
use std::io;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use chemid_core::config::{
    DEFAULT_RELAX_AFTER_CHARGE, DEFAULT_RELAX_AFTER_DISCHARGE, MeasurementConfig,
};

use pack::PackProfile;
use session::RunOptions;

const USAGE: &str = "\
Usage: chemid-emulator [options]
       chemid-emulator replay <log.csv> [pack options]

Options:
  --profile <fresh|aged|cold|flaky>  simulated pack behavior (default: fresh)
  --cells <n>                        series cell count (default: 4)
  --capacity <mAh>                   design capacity (default: 2000)
  --term-mv <mV>                     per-cell termination voltage (default: 3000)
  --period <s>                       sampling period in seconds (default: 5)
  --relax-charged <s>                rest after charging in seconds (default: 7200)
  --relax-discharged <s>             rest after discharging in seconds (default: 18000)
  --output <path>                    record log path (default: logs/chemid-<profile>.csv)
  --realtime                         sleep on the host clock between samples
  --quiet                            do not echo records to stdout";

enum Mode {
    Run(RunOptions),
    Replay {
        path: PathBuf,
        config: MeasurementConfig,
    },
}

fn main() -> io::Result<()> {
    let mode = parse_args(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    match mode {
        Mode::Run(options) => {
            session::run(&options)?;
        }
        Mode::Replay { path, config } => {
            let report = replay::replay(&path, config)?;
            for (elapsed_s, transition) in &report.transitions {
                println!("{elapsed_s:>8}s  {} -> {}", transition.from, transition.to);
            }
            for mismatch in &report.mismatches {
                println!("mismatch: {mismatch}");
            }
            let final_phase = report
                .final_phase
                .map_or_else(|| "none".to_string(), |phase| phase.to_string());
            println!(
                "replayed {} rows, final phase {final_phase}, {} mismatches",
                report.rows,
                report.mismatches.len()
            );
            if !report.is_consistent() {
                process::exit(1);
            }
        }
    }

    Ok(())
}

#[derive(Debug)]
struct PackArgs {
    cells: u8,
    capacity_mah: u32,
    term_mv: u16,
    period: Duration,
    relax_charged: Duration,
    relax_discharged: Duration,
}

impl Default for PackArgs {
    fn default() -> Self {
        Self {
            cells: 4,
            capacity_mah: 2_000,
            term_mv: 3_000,
            period: Duration::from_secs(5),
            relax_charged: DEFAULT_RELAX_AFTER_CHARGE,
            relax_discharged: DEFAULT_RELAX_AFTER_DISCHARGE,
        }
    }
}

impl PackArgs {
    fn config(&self) -> Result<MeasurementConfig, String> {
        let config = MeasurementConfig::new(self.capacity_mah, self.term_mv, self.cells)
            .with_sampling_period(self.period)
            .with_relax_durations(self.relax_charged, self.relax_discharged);
        config.validate().map_err(|err| err.to_string())?;
        Ok(config)
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Mode, String> {
    let mut args = args.into_iter().peekable();
    let replay_path = if args.peek().is_some_and(|arg| arg == "replay") {
        args.next();
        Some(PathBuf::from(
            args.next().ok_or("Expected a log path after `replay`")?,
        ))
    } else {
        None
    };

    let mut pack = PackArgs::default();
    let mut profile = PackProfile::Fresh;
    let mut output = None;
    let mut realtime = false;
    let mut echo = true;

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg.clone(), None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {flag}"))
        };

        match flag.as_str() {
            "--profile" => profile = PackProfile::from_tag(&value()?)?,
            "--cells" => pack.cells = parse_number(&flag, &value()?)?,
            "--capacity" => pack.capacity_mah = parse_number(&flag, &value()?)?,
            "--term-mv" => pack.term_mv = parse_number(&flag, &value()?)?,
            "--period" => pack.period = Duration::from_secs(parse_number(&flag, &value()?)?),
            "--relax-charged" => {
                pack.relax_charged = Duration::from_secs(parse_number(&flag, &value()?)?);
            }
            "--relax-discharged" => {
                pack.relax_discharged = Duration::from_secs(parse_number(&flag, &value()?)?);
            }
            "--output" => output = Some(PathBuf::from(value()?)),
            "--realtime" => realtime = true,
            "--quiet" => echo = false,
            other => return Err(format!("Unknown option `{other}`")),
        }
    }

    let config = pack.config()?;
    if let Some(path) = replay_path {
        return Ok(Mode::Replay { path, config });
    }

    let mut options = RunOptions::new(config, profile);
    if let Some(output) = output {
        options.output = output;
    }
    options.realtime = realtime;
    options.echo = echo;
    Ok(Mode::Run(options))
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid value `{value}` for {flag}"))
}
