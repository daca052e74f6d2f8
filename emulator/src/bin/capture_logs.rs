use std::io;

#[allow(dead_code)]
#[path = "../pack.rs"]
mod pack;
#[allow(dead_code)]
#[path = "../replay.rs"]
mod replay;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use chemid_core::config::MeasurementConfig;
use pack::PackProfile;
use session::RunOptions;

/// Pack geometry used for the reference captures.
fn reference_config(profile: PackProfile) -> MeasurementConfig {
    match profile {
        PackProfile::Cold => MeasurementConfig::new(3_200, 3_000, 3),
        PackProfile::Fresh | PackProfile::Aged | PackProfile::Flaky => {
            MeasurementConfig::new(2_000, 3_000, 4)
        }
    }
}

fn main() -> io::Result<()> {
    for profile in PackProfile::ALL {
        capture_profile(profile)?;
    }
    Ok(())
}

fn capture_profile(profile: PackProfile) -> io::Result<()> {
    let config = reference_config(profile);
    let mut options = RunOptions::new(config, profile);
    options.echo = false;
    session::run(&options)?;

    let report = replay::replay(&options.output, config)?;
    eprintln!(
        "capture: {} -> {} ({} rows, {} transitions, {} replay mismatches)",
        profile,
        options.output.display(),
        report.rows,
        report.transitions.len(),
        report.mismatches.len(),
    );
    Ok(())
}
