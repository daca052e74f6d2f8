use chemid_core::charger::ChargeStatus;
use chemid_core::sampling::{LoopError, SamplingLoop, StepOutcome};
use embassy_time::{Instant, Timer};

use crate::hw::ChargerPins;
use crate::hw::gauge::{Bq34z100, I2cGaugeBus};
use crate::measure::{FirmwareInstant, QueueRecordSink, core_duration_to_embassy};
use crate::status;
use crate::telemetry::{self, TransitionRecorder};

pub type FirmwareSampling = SamplingLoop<
    FirmwareInstant,
    Bq34z100<I2cGaugeBus>,
    ChargerPins,
    QueueRecordSink<'static>,
>;

type StepError = LoopError<embassy_stm32::i2c::Error, chemid_core::record::RecordOverflow>;

#[embassy_executor::task]
pub async fn run(mut sampling: FirmwareSampling, mut transitions: TransitionRecorder) -> ! {
    let config = *sampling.sequencer().config();
    telemetry::log_session_start(
        config.cell_count,
        config.design_capacity_mah,
        config.termination_voltage_mv(),
        config.charge_taper_threshold_ma(),
    );

    loop {
        let now = Instant::now();
        match sampling.step(FirmwareInstant::from(now)) {
            Ok(outcome) => {
                report(&outcome, now, &mut transitions);
                match outcome.wait() {
                    Some(delay) => Timer::after(core_duration_to_embassy(delay)).await,
                    None => {
                        let summary = sampling.summary();
                        telemetry::log_session_end(summary.final_phase, summary.records, "");
                        break;
                    }
                }
            }
            Err(err) => {
                let summary = sampling.summary();
                telemetry::log_session_end(summary.final_phase, summary.records, abort_reason(&err));
                break;
            }
        }
    }

    for entry in transitions.oldest_first() {
        defmt::info!(
            "history: #{} {} -> {} dwell={}s",
            entry.id,
            entry.from,
            entry.to,
            entry.dwell.map(|dwell| dwell.as_secs())
        );
    }
    defmt::info!("status: {}", status::snapshot());
    loop {
        core::future::pending::<()>().await;
    }
}

fn report(
    outcome: &StepOutcome<embassy_stm32::i2c::Error>,
    now: Instant,
    transitions: &mut TransitionRecorder,
) {
    match outcome {
        StepOutcome::Recorded {
            record,
            charger_status,
            ..
        } => {
            if let Some(transition) = record.transition {
                transitions.record(transition, record.elapsed_s, now);
            }
            if let Some(status) = charger_status {
                telemetry::log_charger_status(*status, record.elapsed_s);
                if *status == ChargeStatus::NotCharging {
                    defmt::warn!("charger: enabled but status line reports not charging");
                }
            }
        }
        StepOutcome::ReadFailed {
            error,
            consecutive,
            retry_after,
        } => {
            status::record_read_failure();
            let retry_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX);
            telemetry::log_read_failure(channel_label(error.channel), *consecutive, retry_ms);
        }
    }
}

fn abort_reason(err: &StepError) -> &'static str {
    match err {
        LoopError::Telemetry(_) => "gauge unavailable",
        LoopError::Sink(_) => "record line overflow",
        LoopError::Sequence(_) => "session already finished",
    }
}

const fn channel_label(channel: chemid_core::telemetry::TelemetryChannel) -> &'static str {
    use chemid_core::telemetry::TelemetryChannel;
    match channel {
        TelemetryChannel::Voltage => "voltage",
        TelemetryChannel::Current => "current",
        TelemetryChannel::Temperature => "temperature",
        TelemetryChannel::StateOfCharge => "state-of-charge",
    }
}
