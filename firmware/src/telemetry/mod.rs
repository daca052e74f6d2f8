//! Transition history and logging helpers.
//!
//! Phase transitions are kept in a fixed-capacity ring with the instant they
//! occurred and the time spent in the phase being left. Every event is also
//! mirrored to defmt on the target and stdout on the host.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use chemid_core::charger::{ChargeStatus, ChargerAction};
use chemid_core::procedure::Phase;
use chemid_core::sequencer::Transition;
use embassy_time::{Duration, Instant};
use heapless::{HistoryBuf, OldestOrdered};

/// Total number of transitions retained in memory.
pub const TRANSITION_RING_CAPACITY: usize = 8;

pub type TransitionRing = HistoryBuf<TransitionEntry, TRANSITION_RING_CAPACITY>;

/// Transition stored in the ring buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionEntry {
    pub id: u16,
    pub timestamp: Instant,
    pub from: Phase,
    pub to: Phase,
    pub charger: Option<ChargerAction>,
    /// Time spent in `from`; `None` for the first transition.
    pub dwell: Option<Duration>,
}

/// Records phase transitions and mirrors them to the log.
pub struct TransitionRecorder {
    ring: TransitionRing,
    last_transition_at: Option<Instant>,
    next_id: u16,
}

impl TransitionRecorder {
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_transition_at: None,
            next_id: 0,
        }
    }

    /// Returns the recorded transitions in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TransitionEntry> {
        self.ring.oldest_ordered()
    }

    pub fn latest(&self) -> Option<&TransitionEntry> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Stores a transition and logs it with the dwell time of the phase left.
    pub fn record(&mut self, transition: Transition, elapsed_s: i64, timestamp: Instant) -> u16 {
        let dwell = self
            .last_transition_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_transition_at = Some(timestamp);

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.ring.write(TransitionEntry {
            id,
            timestamp,
            from: transition.from,
            to: transition.to,
            charger: transition.charger,
            dwell,
        });

        emit_transition(
            transition.from.label(),
            transition.to.label(),
            charger_label(transition.charger),
            elapsed_s,
            dwell.map(|value| value.as_secs()),
        );
        id
    }
}

impl Default for TransitionRecorder {
    fn default() -> Self {
        Self::new()
    }
}

const fn charger_label(action: Option<ChargerAction>) -> &'static str {
    match action {
        Some(ChargerAction::Activate) => "charger=on",
        Some(ChargerAction::Deactivate) => "charger=off",
        None => "",
    }
}

const fn status_label(status: ChargeStatus) -> &'static str {
    match status {
        ChargeStatus::Charging => "charging",
        ChargeStatus::NotCharging => "not-charging",
    }
}

pub fn log_session_start(cells: u8, capacity_mah: u32, termination_mv: u32, taper_ma: i64) {
    emit_session_start(cells, capacity_mah, termination_mv, taper_ma);
}

/// Logs the charger status sampled after activation.
pub fn log_charger_status(status: ChargeStatus, elapsed_s: i64) {
    emit_event("charger", status_label(status), elapsed_s);
}

pub fn log_read_failure(channel: &'static str, consecutive: u8, retry_after_ms: u64) {
    emit_read_failure(channel, consecutive, retry_after_ms);
}

pub fn log_dropped_line(elapsed_s: i64, total: u32) {
    emit_dropped_line(elapsed_s, total);
}

/// Logs the end of the session; `reason` is empty on normal completion.
pub fn log_session_end(phase: Phase, records: u32, reason: &'static str) {
    emit_session_end(phase.label(), records, reason);
}

pub fn log_host_link(attached: bool) {
    emit_event("usb", if attached { "attached" } else { "detached" }, 0);
}

#[cfg(target_os = "none")]
fn emit_transition(from: &str, to: &str, charger: &str, elapsed_s: i64, dwell_s: Option<u64>) {
    if let Some(dwell) = dwell_s {
        defmt::info!(
            "telemetry:phase {} -> {} {} t={}s dwell={}s",
            from,
            to,
            charger,
            elapsed_s,
            dwell
        );
    } else {
        defmt::info!(
            "telemetry:phase {} -> {} {} t={}s",
            from,
            to,
            charger,
            elapsed_s
        );
    }
}

#[cfg(not(target_os = "none"))]
fn emit_transition(from: &str, to: &str, charger: &str, elapsed_s: i64, dwell_s: Option<u64>) {
    if let Some(dwell) = dwell_s {
        println!("telemetry:phase {from} -> {to} {charger} t={elapsed_s}s dwell={dwell}s");
    } else {
        println!("telemetry:phase {from} -> {to} {charger} t={elapsed_s}s");
    }
}

#[cfg(target_os = "none")]
fn emit_session_start(cells: u8, capacity_mah: u32, termination_mv: u32, taper_ma: i64) {
    defmt::info!(
        "telemetry:session start cells={} capacity={}mAh termination<{}mV taper<{}mA",
        cells,
        capacity_mah,
        termination_mv,
        taper_ma
    );
}

#[cfg(not(target_os = "none"))]
fn emit_session_start(cells: u8, capacity_mah: u32, termination_mv: u32, taper_ma: i64) {
    println!(
        "telemetry:session start cells={cells} capacity={capacity_mah}mAh termination<{termination_mv}mV taper<{taper_ma}mA"
    );
}

#[cfg(target_os = "none")]
fn emit_session_end(phase: &str, records: u32, reason: &str) {
    if reason.is_empty() {
        defmt::info!("telemetry:session end phase={} records={}", phase, records);
    } else {
        defmt::error!(
            "telemetry:session abort phase={} records={} reason={}",
            phase,
            records,
            reason
        );
    }
}

#[cfg(not(target_os = "none"))]
fn emit_session_end(phase: &str, records: u32, reason: &str) {
    if reason.is_empty() {
        println!("telemetry:session end phase={phase} records={records}");
    } else {
        println!("telemetry:session abort phase={phase} records={records} reason={reason}");
    }
}

#[cfg(target_os = "none")]
fn emit_read_failure(channel: &str, consecutive: u8, retry_after_ms: u64) {
    defmt::warn!(
        "telemetry:gauge {} read failed attempt={} retry={}ms",
        channel,
        consecutive,
        retry_after_ms
    );
}

#[cfg(not(target_os = "none"))]
fn emit_read_failure(channel: &str, consecutive: u8, retry_after_ms: u64) {
    println!("telemetry:gauge {channel} read failed attempt={consecutive} retry={retry_after_ms}ms");
}

#[cfg(target_os = "none")]
fn emit_dropped_line(elapsed_s: i64, total: u32) {
    defmt::warn!("telemetry:usb dropped record t={}s total={}", elapsed_s, total);
}

#[cfg(not(target_os = "none"))]
fn emit_dropped_line(elapsed_s: i64, total: u32) {
    println!("telemetry:usb dropped record t={elapsed_s}s total={total}");
}

#[cfg(target_os = "none")]
fn emit_event(subsystem: &str, event: &str, elapsed_s: i64) {
    defmt::info!("telemetry:{} {} t={}s", subsystem, event, elapsed_s);
}

#[cfg(not(target_os = "none"))]
fn emit_event(subsystem: &str, event: &str, elapsed_s: i64) {
    println!("telemetry:{subsystem} {event} t={elapsed_s}s");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(value: u64) -> Instant {
        Instant::from_secs(value)
    }

    fn transition(from: Phase, to: Phase, charger: Option<ChargerAction>) -> Transition {
        Transition { from, to, charger }
    }

    #[test]
    fn records_dwell_between_transitions() {
        let mut recorder = TransitionRecorder::new();

        let first = recorder.record(
            transition(Phase::Init, Phase::Charge, Some(ChargerAction::Activate)),
            0,
            secs(1),
        );
        assert_eq!(first, 0);
        assert_eq!(recorder.latest().map(|entry| entry.dwell), Some(None));

        let second = recorder.record(
            transition(
                Phase::Charge,
                Phase::RelaxCharged,
                Some(ChargerAction::Deactivate),
            ),
            3_600,
            secs(3_601),
        );
        assert_eq!(second, 1);

        let latest = recorder.latest().copied().expect("entry");
        assert_eq!(latest.dwell, Some(Duration::from_secs(3_600)));
        assert_eq!(latest.to, Phase::RelaxCharged);
    }

    #[test]
    fn ring_keeps_most_recent_entries() {
        let mut recorder = TransitionRecorder::new();
        for step in 0..10_u32 {
            recorder.record(
                transition(Phase::Charge, Phase::RelaxCharged, None),
                i64::from(step),
                secs(u64::from(step)),
            );
        }

        assert_eq!(recorder.len(), TRANSITION_RING_CAPACITY);
        let ids: heapless::Vec<u16, TRANSITION_RING_CAPACITY> =
            recorder.oldest_first().map(|entry| entry.id).collect();
        assert_eq!(ids.first(), Some(&2));
        assert_eq!(ids.last(), Some(&9));
    }
}
