//! Measurement sequencer driving the Chem ID cycle one sample at a time.
//!
//! [`Sequencer::tick`] is the only place the phase changes. Each call checks
//! the exit guard of the phase active at the start of the tick, performs at
//! most one transition (switching the charger if the entered phase asks for
//! it), applies the phase's current sign policy and returns exactly one
//! [`Record`]. Time is supplied by the caller, so the whole cycle can be
//! exercised against a simulated clock.

use core::fmt;
use core::time::Duration;

use crate::charger::{ChargerAction, ChargerControl};
use crate::clock::MonotonicInstant;
use crate::config::{ConfigError, MeasurementConfig};
use crate::procedure::{CurrentTransform, Phase, PhasePolicy};
use crate::record::Record;
use crate::telemetry::Reading;

/// Error detail reported by the sequencer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequenceError {
    /// The session already reached [`Phase::Done`]; no further ticks are accepted.
    Finished,
}

impl fmt::Display for SequenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceError::Finished => f.write_str("measurement session already finished"),
        }
    }
}

/// A phase change performed by a tick.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
    /// Charger action issued as part of the transition.
    pub charger: Option<ChargerAction>,
}

impl Transition {
    /// Human-readable description carried in the record comment.
    #[must_use]
    pub fn comment(&self) -> &'static str {
        self.to.policy().entry_comment
    }
}

/// Mutable state of one measurement session.
///
/// `session_elapsed` never decreases. `phase_elapsed` never decreases within a
/// phase and is reset to zero exactly when a transition happens.
#[derive(Copy, Clone, Debug)]
pub struct Session<I> {
    phase: Phase,
    started_at: Option<I>,
    phase_entered_at: Option<I>,
    session_elapsed: Duration,
    phase_elapsed: Duration,
    ticks: u32,
}

impl<I> Session<I>
where
    I: MonotonicInstant,
{
    /// Creates a session in [`Phase::Init`].
    pub const fn new() -> Self {
        Self {
            phase: Phase::Init,
            started_at: None,
            phase_entered_at: None,
            session_elapsed: Duration::ZERO,
            phase_elapsed: Duration::ZERO,
            ticks: 0,
        }
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Time since the first tick of the session.
    pub const fn session_elapsed(&self) -> Duration {
        self.session_elapsed
    }

    /// Dwell time in the current phase.
    pub const fn phase_elapsed(&self) -> Duration {
        self.phase_elapsed
    }

    /// Number of ticks processed so far.
    pub const fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Instant of the first tick, once the session has started.
    pub const fn started_at(&self) -> Option<I> {
        self.started_at
    }

    pub const fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    fn observe(&mut self, now: I) {
        let started = *self.started_at.get_or_insert(now);
        let entered = *self.phase_entered_at.get_or_insert(now);

        // A clock that steps backwards must not rewind either counter.
        self.session_elapsed = self
            .session_elapsed
            .max(now.saturating_duration_since(started));
        self.phase_elapsed = self
            .phase_elapsed
            .max(now.saturating_duration_since(entered));
    }

    fn enter(&mut self, phase: Phase, now: I) {
        self.phase = phase;
        self.phase_entered_at = Some(now);
        self.phase_elapsed = Duration::ZERO;
    }
}

impl<I> Default for Session<I>
where
    I: MonotonicInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the configuration and session of one measurement run.
#[derive(Clone, Debug)]
pub struct Sequencer<I> {
    config: MeasurementConfig,
    session: Session<I>,
}

impl<I> Sequencer<I>
where
    I: MonotonicInstant,
{
    /// Creates a sequencer for a validated configuration.
    pub fn new(config: MeasurementConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            session: Session::new(),
        })
    }

    pub const fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    pub const fn session(&self) -> &Session<I> {
        &self.session
    }

    pub const fn phase(&self) -> Phase {
        self.session.phase
    }

    pub const fn is_finished(&self) -> bool {
        self.session.is_finished()
    }

    /// Advances the session with a fresh reading taken at `now`.
    ///
    /// Returns [`SequenceError::Finished`] without touching the charger once
    /// the session has reached [`Phase::Done`].
    pub fn tick<C>(
        &mut self,
        charger: &mut C,
        now: I,
        reading: Reading,
    ) -> Result<Record, SequenceError>
    where
        C: ChargerControl + ?Sized,
    {
        let from = self.session.phase;
        if from.is_terminal() {
            return Err(SequenceError::Finished);
        }

        self.session.observe(now);
        self.session.ticks = self.session.ticks.saturating_add(1);

        let from_policy = from.policy();
        let transition = if from_policy.exit.is_satisfied(
            &self.config,
            &reading,
            self.session.phase_elapsed,
        ) {
            let to = from.next().ok_or(SequenceError::Finished)?;
            let charger_action = to.policy().on_enter;
            if let Some(action) = charger_action {
                charger.apply(action);
            }
            self.session.enter(to, now);
            Some(Transition {
                from,
                to,
                charger: charger_action,
            })
        } else {
            None
        };

        let to_policy = self.session.phase.policy();
        let current_ma = reporting_transform(from_policy, to_policy).apply(reading.current_ma);

        Ok(Record {
            elapsed_s: elapsed_seconds(self.session.session_elapsed),
            voltage_mv: reading.voltage_mv,
            current_ma,
            temperature_c: reading.temperature_c,
            state_of_charge_pct: reading.state_of_charge_pct,
            comment: transition.as_ref().map_or("", Transition::comment),
            phase: self.session.phase,
            transition,
        })
    }
}

/// Sign policy for a tick that started in `from` and ended in `to`.
///
/// The tick that enters a phase and the tick that leaves it both report under
/// that phase's policy.
fn reporting_transform(from: &PhasePolicy, to: &PhasePolicy) -> CurrentTransform {
    match from.current {
        CurrentTransform::Identity => to.current,
        transform @ CurrentTransform::Negate => transform,
    }
}

fn elapsed_seconds(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
}
