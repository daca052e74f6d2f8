//! Phase catalog and the per-phase policy table for the Chem ID cycle.
//!
//! The cycle charges the pack until the current tapers below C/10, rests for
//! two hours, discharges at C/10 down to the termination voltage, and rests
//! for five hours. Each phase owns one exit guard, an optional charger action
//! taken on entry, and a transform applied to the current it reports. Keeping
//! those in [`PHASE_POLICIES`] rather than spreading them through the
//! sequencer lets every row be checked in isolation.

use core::fmt;
use core::time::Duration;

use crate::charger::ChargerAction;
use crate::config::MeasurementConfig;
use crate::telemetry::Reading;

/// Total number of [`Phase`] variants.
pub const PHASE_COUNT: usize = 6;

/// Ordered phases of the measurement cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Init,
    Charge,
    RelaxCharged,
    Discharge,
    RelaxDischarged,
    Done,
}

impl Phase {
    /// All phases in procedure order.
    pub const ALL: [Phase; PHASE_COUNT] = [
        Phase::Init,
        Phase::Charge,
        Phase::RelaxCharged,
        Phase::Discharge,
        Phase::RelaxDischarged,
        Phase::Done,
    ];

    /// Deterministic index for lookups into [`PHASE_POLICIES`].
    pub const fn as_index(self) -> usize {
        match self {
            Phase::Init => 0,
            Phase::Charge => 1,
            Phase::RelaxCharged => 2,
            Phase::Discharge => 3,
            Phase::RelaxDischarged => 4,
            Phase::Done => 5,
        }
    }

    /// Attempts to construct a [`Phase`] from a raw index.
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Phase::Init),
            1 => Some(Phase::Charge),
            2 => Some(Phase::RelaxCharged),
            3 => Some(Phase::Discharge),
            4 => Some(Phase::RelaxDischarged),
            5 => Some(Phase::Done),
            _ => None,
        }
    }

    /// The phase that follows this one, or `None` for [`Phase::Done`].
    pub const fn next(self) -> Option<Self> {
        match self {
            Phase::Init => Some(Phase::Charge),
            Phase::Charge => Some(Phase::RelaxCharged),
            Phase::RelaxCharged => Some(Phase::Discharge),
            Phase::Discharge => Some(Phase::RelaxDischarged),
            Phase::RelaxDischarged => Some(Phase::Done),
            Phase::Done => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Phase::Done)
    }

    /// Upper-case label used in record comments and logs.
    pub const fn label(self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::Charge => "CHARGE",
            Phase::RelaxCharged => "RELAX_CHARGED",
            Phase::Discharge => "DISCHARGE",
            Phase::RelaxDischarged => "RELAX_DISCHARGED",
            Phase::Done => "DONE",
        }
    }

    /// Policy row for this phase.
    #[must_use]
    pub fn policy(self) -> &'static PhasePolicy {
        &PHASE_POLICIES[self.as_index()]
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Condition that ends a phase, evaluated once per tick against the fresh reading.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExitGuard {
    /// Leaves on the first tick.
    Immediate,
    /// Current strictly below the C/10 taper threshold.
    CurrentBelowTaper,
    /// Pack voltage strictly below the termination voltage.
    VoltageBelowTermination,
    /// Dwell strictly longer than the post-charge rest.
    RestAfterChargeElapsed,
    /// Dwell strictly longer than the post-discharge rest.
    RestAfterDischargeElapsed,
    /// No exit; the phase is terminal.
    Never,
}

impl ExitGuard {
    /// Returns `true` when the guard fires for `reading` after `phase_elapsed` in the phase.
    #[must_use]
    pub fn is_satisfied(
        self,
        config: &MeasurementConfig,
        reading: &Reading,
        phase_elapsed: Duration,
    ) -> bool {
        match self {
            ExitGuard::Immediate => true,
            ExitGuard::CurrentBelowTaper => {
                i64::from(reading.current_ma) < config.charge_taper_threshold_ma()
            }
            ExitGuard::VoltageBelowTermination => {
                u32::from(reading.voltage_mv) < config.termination_voltage_mv()
            }
            ExitGuard::RestAfterChargeElapsed => phase_elapsed > config.relax_after_charge,
            ExitGuard::RestAfterDischargeElapsed => phase_elapsed > config.relax_after_discharge,
            ExitGuard::Never => false,
        }
    }
}

/// Sign policy applied to the gauge current while in a phase.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CurrentTransform {
    Identity,
    /// The gauge reports discharge current as a positive magnitude; the
    /// analysis tooling expects discharge to be negative.
    Negate,
}

impl CurrentTransform {
    #[must_use]
    pub const fn apply(self, current_ma: i32) -> i32 {
        match self {
            CurrentTransform::Identity => current_ma,
            CurrentTransform::Negate => current_ma.saturating_neg(),
        }
    }
}

/// Behavior attached to a single phase.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PhasePolicy {
    pub phase: Phase,
    pub exit: ExitGuard,
    /// Charger action performed on the tick that enters this phase.
    pub on_enter: Option<ChargerAction>,
    pub current: CurrentTransform,
    /// Record comment emitted on the tick that enters this phase.
    pub entry_comment: &'static str,
}

impl PhasePolicy {
    pub const fn new(
        phase: Phase,
        exit: ExitGuard,
        on_enter: Option<ChargerAction>,
        current: CurrentTransform,
        entry_comment: &'static str,
    ) -> Self {
        Self {
            phase,
            exit,
            on_enter,
            current,
            entry_comment,
        }
    }
}

/// Policy table indexed by [`Phase::as_index`].
pub static PHASE_POLICIES: [PhasePolicy; PHASE_COUNT] = [
    // Exists only to emit the first record and switch the charger on.
    PhasePolicy::new(
        Phase::Init,
        ExitGuard::Immediate,
        None,
        CurrentTransform::Identity,
        "",
    ),
    PhasePolicy::new(
        Phase::Charge,
        ExitGuard::CurrentBelowTaper,
        Some(ChargerAction::Activate),
        CurrentTransform::Identity,
        "Activating charger and entering CHARGE",
    ),
    PhasePolicy::new(
        Phase::RelaxCharged,
        ExitGuard::RestAfterChargeElapsed,
        Some(ChargerAction::Deactivate),
        CurrentTransform::Identity,
        "Deactivating charger and entering RELAX_CHARGED",
    ),
    PhasePolicy::new(
        Phase::Discharge,
        ExitGuard::VoltageBelowTermination,
        None,
        CurrentTransform::Negate,
        "Rest complete and entering DISCHARGE -- disconnect the charger and connect the C/10 load now",
    ),
    PhasePolicy::new(
        Phase::RelaxDischarged,
        ExitGuard::RestAfterDischargeElapsed,
        None,
        CurrentTransform::Identity,
        "Discharge complete and entering RELAX_DISCHARGED -- remove the C/10 load now",
    ),
    PhasePolicy::new(
        Phase::Done,
        ExitGuard::Never,
        None,
        CurrentTransform::Identity,
        "Measurement complete",
    ),
];
