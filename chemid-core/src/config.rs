//! Pack parameters and timing for a measurement session.
//!
//! Every threshold the sequencer compares against is derived from a
//! [`MeasurementConfig`], so firmware builds and emulator runs can describe a
//! different pack without touching the transition logic.

use core::fmt;
use core::time::Duration;

/// Cadence between telemetry samples.
pub const DEFAULT_SAMPLING_PERIOD: Duration = Duration::from_secs(5);
/// Rest after the charge phase so the pack reaches open-circuit voltage.
pub const DEFAULT_RELAX_AFTER_CHARGE: Duration = Duration::from_secs(2 * 60 * 60);
/// Rest after the discharge phase so the pack reaches open-circuit voltage.
pub const DEFAULT_RELAX_AFTER_DISCHARGE: Duration = Duration::from_secs(5 * 60 * 60);
/// Consecutive telemetry failures tolerated before the session aborts.
pub const DEFAULT_READ_RETRY_BUDGET: u8 = 2;
/// Delay before retrying a failed telemetry acquisition.
pub const DEFAULT_READ_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Divisor applied to the design capacity to obtain the charge taper current (C/10).
pub const CHARGE_TAPER_DIVISOR: u32 = 10;

/// Parameters describing the pack under test and the procedure timing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MeasurementConfig {
    /// Rated pack capacity in mAh.
    pub design_capacity_mah: u32,
    /// Per-cell voltage considered fully discharged.
    pub zero_charge_mv_per_cell: u16,
    /// Number of series cells in the pack.
    pub cell_count: u8,
    pub sampling_period: Duration,
    pub relax_after_charge: Duration,
    pub relax_after_discharge: Duration,
    pub read_retry_budget: u8,
    pub read_retry_backoff: Duration,
}

impl MeasurementConfig {
    /// Creates a configuration for the given pack using the default timings.
    #[must_use]
    pub const fn new(design_capacity_mah: u32, zero_charge_mv_per_cell: u16, cell_count: u8) -> Self {
        Self {
            design_capacity_mah,
            zero_charge_mv_per_cell,
            cell_count,
            sampling_period: DEFAULT_SAMPLING_PERIOD,
            relax_after_charge: DEFAULT_RELAX_AFTER_CHARGE,
            relax_after_discharge: DEFAULT_RELAX_AFTER_DISCHARGE,
            read_retry_budget: DEFAULT_READ_RETRY_BUDGET,
            read_retry_backoff: DEFAULT_READ_RETRY_BACKOFF,
        }
    }

    #[must_use]
    pub const fn with_sampling_period(mut self, period: Duration) -> Self {
        self.sampling_period = period;
        self
    }

    #[must_use]
    pub const fn with_relax_durations(mut self, after_charge: Duration, after_discharge: Duration) -> Self {
        self.relax_after_charge = after_charge;
        self.relax_after_discharge = after_discharge;
        self
    }

    #[must_use]
    pub const fn with_read_retry(mut self, budget: u8, backoff: Duration) -> Self {
        self.read_retry_budget = budget;
        self.read_retry_backoff = backoff;
        self
    }

    /// Charge current below which the pack is considered full (C/10, integer division).
    #[must_use]
    pub const fn charge_taper_threshold_ma(&self) -> i64 {
        (self.design_capacity_mah / CHARGE_TAPER_DIVISOR) as i64
    }

    /// Pack voltage below which the discharge phase ends.
    #[must_use]
    pub const fn termination_voltage_mv(&self) -> u32 {
        self.zero_charge_mv_per_cell as u32 * self.cell_count as u32
    }

    /// Checks that the configuration can drive a session to completion.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cell_count == 0 {
            return Err(ConfigError::ZeroCellCount);
        }
        if self.design_capacity_mah == 0 {
            return Err(ConfigError::ZeroDesignCapacity);
        }
        if self.zero_charge_mv_per_cell == 0 {
            return Err(ConfigError::ZeroTerminationVoltage);
        }
        if self.sampling_period.is_zero() {
            return Err(ConfigError::ZeroSamplingPeriod);
        }
        Ok(())
    }
}

/// Reasons a [`MeasurementConfig`] is rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    ZeroCellCount,
    ZeroDesignCapacity,
    ZeroTerminationVoltage,
    ZeroSamplingPeriod,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroCellCount => f.write_str("cell count must be non-zero"),
            ConfigError::ZeroDesignCapacity => f.write_str("design capacity must be non-zero"),
            ConfigError::ZeroTerminationVoltage => {
                f.write_str("per-cell termination voltage must be non-zero")
            }
            ConfigError::ZeroSamplingPeriod => f.write_str("sampling period must be non-zero"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_thresholds_follow_pack_parameters() {
        let config = MeasurementConfig::new(2_000, 3_000, 4);
        assert_eq!(config.charge_taper_threshold_ma(), 200);
        assert_eq!(config.termination_voltage_mv(), 12_000);
    }

    #[test]
    fn taper_threshold_truncates_like_integer_division() {
        let config = MeasurementConfig::new(2_009, 3_000, 1);
        assert_eq!(config.charge_taper_threshold_ma(), 200);
    }

    #[test]
    fn termination_voltage_does_not_overflow_u16() {
        let config = MeasurementConfig::new(1_000, u16::MAX, u8::MAX);
        assert_eq!(
            config.termination_voltage_mv(),
            u32::from(u16::MAX) * u32::from(u8::MAX)
        );
    }

    #[test]
    fn defaults_match_procedure_timing() {
        let config = MeasurementConfig::new(2_000, 3_000, 4);
        assert_eq!(config.sampling_period, Duration::from_secs(5));
        assert_eq!(config.relax_after_charge, Duration::from_secs(7_200));
        assert_eq!(config.relax_after_discharge, Duration::from_secs(18_000));
    }

    #[test]
    fn validate_rejects_degenerate_packs() {
        assert_eq!(
            MeasurementConfig::new(2_000, 3_000, 0).validate(),
            Err(ConfigError::ZeroCellCount)
        );
        assert_eq!(
            MeasurementConfig::new(0, 3_000, 4).validate(),
            Err(ConfigError::ZeroDesignCapacity)
        );
        assert_eq!(
            MeasurementConfig::new(2_000, 0, 4).validate(),
            Err(ConfigError::ZeroTerminationVoltage)
        );
        assert_eq!(
            MeasurementConfig::new(2_000, 3_000, 4)
                .with_sampling_period(Duration::ZERO)
                .validate(),
            Err(ConfigError::ZeroSamplingPeriod)
        );
        assert!(MeasurementConfig::new(2_000, 3_000, 4).validate().is_ok());
    }
}
