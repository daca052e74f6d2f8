use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use chemid_core::charger::{ChargeStatus, ChargerControl};
use chemid_core::config::MeasurementConfig;
use chemid_core::procedure::Phase;
use chemid_core::record::Record;
use chemid_core::telemetry::TelemetrySource;

/// Open-circuit voltage per cell against state of charge.
const OCV_CURVE: &[(f64, f64)] = &[
    (0.00, 2_500.0),
    (0.05, 3_300.0),
    (0.10, 3_450.0),
    (0.20, 3_550.0),
    (0.40, 3_650.0),
    (0.60, 3_800.0),
    (0.80, 3_950.0),
    (1.00, 4_200.0),
];

const CHARGE_VOLTAGE_PER_CELL_MV: f64 = 4_200.0;
const AMBIENT_C: f64 = 22.0;
const THERMAL_TIME_CONSTANT_S: f64 = 900.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PackProfile {
    Fresh,
    Aged,
    Cold,
    Flaky,
}

impl PackProfile {
    pub const ALL: [PackProfile; 4] = [
        PackProfile::Fresh,
        PackProfile::Aged,
        PackProfile::Cold,
        PackProfile::Flaky,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            PackProfile::Fresh => "fresh",
            PackProfile::Aged => "aged",
            PackProfile::Cold => "cold",
            PackProfile::Flaky => "flaky",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|profile| tag.eq_ignore_ascii_case(profile.tag()))
            .ok_or_else(|| format!("Unknown pack profile `{tag}`"))
    }

    /// Usable capacity as a fraction of the design capacity.
    fn capacity_fraction(self) -> f64 {
        match self {
            PackProfile::Aged => 0.78,
            PackProfile::Fresh | PackProfile::Cold | PackProfile::Flaky => 1.0,
        }
    }

    /// Internal resistance per cell in ohms.
    fn cell_resistance_ohm(self) -> f64 {
        match self {
            PackProfile::Fresh | PackProfile::Flaky => 0.06,
            PackProfile::Aged => 0.14,
            PackProfile::Cold => 0.11,
        }
    }

    fn ambient_c(self) -> f64 {
        match self {
            PackProfile::Cold => 8.0,
            PackProfile::Fresh | PackProfile::Aged | PackProfile::Flaky => AMBIENT_C,
        }
    }

    fn initial_soc(self) -> f64 {
        match self {
            PackProfile::Fresh | PackProfile::Flaky => 0.35,
            PackProfile::Aged => 0.5,
            PackProfile::Cold => 0.2,
        }
    }

    /// Every n-th gauge transaction times out.
    fn dropout_every(self) -> Option<u32> {
        match self {
            PackProfile::Flaky => Some(97),
            PackProfile::Fresh | PackProfile::Aged | PackProfile::Cold => None,
        }
    }
}

impl fmt::Display for PackProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Failure reported by the simulated gauge.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GaugeError {
    Timeout,
}

impl fmt::Display for GaugeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GaugeError::Timeout => f.write_str("gauge transaction timed out"),
        }
    }
}

#[derive(Debug)]
struct PackModel {
    profile: PackProfile,
    cells: u8,
    capacity_mah: f64,
    charge_mah: f64,
    temperature_c: f64,
    charger_enabled: bool,
    load_connected: bool,
    /// C/10 discharge load in mA.
    load_ma: f64,
    transactions: u32,
    last_update: Option<Duration>,
}

impl PackModel {
    fn soc(&self) -> f64 {
        (self.charge_mah / self.capacity_mah).clamp(0.0, 1.0)
    }

    fn ocv_per_cell_mv(&self) -> f64 {
        let soc = self.soc();
        OCV_CURVE
            .windows(2)
            .find(|pair| soc <= pair[1].0)
            .map_or(CHARGE_VOLTAGE_PER_CELL_MV, |pair| {
                let (soc_lo, mv_lo) = pair[0];
                let (soc_hi, mv_hi) = pair[1];
                mv_lo + (mv_hi - mv_lo) * (soc - soc_lo) / (soc_hi - soc_lo)
            })
    }

    /// Signed pack current in mA; positive while charging.
    fn current_ma(&self) -> f64 {
        if self.charger_enabled {
            let constant_current = self.capacity_mah / 2.0;
            let headroom = CHARGE_VOLTAGE_PER_CELL_MV - self.ocv_per_cell_mv();
            let constant_voltage = (headroom / self.profile.cell_resistance_ohm()).max(0.0);
            constant_current.min(constant_voltage)
        } else if self.load_connected && self.charge_mah > 0.0 {
            -self.load_ma
        } else {
            0.0
        }
    }

    fn terminal_mv(&self) -> f64 {
        let per_cell = self.ocv_per_cell_mv() + self.current_ma() * self.profile.cell_resistance_ohm();
        per_cell * f64::from(self.cells)
    }

    fn advance_to(&mut self, now: Duration) {
        let Some(previous) = self.last_update.replace(now) else {
            return;
        };
        let dt = now.saturating_sub(previous);
        let hours = dt.as_secs_f64() / 3_600.0;
        let current = self.current_ma();
        self.charge_mah = (self.charge_mah + current * hours).clamp(0.0, self.capacity_mah);

        let amps = current / 1_000.0;
        let target = self.profile.ambient_c()
            + amps * amps * self.profile.cell_resistance_ohm() * f64::from(self.cells) * 4.0;
        let blend = (dt.as_secs_f64() / THERMAL_TIME_CONSTANT_S).min(1.0);
        self.temperature_c += (target - self.temperature_c) * blend;
    }

    fn transaction(&mut self) -> Result<(), GaugeError> {
        self.transactions = self.transactions.wrapping_add(1);
        match self.profile.dropout_every() {
            Some(every) if self.transactions % every == 0 => Err(GaugeError::Timeout),
            _ => Ok(()),
        }
    }
}

/// Shared handle onto a simulated battery pack.
///
/// The gauge and charger views observe the same model; the session also
/// plays the operator, connecting the C/10 load when asked to.
#[derive(Clone, Debug)]
pub struct SimulatedPack {
    model: Rc<RefCell<PackModel>>,
}

impl SimulatedPack {
    pub fn new(profile: PackProfile, config: &MeasurementConfig) -> Self {
        let capacity_mah = f64::from(config.design_capacity_mah) * profile.capacity_fraction();
        let model = PackModel {
            profile,
            cells: config.cell_count,
            capacity_mah,
            charge_mah: capacity_mah * profile.initial_soc(),
            temperature_c: profile.ambient_c(),
            charger_enabled: false,
            load_connected: false,
            load_ma: f64::from(config.design_capacity_mah) / 10.0,
            transactions: 0,
            last_update: None,
        };
        Self {
            model: Rc::new(RefCell::new(model)),
        }
    }

    pub fn gauge(&self) -> PackGauge {
        PackGauge {
            model: Rc::clone(&self.model),
        }
    }

    pub fn charger(&self) -> PackCharger {
        PackCharger {
            model: Rc::clone(&self.model),
        }
    }

    /// Integrates the model up to `now` (time since session start).
    pub fn advance_to(&self, now: Duration) {
        self.model.borrow_mut().advance_to(now);
    }

    /// Applies the operator instruction carried by a transition record.
    pub fn follow_operator(&self, record: &Record) -> Option<&'static str> {
        let transition = record.transition?;
        let mut model = self.model.borrow_mut();
        match transition.to {
            Phase::Discharge => {
                model.load_connected = true;
                Some("operator: C/10 load connected")
            }
            Phase::RelaxDischarged => {
                model.load_connected = false;
                Some("operator: C/10 load removed")
            }
            _ => None,
        }
    }

    pub fn state_of_charge(&self) -> f64 {
        self.model.borrow().soc()
    }
}

/// Gauge view of a [`SimulatedPack`].
pub struct PackGauge {
    model: Rc<RefCell<PackModel>>,
}

impl TelemetrySource for PackGauge {
    type Error = GaugeError;

    fn read_voltage_mv(&mut self) -> Result<u16, Self::Error> {
        let mut model = self.model.borrow_mut();
        model.transaction()?;
        Ok(model.terminal_mv().clamp(0.0, f64::from(u16::MAX)).round() as u16)
    }

    fn read_current_ma(&mut self) -> Result<i32, Self::Error> {
        let mut model = self.model.borrow_mut();
        model.transaction()?;
        Ok(model.current_ma().abs().round() as i32)
    }

    fn read_temperature_c(&mut self) -> Result<f64, Self::Error> {
        let mut model = self.model.borrow_mut();
        model.transaction()?;
        Ok((model.temperature_c * 10.0).round() / 10.0)
    }

    fn read_state_of_charge_pct(&mut self) -> Result<u8, Self::Error> {
        let mut model = self.model.borrow_mut();
        model.transaction()?;
        Ok((model.soc() * 100.0).round() as u8)
    }
}

/// Charger view of a [`SimulatedPack`].
pub struct PackCharger {
    model: Rc<RefCell<PackModel>>,
}

impl ChargerControl for PackCharger {
    fn activate(&mut self) {
        self.model.borrow_mut().charger_enabled = true;
    }

    fn deactivate(&mut self) {
        self.model.borrow_mut().charger_enabled = false;
    }

    fn status(&mut self) -> Option<ChargeStatus> {
        let model = self.model.borrow();
        Some(if model.charger_enabled && model.current_ma() > 0.0 {
            ChargeStatus::Charging
        } else {
            ChargeStatus::NotCharging
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MeasurementConfig {
        MeasurementConfig::new(2_000, 3_000, 4)
    }

    #[test]
    fn profiles_round_trip_through_tags() {
        for profile in PackProfile::ALL {
            assert_eq!(PackProfile::from_tag(profile.tag()), Ok(profile));
        }
        assert!(PackProfile::from_tag("lead-acid").is_err());
    }

    #[test]
    fn gauge_reports_current_magnitude_while_discharging() {
        let pack = SimulatedPack::new(PackProfile::Fresh, &config());
        pack.model.borrow_mut().load_connected = true;
        let mut gauge = pack.gauge();
        assert_eq!(gauge.read_current_ma(), Ok(200));
    }

    #[test]
    fn charging_raises_state_of_charge() {
        let pack = SimulatedPack::new(PackProfile::Fresh, &config());
        pack.charger().activate();
        pack.advance_to(Duration::ZERO);
        pack.advance_to(Duration::from_secs(3_600));
        assert!(pack.state_of_charge() > 0.8);
    }

    #[test]
    fn charge_current_tapers_near_full() {
        let pack = SimulatedPack::new(PackProfile::Fresh, &config());
        pack.model.borrow_mut().charge_mah = 1_995.0;
        pack.charger().activate();
        let mut gauge = pack.gauge();
        let current = gauge.read_current_ma().expect("current");
        assert!(current < 200, "{current}");
    }

    #[test]
    fn flaky_profile_drops_transactions() {
        let pack = SimulatedPack::new(PackProfile::Flaky, &config());
        let mut gauge = pack.gauge();
        let failures = (0..200)
            .filter(|_| gauge.read_voltage_mv().is_err())
            .count();
        assert_eq!(failures, 2);
    }

    #[test]
    fn depleted_pack_falls_below_termination_under_load() {
        let pack = SimulatedPack::new(PackProfile::Fresh, &config());
        pack.model.borrow_mut().charge_mah = 10.0;
        pack.model.borrow_mut().load_connected = true;
        let mut gauge = pack.gauge();
        let voltage = gauge.read_voltage_mv().expect("voltage");
        assert!(u32::from(voltage) < config().termination_voltage_mv());
    }
}
