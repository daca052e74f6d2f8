#![allow(dead_code, clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use chemid_core::charger::{ChargeStatus, ChargerAction, ChargerControl};
use chemid_core::record::{Record, format_record};
use chemid_core::sampling::RecordSink;
use chemid_core::telemetry::{Reading, TelemetrySource};

/// Transport failure injected by [`ScriptedGauge`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GaugeFault;

/// Gauge replaying a fixed script; the last entry repeats once the script runs out.
pub struct ScriptedGauge {
    script: VecDeque<Result<Reading, GaugeFault>>,
    last: Reading,
    pending: Option<Reading>,
}

impl ScriptedGauge {
    pub fn new(script: impl IntoIterator<Item = Result<Reading, GaugeFault>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: Reading::new(0, 0, 0.0, 0),
            pending: None,
        }
    }

    pub fn readings(readings: impl IntoIterator<Item = Reading>) -> Self {
        Self::new(readings.into_iter().map(Ok))
    }

    fn next(&mut self) -> Result<Reading, GaugeFault> {
        match self.script.pop_front() {
            Some(Ok(reading)) => {
                self.last = reading;
                Ok(reading)
            }
            Some(Err(fault)) => Err(fault),
            None => Ok(self.last),
        }
    }
}

impl TelemetrySource for ScriptedGauge {
    type Error = GaugeFault;

    fn read_voltage_mv(&mut self) -> Result<u16, Self::Error> {
        let reading = self.next()?;
        self.pending = Some(reading);
        Ok(reading.voltage_mv)
    }

    fn read_current_ma(&mut self) -> Result<i32, Self::Error> {
        Ok(self.pending.unwrap_or(self.last).current_ma)
    }

    fn read_temperature_c(&mut self) -> Result<f64, Self::Error> {
        Ok(self.pending.unwrap_or(self.last).temperature_c)
    }

    fn read_state_of_charge_pct(&mut self) -> Result<u8, Self::Error> {
        Ok(self.pending.take().unwrap_or(self.last).state_of_charge_pct)
    }
}

/// Charger double recording every requested action.
#[derive(Clone, Debug, Default)]
pub struct RecordingCharger {
    pub actions: Vec<ChargerAction>,
    pub active: bool,
}

impl RecordingCharger {
    pub fn count(&self, action: ChargerAction) -> usize {
        self.actions.iter().filter(|seen| **seen == action).count()
    }
}

impl ChargerControl for RecordingCharger {
    fn activate(&mut self) {
        self.actions.push(ChargerAction::Activate);
        self.active = true;
    }

    fn deactivate(&mut self) {
        self.actions.push(ChargerAction::Deactivate);
        self.active = false;
    }

    fn status(&mut self) -> Option<ChargeStatus> {
        Some(if self.active {
            ChargeStatus::Charging
        } else {
            ChargeStatus::NotCharging
        })
    }
}

/// Sink capturing both the record values and their formatted lines.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub lines: Vec<String>,
    pub records: Vec<Record>,
    pub headers: usize,
}

impl RecordSink for MemorySink {
    type Error = ();

    fn write_header(&mut self) -> Result<(), Self::Error> {
        self.headers += 1;
        self.lines
            .push(chemid_core::record::RECORD_HEADER.to_string());
        Ok(())
    }

    fn write_record(&mut self, record: &Record) -> Result<(), Self::Error> {
        let line = format_record(record).map_err(|_| ())?;
        self.lines.push(line.as_str().to_string());
        self.records.push(*record);
        Ok(())
    }
}

/// Pack state shared between [`PackGauge`] and [`PackCharger`].
#[derive(Debug)]
pub struct PackState {
    pub charge_mah: f64,
    pub capacity_mah: f64,
    pub cells: u8,
    pub charging: bool,
    /// Load switched on by the operator once the discharge instruction appears.
    pub load_connected: bool,
    pub step: std::time::Duration,
}

impl PackState {
    pub fn shared(capacity_mah: f64, cells: u8, step: std::time::Duration) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            charge_mah: capacity_mah * 0.3,
            capacity_mah,
            cells,
            charging: false,
            load_connected: false,
            step,
        }))
    }

    fn soc(&self) -> f64 {
        (self.charge_mah / self.capacity_mah).clamp(0.0, 1.0)
    }

    fn current_ma(&self) -> f64 {
        let c10 = self.capacity_mah / 10.0;
        if self.charging {
            // Constant current until 80 %, then a linear taper to zero.
            let soc = self.soc();
            if soc < 0.8 {
                self.capacity_mah / 2.0
            } else {
                (self.capacity_mah / 2.0) * (1.0 - soc) / 0.2
            }
        } else if self.load_connected {
            c10
        } else {
            0.0
        }
    }

    fn voltage_mv(&self) -> f64 {
        let per_cell = 2_950.0 + 1_250.0 * self.soc();
        per_cell * f64::from(self.cells)
    }

    fn advance(&mut self) {
        let hours = self.step.as_secs_f64() / 3_600.0;
        let current = self.current_ma();
        if self.charging {
            self.charge_mah += current * hours;
        } else if self.load_connected {
            self.charge_mah -= current * hours;
        }
        self.charge_mah = self.charge_mah.clamp(0.0, self.capacity_mah);
    }
}

/// Gauge view of a [`PackState`]; each acquisition advances the model by one step.
pub struct PackGauge(pub Rc<RefCell<PackState>>);

impl TelemetrySource for PackGauge {
    type Error = GaugeFault;

    fn read_voltage_mv(&mut self) -> Result<u16, Self::Error> {
        let mut pack = self.0.borrow_mut();
        pack.advance();
        Ok(pack.voltage_mv() as u16)
    }

    fn read_current_ma(&mut self) -> Result<i32, Self::Error> {
        Ok(self.0.borrow().current_ma() as i32)
    }

    fn read_temperature_c(&mut self) -> Result<f64, Self::Error> {
        Ok(22.5)
    }

    fn read_state_of_charge_pct(&mut self) -> Result<u8, Self::Error> {
        Ok((self.0.borrow().soc() * 100.0) as u8)
    }
}

/// Charger wired to a [`PackState`].
pub struct PackCharger {
    pub pack: Rc<RefCell<PackState>>,
    pub actions: Vec<ChargerAction>,
}

impl ChargerControl for PackCharger {
    fn activate(&mut self) {
        self.actions.push(ChargerAction::Activate);
        self.pack.borrow_mut().charging = true;
    }

    fn deactivate(&mut self) {
        self.actions.push(ChargerAction::Deactivate);
        self.pack.borrow_mut().charging = false;
    }
}
