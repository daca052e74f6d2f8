//! bq34z100 fuel gauge driver.
//!
//! Only the four standard telemetry commands are used. Each command is a
//! little-endian 16-bit word read at a fixed register offset.

use chemid_core::telemetry::TelemetrySource;

/// 7-bit I2C address of the gauge.
pub const GAUGE_ADDRESS: u8 = 0x55;

/// Standard command offsets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum GaugeRegister {
    StateOfCharge = 0x02,
    Voltage = 0x08,
    AverageCurrent = 0x0A,
    Temperature = 0x0C,
}

/// Word-oriented register access onto the gauge.
pub trait RegisterBus {
    type Error;

    fn read_word(&mut self, register: GaugeRegister) -> Result<u16, Self::Error>;
}

/// Gauge driver exposing the telemetry reads the sequencer consumes.
pub struct Bq34z100<B> {
    bus: B,
}

impl<B: RegisterBus> Bq34z100<B> {
    pub const fn new(bus: B) -> Self {
        Self { bus }
    }
}

/// Converts the gauge temperature (0.1 K units) to degrees Celsius.
pub fn decikelvin_to_celsius(raw: u16) -> f64 {
    f64::from(raw) / 10.0 - 273.15
}

/// Current magnitude from the signed average-current word.
pub fn current_magnitude_ma(raw: u16) -> i32 {
    i32::from(i16::from_le_bytes(raw.to_le_bytes())).abs()
}

impl<B: RegisterBus> TelemetrySource for Bq34z100<B> {
    type Error = B::Error;

    fn read_voltage_mv(&mut self) -> Result<u16, Self::Error> {
        self.bus.read_word(GaugeRegister::Voltage)
    }

    fn read_current_ma(&mut self) -> Result<i32, Self::Error> {
        self.bus
            .read_word(GaugeRegister::AverageCurrent)
            .map(current_magnitude_ma)
    }

    fn read_temperature_c(&mut self) -> Result<f64, Self::Error> {
        self.bus
            .read_word(GaugeRegister::Temperature)
            .map(decikelvin_to_celsius)
    }

    fn read_state_of_charge_pct(&mut self) -> Result<u8, Self::Error> {
        let raw = self.bus.read_word(GaugeRegister::StateOfCharge)?;
        let [percent, _] = raw.to_le_bytes();
        Ok(percent.min(100))
    }
}

/// Blocking I2C transport for the gauge.
#[cfg(target_os = "none")]
pub struct I2cGaugeBus {
    i2c: embassy_stm32::i2c::I2c<'static, embassy_stm32::mode::Blocking>,
}

#[cfg(target_os = "none")]
impl I2cGaugeBus {
    pub fn new(i2c: embassy_stm32::i2c::I2c<'static, embassy_stm32::mode::Blocking>) -> Self {
        Self { i2c }
    }
}

#[cfg(target_os = "none")]
impl RegisterBus for I2cGaugeBus {
    type Error = embassy_stm32::i2c::Error;

    fn read_word(&mut self, register: GaugeRegister) -> Result<u16, Self::Error> {
        let mut buffer = [0u8; 2];
        self.i2c
            .blocking_write_read(GAUGE_ADDRESS, &[register as u8], &mut buffer)?;
        Ok(u16::from_le_bytes(buffer))
    }
}
