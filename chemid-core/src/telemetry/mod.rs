//! Fuel-gauge telemetry consumed by the sequencer.
//!
//! A [`TelemetrySource`] exposes the four instantaneous measurements the
//! procedure needs. The sequencer treats one pass over all four as a single
//! logical [`Reading`]; the reads are not required to be atomic with respect
//! to each other.

use core::fmt;

/// One sampled observation of the pack.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    pub voltage_mv: u16,
    /// Current magnitude as reported by the gauge. The sequencer applies the
    /// phase-specific sign before emitting it.
    pub current_ma: i32,
    pub temperature_c: f64,
    pub state_of_charge_pct: u8,
}

impl Reading {
    #[must_use]
    pub const fn new(
        voltage_mv: u16,
        current_ma: i32,
        temperature_c: f64,
        state_of_charge_pct: u8,
    ) -> Self {
        Self {
            voltage_mv,
            current_ma,
            temperature_c,
            state_of_charge_pct,
        }
    }

    /// Returns a copy with the current replaced.
    #[must_use]
    pub const fn with_current(mut self, current_ma: i32) -> Self {
        self.current_ma = current_ma;
        self
    }
}

/// Measurement channels exposed by the gauge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryChannel {
    Voltage,
    Current,
    Temperature,
    StateOfCharge,
}

impl fmt::Display for TelemetryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryChannel::Voltage => f.write_str("voltage"),
            TelemetryChannel::Current => f.write_str("current"),
            TelemetryChannel::Temperature => f.write_str("temperature"),
            TelemetryChannel::StateOfCharge => f.write_str("state-of-charge"),
        }
    }
}

/// Failure to acquire a [`Reading`] from the gauge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TelemetryError<E> {
    pub channel: TelemetryChannel,
    pub source: E,
}

impl<E> TelemetryError<E> {
    pub const fn new(channel: TelemetryChannel, source: E) -> Self {
        Self { channel, source }
    }
}

impl<E: fmt::Debug> fmt::Display for TelemetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} read failed: {:?}", self.channel, self.source)
    }
}

/// Narrow read interface onto the fuel gauge.
pub trait TelemetrySource {
    /// Transport- or device-specific failure.
    type Error;

    fn read_voltage_mv(&mut self) -> Result<u16, Self::Error>;

    /// Current magnitude; always non-negative regardless of direction.
    fn read_current_ma(&mut self) -> Result<i32, Self::Error>;

    fn read_temperature_c(&mut self) -> Result<f64, Self::Error>;

    fn read_state_of_charge_pct(&mut self) -> Result<u8, Self::Error>;

    /// Takes all four measurements as one logical reading.
    fn acquire(&mut self) -> Result<Reading, TelemetryError<Self::Error>> {
        let voltage_mv = self
            .read_voltage_mv()
            .map_err(|err| TelemetryError::new(TelemetryChannel::Voltage, err))?;
        let current_ma = self
            .read_current_ma()
            .map_err(|err| TelemetryError::new(TelemetryChannel::Current, err))?;
        let temperature_c = self
            .read_temperature_c()
            .map_err(|err| TelemetryError::new(TelemetryChannel::Temperature, err))?;
        let state_of_charge_pct = self
            .read_state_of_charge_pct()
            .map_err(|err| TelemetryError::new(TelemetryChannel::StateOfCharge, err))?;

        Ok(Reading::new(
            voltage_mv,
            current_ma,
            temperature_c,
            state_of_charge_pct,
        ))
    }
}

impl<T> TelemetrySource for &mut T
where
    T: TelemetrySource + ?Sized,
{
    type Error = T::Error;

    fn read_voltage_mv(&mut self) -> Result<u16, Self::Error> {
        (**self).read_voltage_mv()
    }

    fn read_current_ma(&mut self) -> Result<i32, Self::Error> {
        (**self).read_current_ma()
    }

    fn read_temperature_c(&mut self) -> Result<f64, Self::Error> {
        (**self).read_temperature_c()
    }

    fn read_state_of_charge_pct(&mut self) -> Result<u8, Self::Error> {
        (**self).read_state_of_charge_pct()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGauge {
        fail_on: Option<TelemetryChannel>,
        reads: u8,
    }

    impl FixedGauge {
        fn check(&mut self, channel: TelemetryChannel) -> Result<(), &'static str> {
            self.reads += 1;
            if self.fail_on == Some(channel) {
                Err("nack")
            } else {
                Ok(())
            }
        }
    }

    impl TelemetrySource for FixedGauge {
        type Error = &'static str;

        fn read_voltage_mv(&mut self) -> Result<u16, Self::Error> {
            self.check(TelemetryChannel::Voltage).map(|()| 16_400)
        }

        fn read_current_ma(&mut self) -> Result<i32, Self::Error> {
            self.check(TelemetryChannel::Current).map(|()| 1_250)
        }

        fn read_temperature_c(&mut self) -> Result<f64, Self::Error> {
            self.check(TelemetryChannel::Temperature).map(|()| 24.5)
        }

        fn read_state_of_charge_pct(&mut self) -> Result<u8, Self::Error> {
            self.check(TelemetryChannel::StateOfCharge).map(|()| 87)
        }
    }

    #[test]
    fn acquire_collects_all_channels() {
        let mut gauge = FixedGauge {
            fail_on: None,
            reads: 0,
        };
        let reading = gauge.acquire().expect("reading");
        assert_eq!(reading, Reading::new(16_400, 1_250, 24.5, 87));
        assert_eq!(gauge.reads, 4);
    }

    #[test]
    fn acquire_reports_failing_channel_and_stops() {
        let mut gauge = FixedGauge {
            fail_on: Some(TelemetryChannel::Current),
            reads: 0,
        };
        let err = gauge.acquire().expect_err("current read should fail");
        assert_eq!(err.channel, TelemetryChannel::Current);
        assert_eq!(err.source, "nack");
        assert_eq!(gauge.reads, 2);
    }
}
