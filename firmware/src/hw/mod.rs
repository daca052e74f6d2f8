//! Board wiring for the charger lines and the fuel gauge.
//!
//! Level decisions come from the charger line catalog in `chemid-core`, so the
//! pin drivers here only translate between logic levels and GPIO handles.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

pub mod gauge;

use chemid_core::charger::{ChargeStatus, ChargerAction, ChargerLineId, charger_line};

/// Logic level (`true` == high) to drive on the enable line for an action.
pub const fn enable_level(action: ChargerAction) -> bool {
    charger_line(ChargerLineId::Enable).level_for(matches!(action, ChargerAction::Activate))
}

/// Level the enable line is driven to at power-up.
pub const fn enable_level_at_reset() -> bool {
    let line = charger_line(ChargerLineId::Enable);
    line.level_for(line.asserted_at_reset)
}

/// Interprets a sampled level on the status line.
pub const fn status_from_level(high: bool) -> ChargeStatus {
    if high == charger_line(ChargerLineId::Status).level_for(true) {
        ChargeStatus::Charging
    } else {
        ChargeStatus::NotCharging
    }
}

/// GPIO handles for the charger enable output and status input.
#[cfg(target_os = "none")]
pub struct ChargerPins {
    enable: embassy_stm32::gpio::Output<'static>,
    status: embassy_stm32::gpio::Input<'static>,
}

#[cfg(target_os = "none")]
impl ChargerPins {
    pub fn new(
        enable: embassy_stm32::gpio::Output<'static>,
        status: embassy_stm32::gpio::Input<'static>,
    ) -> Self {
        Self { enable, status }
    }

    fn drive(&mut self, action: ChargerAction) {
        if enable_level(action) {
            self.enable.set_high();
        } else {
            self.enable.set_low();
        }
    }
}

#[cfg(target_os = "none")]
impl chemid_core::charger::ChargerControl for ChargerPins {
    fn activate(&mut self) {
        self.drive(ChargerAction::Activate);
    }

    fn deactivate(&mut self) {
        self.drive(ChargerAction::Deactivate);
    }

    fn status(&mut self) -> Option<ChargeStatus> {
        Some(status_from_level(self.status.is_high()))
    }
}
