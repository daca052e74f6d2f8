#![no_std]

// Measurement logic for the Chem ID characterization cycle.
//
// The crate is shared by the STM32 firmware and the host emulator, so it stays
// free of the standard library and reaches hardware only through the traits in
// `charger` and `telemetry`.

pub mod charger;
pub mod clock;
pub mod config;
pub mod procedure;
pub mod record;
pub mod sampling;
pub mod sequencer;
pub mod telemetry;
