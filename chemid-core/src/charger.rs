//! Charger control surface and line catalog.
//!
//! The sequencer only ever asks for the charger to be switched on or off; the
//! concrete GPIO wiring lives behind [`ChargerControl`] so the emulator and the
//! tests can substitute deterministic doubles.

use core::fmt;

/// Actuation the sequencer requests when entering a phase.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargerAction {
    Activate,
    Deactivate,
}

impl fmt::Display for ChargerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargerAction::Activate => f.write_str("activate"),
            ChargerAction::Deactivate => f.write_str("deactivate"),
        }
    }
}

/// Level reported on the charger status line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargeStatus {
    Charging,
    NotCharging,
}

/// Abstraction over the charger enable line.
///
/// Both calls are idempotent and fire-and-forget: the sequencer never
/// observes a result.
pub trait ChargerControl {
    /// Releases the charger from shutdown.
    fn activate(&mut self);

    /// Holds the charger in shutdown.
    fn deactivate(&mut self);

    /// Samples the charger status line, when the hardware exposes one.
    fn status(&mut self) -> Option<ChargeStatus> {
        None
    }

    /// Applies a requested action.
    fn apply(&mut self, action: ChargerAction) {
        match action {
            ChargerAction::Activate => self.activate(),
            ChargerAction::Deactivate => self.deactivate(),
        }
    }
}

impl<T> ChargerControl for &mut T
where
    T: ChargerControl + ?Sized,
{
    fn activate(&mut self) {
        (**self).activate();
    }

    fn deactivate(&mut self) {
        (**self).deactivate();
    }

    fn status(&mut self) -> Option<ChargeStatus> {
        (**self).status()
    }
}

/// Charger driver that performs no hardware interaction.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopCharger;

impl NoopCharger {
    /// Creates a new no-op charger.
    pub const fn new() -> Self {
        Self
    }
}

impl ChargerControl for NoopCharger {
    fn activate(&mut self) {}

    fn deactivate(&mut self) {}
}

/// Electrical polarity of a charger control or status line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinePolarity {
    ActiveLow,
    ActiveHigh,
}

impl LinePolarity {
    /// Logic level that represents the asserted state on this line.
    #[must_use]
    pub const fn asserted_level_high(self) -> bool {
        matches!(self, LinePolarity::ActiveHigh)
    }
}

/// Identifier for the charger lines wired to the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargerLineId {
    /// Shutdown input of the charger IC; asserted means charging enabled.
    Enable,
    /// Charge-status output of the charger IC.
    Status,
}

/// Metadata describing how a charger line is routed on the board.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChargerLine {
    pub id: ChargerLineId,
    pub name: &'static str,
    pub mcu_pin: &'static str,
    pub polarity: LinePolarity,
    /// Whether the line is asserted at power-up.
    pub asserted_at_reset: bool,
}

impl ChargerLine {
    pub const fn new(
        id: ChargerLineId,
        name: &'static str,
        mcu_pin: &'static str,
        polarity: LinePolarity,
        asserted_at_reset: bool,
    ) -> Self {
        Self {
            id,
            name,
            mcu_pin,
            polarity,
            asserted_at_reset,
        }
    }

    /// Logic level to drive (or expect) for the requested asserted state.
    #[must_use]
    pub const fn level_for(&self, asserted: bool) -> bool {
        asserted == self.polarity.asserted_level_high()
    }
}

/// Compile-time catalog of the charger lines.
///
/// The charger is held in shutdown until the first phase transition asks for
/// it, so the enable line is released at reset.
pub const CHARGER_LINES: [ChargerLine; 2] = [
    ChargerLine::new(
        ChargerLineId::Enable,
        "CHG_EN*",
        "PA6",
        LinePolarity::ActiveLow,
        false,
    ),
    ChargerLine::new(
        ChargerLineId::Status,
        "CHG_STAT*",
        "PA7",
        LinePolarity::ActiveLow,
        false,
    ),
];

/// Retrieve charger line metadata by identifier.
pub const fn charger_line(id: ChargerLineId) -> ChargerLine {
    match id {
        ChargerLineId::Enable => CHARGER_LINES[0],
        ChargerLineId::Status => CHARGER_LINES[1],
    }
}
