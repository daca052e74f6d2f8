use chemid_core::sampling::SamplingLoop;
use chemid_core::sequencer::Sequencer;
use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::i2c::I2c;
use static_cell::StaticCell;

use crate::hw::gauge::{Bq34z100, I2cGaugeBus};
use crate::hw::{self, ChargerPins};
use crate::measure::{PACK_CONFIG, QueueRecordSink, RecordQueue};
use crate::telemetry::TransitionRecorder;
use crate::usb;

mod measure_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) static RECORD_QUEUE: RecordQueue = RecordQueue::new();
pub(super) static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA6,
        PA7,
        PB8,
        PB9,
        I2C1,
        USB,
        PA11,
        PA12,
        ..
    } = hal::init(config);

    let reset_level = if hw::enable_level_at_reset() {
        Level::High
    } else {
        Level::Low
    };
    let charger = ChargerPins::new(
        Output::new(PA6, reset_level, Speed::Low),
        Input::new(PA7, Pull::Up),
    );

    let i2c = I2c::new_blocking(I2C1, PB8, PB9, Default::default());
    let gauge = Bq34z100::new(I2cGaugeBus::new(i2c));

    let sequencer = Sequencer::new(PACK_CONFIG).expect("pack configuration rejected");
    let sampling = SamplingLoop::new(
        sequencer,
        gauge,
        charger,
        QueueRecordSink::new(RECORD_QUEUE.sender()),
    );

    spawner
        .spawn(measure_task::run(sampling, TransitionRecorder::new()))
        .expect("failed to spawn measurement task");

    spawner
        .spawn(usb_task::run(USB, PA12, PA11))
        .expect("failed to spawn USB task");

    core::future::pending::<()>().await;
}
