use chemid_core::record::RECORD_HEADER;
use embassy_futures::join::join;
use embassy_futures::select::{Either, select};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_usb::driver::EndpointError;

use super::{RECORD_QUEUE, USB_STORAGE};
use crate::status;
use crate::telemetry;
use crate::usb::{self, LineDelivery, Outbox, RecordPort, UsbDeviceStrings};

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

#[embassy_executor::task]
pub async fn run(
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
) -> ! {
    let storage = USB_STORAGE.init(usb::UsbDeviceStorage::new());
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);

    let mut record_device = usb::UsbRecordDevice::new(driver, storage, UsbDeviceStrings::default());
    let port = record_device
        .take_port()
        .expect("record CDC interface unavailable");
    let mut device = record_device.device;

    join(device.run(), stream_records(port)).await;
    loop {
        core::future::pending::<()>().await;
    }
}

async fn stream_records<D>(mut port: RecordPort<D>) -> !
where
    D: embassy_usb::driver::Driver<'static>,
{
    let records = RECORD_QUEUE.receiver();
    let mut outbox = Outbox::new();

    loop {
        port.wait_ready().await;
        wait_for_dtr(&mut port).await;
        status::set_host_attached(true);
        telemetry::log_host_link(true);

        if port.write_line(RECORD_HEADER).await.is_ok() {
            loop {
                let line = match outbox.take_pending() {
                    Some(line) => line,
                    None => match select(records.receive(), port.control.control_changed()).await {
                        Either::First(line) => line,
                        Either::Second(()) => {
                            if port.dtr() {
                                continue;
                            }
                            break;
                        }
                    },
                };

                let delivery = match port.write_line(&line).await {
                    Ok(()) => LineDelivery::Delivered,
                    Err(EndpointError::Disabled) => LineDelivery::HostGone,
                    Err(EndpointError::BufferOverflow) => LineDelivery::Rejected,
                };
                outbox.settle(line, delivery);
                if delivery == LineDelivery::HostGone {
                    break;
                }
            }
        }

        status::set_host_attached(false);
        telemetry::log_host_link(false);
    }
}

async fn wait_for_dtr<D>(port: &mut RecordPort<D>)
where
    D: embassy_usb::driver::Driver<'static>,
{
    while !port.dtr() {
        port.control.control_changed().await;
    }
}
