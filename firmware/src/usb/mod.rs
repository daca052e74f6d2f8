//! Single-CDC USB device carrying the record stream to the host.
//!
//! The controller enumerates as one CDC ACM interface. Each record line is
//! framed with CRLF and written in max-packet-sized chunks; a host terminal
//! opening the port sees the header followed by every queued record.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use chemid_core::record::{MAX_RECORD_LINE, ParsedLine, RecordLine, parse_line};
use heapless::Vec;

use crate::status;
use crate::telemetry;

pub const MAX_PACKET_SIZE: u16 = 64;

/// Longest framed line: record text plus CRLF.
pub const MAX_FRAME_LEN: usize = MAX_RECORD_LINE + 2;

#[cfg(target_os = "none")]
const CONTROL_BUFFER_LEN: usize = 64;
#[cfg(target_os = "none")]
const CONFIG_DESCRIPTOR_LEN: usize = 128;
#[cfg(target_os = "none")]
const BOS_DESCRIPTOR_LEN: usize = 128;
#[cfg(target_os = "none")]
const MSOS_DESCRIPTOR_LEN: usize = 64;

/// User-visible strings advertised in the USB descriptors.
#[derive(Clone, Copy, Debug)]
pub struct UsbDeviceStrings {
    pub manufacturer: &'static str,
    pub product: &'static str,
    pub serial_number: Option<&'static str>,
}

impl Default for UsbDeviceStrings {
    fn default() -> Self {
        Self {
            manufacturer: "Chem ID Bench",
            product: "Battery Chem ID Logger",
            serial_number: None,
        }
    }
}

/// Frames one line for the wire by appending CRLF.
///
/// Returns `None` when the line does not fit a frame.
pub fn frame_line(line: &str) -> Option<Vec<u8, MAX_FRAME_LEN>> {
    let mut frame = Vec::new();
    frame.extend_from_slice(line.as_bytes()).ok()?;
    frame.extend_from_slice(b"\r\n").ok()?;
    Some(frame)
}

/// Splits a frame into chunks no larger than one bulk packet.
pub fn packets(frame: &[u8]) -> impl Iterator<Item = &[u8]> {
    frame.chunks(usize::from(MAX_PACKET_SIZE))
}

/// Whether a frame needs a trailing zero-length packet to terminate the transfer.
pub fn needs_zero_length_packet(frame: &[u8]) -> bool {
    !frame.is_empty() && frame.len() % usize::from(MAX_PACKET_SIZE) == 0
}

/// How a write of one record line ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineDelivery {
    Delivered,
    /// The host went away mid-write; the line can be written again later.
    HostGone,
    /// The endpoint refused the line; writing it again would fail the same way.
    Rejected,
}

/// Holds the record line being written to the host.
///
/// A line taken off the record queue either reaches the host, waits here
/// for the next connection, or is counted as dropped.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: Option<RecordLine>,
}

impl Outbox {
    pub const fn new() -> Self {
        Self { pending: None }
    }

    /// Line left over from an interrupted connection, written before new ones.
    pub fn take_pending(&mut self) -> Option<RecordLine> {
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Records how a write ended. Returns the dropped-line total when the
    /// line was discarded.
    pub fn settle(&mut self, line: RecordLine, delivery: LineDelivery) -> Option<u32> {
        match delivery {
            LineDelivery::Delivered => None,
            LineDelivery::HostGone => {
                self.pending = Some(line);
                None
            }
            LineDelivery::Rejected => {
                let dropped = status::record_dropped_line();
                telemetry::log_dropped_line(elapsed_of(&line), dropped);
                Some(dropped)
            }
        }
    }
}

fn elapsed_of(line: &str) -> i64 {
    match parse_line(line) {
        Ok(ParsedLine::Row(row)) => row.elapsed_s,
        _ => -1,
    }
}

/// Backing storage for the Embassy USB builder and the CDC ACM class.
#[cfg(target_os = "none")]
pub struct UsbDeviceStorage {
    control_buf: [u8; CONTROL_BUFFER_LEN],
    config_descriptor: [u8; CONFIG_DESCRIPTOR_LEN],
    bos_descriptor: [u8; BOS_DESCRIPTOR_LEN],
    msos_descriptor: [u8; MSOS_DESCRIPTOR_LEN],
    cdc_state: embassy_usb::class::cdc_acm::State<'static>,
}

#[cfg(target_os = "none")]
impl UsbDeviceStorage {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            control_buf: [0; CONTROL_BUFFER_LEN],
            config_descriptor: [0; CONFIG_DESCRIPTOR_LEN],
            bos_descriptor: [0; BOS_DESCRIPTOR_LEN],
            msos_descriptor: [0; MSOS_DESCRIPTOR_LEN],
            cdc_state: embassy_usb::class::cdc_acm::State::new(),
        }
    }
}

/// Split handles for the record port.
#[cfg(target_os = "none")]
pub struct RecordPort<D: embassy_usb::driver::Driver<'static>> {
    pub sender: embassy_usb::class::cdc_acm::Sender<'static, D>,
    pub receiver: embassy_usb::class::cdc_acm::Receiver<'static, D>,
    pub control: embassy_usb::class::cdc_acm::ControlChanged<'static>,
}

#[cfg(target_os = "none")]
impl<D> RecordPort<D>
where
    D: embassy_usb::driver::Driver<'static>,
{
    /// Waits until the host enables the IN endpoint.
    pub async fn wait_ready(&mut self) {
        self.sender.wait_connection().await;
    }

    /// Returns `true` when the host has asserted DTR.
    pub fn dtr(&self) -> bool {
        self.sender.dtr()
    }

    /// Writes one framed line, splitting it into bulk packets.
    pub async fn write_line(&mut self, line: &str) -> Result<(), embassy_usb::driver::EndpointError> {
        let Some(frame) = frame_line(line) else {
            return Err(embassy_usb::driver::EndpointError::BufferOverflow);
        };
        for packet in packets(&frame) {
            self.sender.write_packet(packet).await?;
        }
        if needs_zero_length_packet(&frame) {
            self.sender.write_packet(&[]).await?;
        }
        Ok(())
    }
}

/// USB device plus the record port built on it.
#[cfg(target_os = "none")]
pub struct UsbRecordDevice<D>
where
    D: embassy_usb::driver::Driver<'static>,
{
    pub device: embassy_usb::UsbDevice<'static, D>,
    port: Option<RecordPort<D>>,
}

#[cfg(target_os = "none")]
impl<D> UsbRecordDevice<D>
where
    D: embassy_usb::driver::Driver<'static>,
{
    pub fn new(
        driver: D,
        storage: &'static mut UsbDeviceStorage,
        strings: UsbDeviceStrings,
    ) -> Self {
        let mut config = embassy_usb::Config::new(0x1209, 0x0002);
        config.manufacturer = Some(strings.manufacturer);
        config.product = Some(strings.product);
        config.serial_number = strings.serial_number;
        config.max_packet_size_0 = 64;
        config.max_power = 100;

        let mut builder = embassy_usb::Builder::new(
            driver,
            config,
            &mut storage.config_descriptor,
            &mut storage.bos_descriptor,
            &mut storage.msos_descriptor,
            &mut storage.control_buf,
        );

        let class = embassy_usb::class::cdc_acm::CdcAcmClass::new(
            &mut builder,
            &mut storage.cdc_state,
            MAX_PACKET_SIZE,
        );
        let (sender, receiver, control) = class.split_with_control();
        let device = builder.build();

        Self {
            device,
            port: Some(RecordPort {
                sender,
                receiver,
                control,
            }),
        }
    }

    /// Takes ownership of the record port handles.
    pub fn take_port(&mut self) -> Option<RecordPort<D>> {
        self.port.take()
    }
}

/// Host-side stub so `cargo test` builds without pulling in Embassy USB.
#[cfg(not(target_os = "none"))]
pub struct UsbDeviceStorage;

#[cfg(not(target_os = "none"))]
impl UsbDeviceStorage {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self
    }
}
