//! Disk operation dispatch.
//!
//! One entry point, [`send_disk_op`], carries every disk request from the legacy
//! interrupt service to the transport driver for the drive's class. The call sequence
//! reproduces the constrained execution context the legacy convention demands:
//!
//! 1. switch onto the dedicated dispatch stack in the EBDA (callers may arrive with
//!    arbitrarily little stack headroom),
//! 2. copy the request record into the dispatch-stack frame — the record lives in the
//!    caller's addressing context, so the copy is explicit,
//! 3. open the interrupt window and invoke the transport synchronously,
//! 4. close the window and copy the transferred-sector count back out, on every path,
//! 5. return the transport's status verbatim.
//!
//! Transports signal failure through [`TransportError`]; the mapping to legacy status
//! bytes is fixed here and device-specific codes pass through unchanged.

use thiserror::Error;
use tracing::trace;

use tern_pc_constants::{EBDA_BASE, EBDA_DISPATCH_STACK_OFFSET, EBDA_DISPATCH_STACK_SIZE};

use super::drives::{DriveClass, DriveRegistry};
use crate::memory::MemoryBus;

/// Sector size of the legacy disk interface.
pub const SECTOR_SIZE: usize = 512;

/// Size in bytes of the guest-resident request record.
pub const DISK_OP_SIZE: usize = 16;

const DISK_OP_COUNT_OFFSET: u64 = 0x0C;

/// Request command codes (the legacy interrupt service's function numbers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Reset = 0x00,
    Read = 0x02,
    Write = 0x03,
    Verify = 0x04,
    Format = 0x05,
    Seek = 0x0C,
}

impl Command {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(Command::Reset),
            0x02 => Some(Command::Read),
            0x03 => Some(Command::Write),
            0x04 => Some(Command::Verify),
            0x05 => Some(Command::Format),
            0x0C => Some(Command::Seek),
            _ => None,
        }
    }
}

/// One disk operation request.
///
/// The guest-resident layout is bit-exact: `lba` at 0x00, flat buffer pointer at 0x08,
/// sector count at 0x0C, drive id at 0x0E, command at 0x0F.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskOp {
    pub lba: u64,
    pub buf: u32,
    pub count: u16,
    pub drive_id: u8,
    pub command: u8,
}

impl DiskOp {
    pub fn decode(raw: &[u8; DISK_OP_SIZE]) -> Self {
        Self {
            lba: u64::from_le_bytes(raw[0x00..0x08].try_into().unwrap()),
            buf: u32::from_le_bytes(raw[0x08..0x0C].try_into().unwrap()),
            count: u16::from_le_bytes(raw[0x0C..0x0E].try_into().unwrap()),
            drive_id: raw[0x0E],
            command: raw[0x0F],
        }
    }

    pub fn encode(&self) -> [u8; DISK_OP_SIZE] {
        let mut raw = [0u8; DISK_OP_SIZE];
        raw[0x00..0x08].copy_from_slice(&self.lba.to_le_bytes());
        raw[0x08..0x0C].copy_from_slice(&self.buf.to_le_bytes());
        raw[0x0C..0x0E].copy_from_slice(&self.count.to_le_bytes());
        raw[0x0E] = self.drive_id;
        raw[0x0F] = self.command;
        raw
    }

    pub fn command(&self) -> Option<Command> {
        Command::from_u8(self.command)
    }
}

/// Legacy status byte returned to the interrupt service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskStatus(pub u8);

impl DiskStatus {
    pub const SUCCESS: DiskStatus = DiskStatus(0x00);
    pub const EPARAM: DiskStatus = DiskStatus(0x01);
    pub const EADDRNOTFOUND: DiskStatus = DiskStatus(0x02);
    pub const EWRITEPROTECT: DiskStatus = DiskStatus(0x03);
    pub const ESECTORNOTFOUND: DiskStatus = DiskStatus(0x04);
    pub const ECHANGED: DiskStatus = DiskStatus(0x06);
    pub const EBOUNDARY: DiskStatus = DiskStatus(0x09);
    pub const EBADTRACK: DiskStatus = DiskStatus(0x0C);
    pub const ECONTROLLER: DiskStatus = DiskStatus(0x20);
    pub const ETIMEOUT: DiskStatus = DiskStatus(0x80);
    pub const ENOTREADY: DiskStatus = DiskStatus(0xAA);
    pub const EMEDIA: DiskStatus = DiskStatus(0xC0);

    pub fn is_ok(self) -> bool {
        self == Self::SUCCESS
    }
}

/// Transport-level failure, mapped onto the legacy status byte at the dispatch
/// boundary. Device-specific codes use [`TransportError::Device`] and pass through
/// verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid parameter")]
    InvalidParam,
    #[error("address mark not found")]
    AddressNotFound,
    #[error("write protected")]
    WriteProtect,
    #[error("sector not found")]
    SectorNotFound,
    #[error("media changed")]
    MediaChanged,
    #[error("transfer crossed a boundary")]
    Boundary,
    #[error("bad track")]
    BadTrack,
    #[error("controller error")]
    Controller,
    #[error("timeout")]
    Timeout,
    #[error("drive not ready")]
    NotReady,
    #[error("bad media")]
    Media,
    #[error("device status {0:#04x}")]
    Device(u8),
}

impl TransportError {
    pub fn status(self) -> DiskStatus {
        match self {
            TransportError::InvalidParam => DiskStatus::EPARAM,
            TransportError::AddressNotFound => DiskStatus::EADDRNOTFOUND,
            TransportError::WriteProtect => DiskStatus::EWRITEPROTECT,
            TransportError::SectorNotFound => DiskStatus::ESECTORNOTFOUND,
            TransportError::MediaChanged => DiskStatus::ECHANGED,
            TransportError::Boundary => DiskStatus::EBOUNDARY,
            TransportError::BadTrack => DiskStatus::EBADTRACK,
            TransportError::Controller => DiskStatus::ECONTROLLER,
            TransportError::Timeout => DiskStatus::ETIMEOUT,
            TransportError::NotReady => DiskStatus::ENOTREADY,
            TransportError::Media => DiskStatus::EMEDIA,
            TransportError::Device(code) => DiskStatus(code),
        }
    }
}

/// Uniform "execute one disk operation" capability provided by each device-class
/// driver.
///
/// Implementations update `op.count` to the number of sectors actually transferred.
pub trait DiskTransport {
    fn execute(&mut self, op: &mut DiskOp, bus: &mut dyn MemoryBus) -> Result<(), TransportError>;
}

/// Shared interrupt-enable gate.
///
/// Transports may depend on interrupts being delivered while a transfer is in flight;
/// the router opens the gate for exactly the duration of the transport call.
pub trait IrqGate {
    fn set_irq_enabled(&mut self, enabled: bool);
    fn irq_enabled(&self) -> bool;
}

/// Transport drivers wired up for this session, one per device class.
#[derive(Default)]
pub struct Transports<'a> {
    pub floppy: Option<&'a mut dyn DiskTransport>,
    pub ata: Option<&'a mut dyn DiskTransport>,
    pub atapi: Option<&'a mut dyn DiskTransport>,
    pub ramdisk: Option<&'a mut dyn DiskTransport>,
}

impl<'a> Transports<'a> {
    fn for_class(&mut self, class: DriveClass) -> Option<&mut (dyn DiskTransport + 'a)> {
        let slot = match class {
            DriveClass::Floppy => &mut self.floppy,
            DriveClass::Ata => &mut self.ata,
            DriveClass::Atapi => &mut self.atapi,
            DriveClass::RamDisk => &mut self.ramdisk,
            DriveClass::None => return None,
        };
        slot.as_deref_mut()
    }
}

/// The dedicated, fixed-location dispatch stack.
///
/// A single scratch region in the EBDA reused serially by every operation; dispatch is
/// not reentrant, which the in-flight marker asserts.
#[derive(Debug, Clone)]
pub struct DispatchStack {
    in_flight: bool,
}

impl DispatchStack {
    pub fn new() -> Self {
        Self { in_flight: false }
    }

    /// Physical address of the request frame at the top of the stack region.
    fn frame(&self) -> u64 {
        EBDA_BASE + EBDA_DISPATCH_STACK_OFFSET + EBDA_DISPATCH_STACK_SIZE - DISK_OP_SIZE as u64
    }

    /// Run `body` on the dispatch stack, restoring the prior context on every exit
    /// path.
    fn with_frame<R>(&mut self, body: impl FnOnce(u64) -> R) -> R {
        debug_assert!(!self.in_flight, "disk dispatch is not reentrant");
        let frame = self.frame();
        self.in_flight = true;
        let _guard = InFlightGuard(&mut self.in_flight);
        body(frame)
    }
}

struct InFlightGuard<'a>(&'a mut bool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

impl Default for DispatchStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute one disk operation whose request record lives at `op_addr`.
///
/// Unknown drives, unregistered classes, and classes with no transport wired up are
/// rejected with [`DiskStatus::EPARAM`] and a zero transferred count; transport status
/// codes are returned verbatim. The transferred count is copied back into the caller's
/// record unconditionally, including on every error path.
pub fn send_disk_op(
    drives: &DriveRegistry,
    stack: &mut DispatchStack,
    bus: &mut dyn MemoryBus,
    irq: &mut dyn IrqGate,
    transports: &mut Transports<'_>,
    op_addr: u64,
) -> DiskStatus {
    stack.with_frame(|frame| {
        // Copy the request record out of the caller's context into the dispatch-stack
        // frame before looking at it.
        let mut raw = [0u8; DISK_OP_SIZE];
        bus.read_physical(op_addr, &mut raw);
        bus.write_physical(frame, &raw);
        let mut op = DiskOp::decode(&raw);

        trace!(
            drive = op.drive_id,
            lba = op.lba,
            buf = op.buf,
            count = op.count,
            command = op.command,
            "disk op"
        );

        let class = drives
            .drive(op.drive_id)
            .map_or(DriveClass::None, |record| record.class);
        let status = match transports.for_class(class) {
            None => {
                // Unknown class: rejected before the transfer ever starts.
                op.count = 0;
                DiskStatus::EPARAM
            }
            Some(transport) => {
                // Transports may depend on interrupt delivery to make progress; open
                // the gate for exactly the duration of the call.
                irq.set_irq_enabled(true);
                let result = transport.execute(&mut op, bus);
                irq.set_irq_enabled(false);
                match result {
                    Ok(()) => DiskStatus::SUCCESS,
                    Err(err) => err.status(),
                }
            }
        };

        // Copy the transferred count back across the context boundary, error or not.
        bus.write_u16(frame + DISK_OP_COUNT_OFFSET, op.count);
        bus.write_u16(op_addr + DISK_OP_COUNT_OFFSET, op.count);

        status
    })
}
