//! Legacy BIOS disk services.
//!
//! This module owns the firmware-side view of attached storage: each discovered drive
//! is registered once, which fixes its translation policy and legacy geometry, assigns
//! its class-relative ordinal, and publishes the platform-visible legacy state (BDA
//! equipment/count fields, EBDA parameter tables, the two fixed-disk IVT vectors).
//! After discovery the state is read-only and every disk request funnels through the
//! single dispatch entry point, which routes it to the transport driver for the drive's
//! class.
//!
//! Registration and dispatch never overlap: discovery completes before the first
//! operation arrives, so the registry needs no synchronization. Dispatch itself is
//! serial and not reentrant (one fixed scratch stack, one operation in flight).

pub mod cmos;
pub mod dispatch;
pub mod drives;
pub mod fdpt;
pub mod geometry;
pub mod ramdisk;

pub use cmos::{CmosBank, CmosImage};
pub use dispatch::{
    send_disk_op, Command, DiskOp, DiskStatus, DiskTransport, DispatchStack, IrqGate, Transports,
    TransportError, DISK_OP_SIZE, SECTOR_SIZE,
};
pub use drives::{
    DriveClass, DriveId, DriveRecord, DriveRegistry, EquipmentFlags, NewDrive, DRIVE_ID_NONE,
    MAX_CLASS_DRIVES, MAX_DRIVES,
};
pub use fdpt::FDPT_SIZE;
pub use geometry::{
    heuristic_translation, select_translation, translate, Chs, Translation, LEGACY_MAX_CYLINDERS,
    LEGACY_MAX_HEADS, LEGACY_MAX_SPT,
};
pub use ramdisk::RamDiskTransport;

use crate::memory::MemoryBus;

/// The disk services context for one boot session.
///
/// Owns the drive registry and the dispatch scratch stack; passed by reference into the
/// registration and dispatch operations rather than living as ambient global state.
#[derive(Debug, Clone, Default)]
pub struct DiskServices {
    drives: DriveRegistry,
    stack: DispatchStack,
}

impl DiskServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the startup state (no drives attached).
    pub fn reset(&mut self) {
        self.drives.reset();
    }

    /// Register one discovered drive. See [`DriveRegistry::register`].
    pub fn register_drive(
        &mut self,
        bus: &mut dyn MemoryBus,
        cmos: Option<&dyn CmosBank>,
        new: NewDrive,
    ) -> Option<DriveId> {
        self.drives.register(bus, cmos, new)
    }

    /// Execute one disk operation. See [`dispatch::send_disk_op`].
    pub fn send_disk_op(
        &mut self,
        bus: &mut dyn MemoryBus,
        irq: &mut dyn IrqGate,
        transports: &mut Transports<'_>,
        op_addr: u64,
    ) -> DiskStatus {
        send_disk_op(&self.drives, &mut self.stack, bus, irq, transports, op_addr)
    }

    pub fn drives(&self) -> &DriveRegistry {
        &self.drives
    }
}
