//! Drive registry and legacy drive mapping.
//!
//! Devices are handed to the disk services in discovery order; each gets a dense
//! internal id plus an ordinal within its class ("the 2nd floppy"). Legacy callers
//! address drives through those class-relative ordinals, so once assigned they are
//! never renumbered — the registry is append-only for the lifetime of one session.
//!
//! Registration is also where the platform-visible side effects happen: the legacy
//! geometry is derived exactly once, fixed disks publish a parameter table and bump the
//! BDA fixed disk count, and floppies update the BDA equipment word that downstream
//! boot-capability reporting reads.

use bitflags::bitflags;
use tracing::debug;

use tern_pc_constants::{
    BDA_BASE, BDA_DISKETTE_INFO_OFFSET, BDA_EQUIPMENT_LIST_OFFSET, BDA_FIXED_DISK_COUNT_OFFSET,
};

use super::cmos::CmosBank;
use super::fdpt;
use super::geometry::{self, Chs, Translation};
use crate::memory::MemoryBus;

/// Total drive record slots per session.
pub const MAX_DRIVES: usize = 32;

/// Class-relative ordinal slots per device class.
pub const MAX_CLASS_DRIVES: usize = 4;

/// Sentinel for "no drive" in the class id maps.
pub const DRIVE_ID_NONE: u8 = 0xFF;

pub type DriveId = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DriveClass {
    None = 0,
    Floppy = 1,
    Ata = 2,
    Atapi = 3,
    RamDisk = 4,
}

bitflags! {
    /// BDA equipment list word bits maintained by this subsystem.
    ///
    /// Bit 0 reports a bootable diskette drive; bits 7:6 hold the diskette drive count
    /// minus one. Other bits belong to other subsystems and are preserved.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EquipmentFlags: u16 {
        const DISKETTE_BOOTABLE = 0x0001;
        const SECOND_DISKETTE = 0x0040;
    }
}

/// One attached drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveRecord {
    pub class: DriveClass,
    /// Controller/channel/position id; `cntl_id / 2` is the channel and `cntl_id % 2`
    /// the master/slave role.
    pub cntl_id: u8,
    pub pchs: Chs,
    pub lchs: Chs,
    /// Absolute capacity in 512-byte sectors; authoritative over the geometry.
    pub sectors: u64,
    pub translation: Translation,
}

/// Registration request for one discovered drive.
#[derive(Debug, Clone, Copy)]
pub struct NewDrive {
    pub class: DriveClass,
    pub cntl_id: u8,
    pub pchs: Chs,
    pub sectors: u64,
}

const CLASS_COUNT: usize = 4;

/// Fixed-capacity table of attached drives plus per-class ordinal maps.
#[derive(Debug, Clone)]
pub struct DriveRegistry {
    drives: Vec<DriveRecord>,
    class_map: [[DriveId; MAX_CLASS_DRIVES]; CLASS_COUNT],
    class_counts: [u8; CLASS_COUNT],
}

impl DriveRegistry {
    pub fn new() -> Self {
        Self {
            drives: Vec::with_capacity(MAX_DRIVES),
            class_map: [[DRIVE_ID_NONE; MAX_CLASS_DRIVES]; CLASS_COUNT],
            class_counts: [0; CLASS_COUNT],
        }
    }

    /// Reset to the startup state: no drives, id maps sentinel-filled.
    pub fn reset(&mut self) {
        self.drives.clear();
        self.class_map = [[DRIVE_ID_NONE; MAX_CLASS_DRIVES]; CLASS_COUNT];
        self.class_counts = [0; CLASS_COUNT];
    }

    /// Register one discovered drive.
    ///
    /// Derives the translation policy and legacy geometry, stores the record, assigns
    /// the next class-relative ordinal, and performs the class-specific BDA/EBDA/IVT
    /// side effects. Returns `None` without consuming anything when either the global
    /// table or the class map is full; capacity exhaustion is deliberate silent
    /// truncation, not an error.
    pub fn register(
        &mut self,
        bus: &mut dyn MemoryBus,
        cmos: Option<&dyn CmosBank>,
        new: NewDrive,
    ) -> Option<DriveId> {
        let slot = class_slot(new.class)?;
        if self.drives.len() >= MAX_DRIVES {
            return None;
        }
        let index = self.class_counts[slot];
        if usize::from(index) >= MAX_CLASS_DRIVES {
            return None;
        }

        let translation = geometry::select_translation(new.class, new.cntl_id, new.pchs, cmos);
        let lchs = geometry::translate(new.pchs, new.sectors, translation);

        let id = self.drives.len() as DriveId;
        let record = DriveRecord {
            class: new.class,
            cntl_id: new.cntl_id,
            pchs: new.pchs,
            lchs,
            sectors: new.sectors,
            translation,
        };
        debug!(
            drive = id,
            class = ?record.class,
            "drive {}-{}: PCHS={}/{}/{} translation={:?} LCHS={}/{}/{}",
            new.cntl_id / 2,
            new.cntl_id % 2,
            new.pchs.cylinders,
            new.pchs.heads,
            new.pchs.spt,
            translation,
            lchs.cylinders,
            lchs.heads,
            lchs.spt,
        );

        self.drives.push(record);
        self.class_map[slot][usize::from(index)] = id;
        self.class_counts[slot] = index + 1;

        match new.class {
            DriveClass::Ata => {
                // Only the first two fixed disks get a parameter table; the vector
                // convention has no slots for more.
                if index < 2 {
                    fdpt::publish(bus, &record, index);
                }
                bus.write_u8(BDA_BASE + BDA_FIXED_DISK_COUNT_OFFSET, index + 1);
            }
            DriveClass::Floppy => self.update_diskette_equipment(bus, index + 1),
            _ => {}
        }

        Some(id)
    }

    fn update_diskette_equipment(&self, bus: &mut dyn MemoryBus, count: u8) {
        let flags_addr = BDA_BASE + BDA_EQUIPMENT_LIST_OFFSET;
        let mut flags = EquipmentFlags::from_bits_retain(bus.read_u16(flags_addr));
        let info = if count == 1 {
            // One drive, ready for boot.
            flags.insert(EquipmentFlags::DISKETTE_BOOTABLE);
            0x07
        } else {
            // Two drives, ready for boot. A third or fourth drive has no further
            // effect on the legacy indicators.
            flags.insert(EquipmentFlags::DISKETTE_BOOTABLE | EquipmentFlags::SECOND_DISKETTE);
            0x77
        };
        bus.write_u16(flags_addr, flags.bits());
        bus.write_u8(BDA_BASE + BDA_DISKETTE_INFO_OFFSET, info);
    }

    pub fn drive(&self, id: DriveId) -> Option<&DriveRecord> {
        self.drives.get(usize::from(id))
    }

    pub fn len(&self) -> usize {
        self.drives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drives.is_empty()
    }

    /// Number of drives registered for `class`.
    pub fn class_count(&self, class: DriveClass) -> u8 {
        class_slot(class).map_or(0, |slot| self.class_counts[slot])
    }

    /// Drive id for the `index`-th drive of `class`, in registration order.
    pub fn drive_at(&self, class: DriveClass, index: u8) -> Option<DriveId> {
        let slot = class_slot(class)?;
        if index >= self.class_counts[slot] {
            return None;
        }
        Some(self.class_map[slot][usize::from(index)])
    }

    /// Reverse lookup: the class-relative ordinal of `id`.
    pub fn class_index(&self, id: DriveId) -> Option<u8> {
        let slot = class_slot(self.drive(id)?.class)?;
        let count = usize::from(self.class_counts[slot]);
        self.class_map[slot][..count]
            .iter()
            .position(|&mapped| mapped == id)
            .map(|index| index as u8)
    }
}

impl Default for DriveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn class_slot(class: DriveClass) -> Option<usize> {
    match class {
        DriveClass::None => None,
        DriveClass::Floppy => Some(0),
        DriveClass::Ata => Some(1),
        DriveClass::Atapi => Some(2),
        DriveClass::RamDisk => Some(3),
    }
}
