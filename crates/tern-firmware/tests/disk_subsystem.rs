//! End-to-end tests of drive registration and disk dispatch against a flat guest
//! memory image.

use tern_firmware::bios::{
    Chs, CmosImage, Command, DiskOp, DiskServices, DiskStatus, DriveClass, IrqGate, NewDrive,
    RamDiskTransport, Translation, Transports, DISK_OP_SIZE, SECTOR_SIZE,
};
use tern_firmware::memory::{MemoryBus, VecMemory};
use tern_pc_constants::{
    BDA_BASE, BDA_EQUIPMENT_LIST_OFFSET, BDA_FIXED_DISK_COUNT_OFFSET, EBDA_BASE,
    EBDA_DISPATCH_STACK_OFFSET, EBDA_DISPATCH_STACK_SIZE, EBDA_FDPT0_OFFSET, EBDA_SEGMENT,
    IVT_FIXED_DISK_0_VECTOR,
};

const OP_ADDR: u64 = 0x7000;
const BUF_ADDR: u32 = 0x2_0000;

struct TestIrqGate {
    enabled: bool,
    transitions: Vec<bool>,
}

impl TestIrqGate {
    fn new() -> Self {
        Self {
            enabled: false,
            transitions: Vec::new(),
        }
    }
}

impl IrqGate for TestIrqGate {
    fn set_irq_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.transitions.push(enabled);
    }

    fn irq_enabled(&self) -> bool {
        self.enabled
    }
}

fn guest_memory() -> VecMemory {
    VecMemory::new(0xA0000)
}

fn write_op(mem: &mut VecMemory, op: &DiskOp) {
    mem.write_physical(OP_ADDR, &op.encode());
}

#[test]
fn fixed_disk_registration_publishes_the_legacy_view() {
    let mut mem = guest_memory();
    let mut services = DiskServices::new();

    let id = services
        .register_drive(
            &mut mem,
            None,
            NewDrive {
                class: DriveClass::Ata,
                cntl_id: 0,
                pchs: Chs::new(2000, 16, 63),
                sectors: 2_016_000,
            },
        )
        .unwrap();

    let record = services.drives().drive(id).unwrap();
    assert_eq!(record.translation, Translation::Large);
    assert_eq!(record.lchs, Chs::new(1000, 32, 63));

    // BDA fixed disk count.
    assert_eq!(mem.read_u8(BDA_BASE + BDA_FIXED_DISK_COUNT_OFFSET), 1);

    // IVT vector 0x41 points into the EBDA.
    let vector_addr = u64::from(IVT_FIXED_DISK_0_VECTOR) * 4;
    assert_eq!(mem.read_u16(vector_addr), EBDA_FDPT0_OFFSET as u16);
    assert_eq!(mem.read_u16(vector_addr + 2), EBDA_SEGMENT);

    // The published parameter table carries the translated geometry and sums to zero.
    let table_addr = EBDA_BASE + EBDA_FDPT0_OFFSET;
    assert_eq!(mem.read_u16(table_addr), 1000);
    assert_eq!(mem.read_u8(table_addr + 0x02), 32);
    assert_eq!(mem.read_u8(table_addr + 0x03), 0xA0);
    let mut table = [0u8; 16];
    mem.read_physical(table_addr, &mut table);
    assert_eq!(table.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)), 0);
}

#[test]
fn cmos_policy_overrides_the_heuristic_for_ata_drives() {
    let mut mem = guest_memory();
    let mut services = DiskServices::new();
    let mut cmos = CmosImage::new();
    cmos.set_ata_translation(0, Translation::Lba);

    let id = services
        .register_drive(
            &mut mem,
            Some(&cmos),
            NewDrive {
                class: DriveClass::Ata,
                cntl_id: 0,
                pchs: Chs::new(1024, 16, 63),
                sectors: 16 * 1024 * 63,
            },
        )
        .unwrap();

    let record = services.drives().drive(id).unwrap();
    // Heuristic mode would have picked Translation::None for this geometry.
    assert_eq!(record.translation, Translation::Lba);
    assert_eq!(record.lchs, Chs::new(1024, 16, 63));
}

#[test]
fn three_floppies_keep_their_ordinals_and_the_two_drive_equipment_state() {
    let mut mem = guest_memory();
    let mut services = DiskServices::new();

    let mut ids = Vec::new();
    for cntl_id in 0..3 {
        ids.push(
            services
                .register_drive(
                    &mut mem,
                    None,
                    NewDrive {
                        class: DriveClass::Floppy,
                        cntl_id,
                        pchs: Chs::new(80, 2, 18),
                        sectors: 2880,
                    },
                )
                .unwrap(),
        );
    }

    for (ordinal, id) in ids.iter().enumerate() {
        assert_eq!(services.drives().class_index(*id), Some(ordinal as u8));
    }
    let equipment = mem.read_u16(BDA_BASE + BDA_EQUIPMENT_LIST_OFFSET);
    assert_eq!(equipment & 0x41, 0x41);
}

#[test]
fn ram_disk_round_trip_through_dispatch() {
    let mut mem = guest_memory();
    let mut services = DiskServices::new();
    let mut irq = TestIrqGate::new();

    let mut image = vec![0u8; 8 * SECTOR_SIZE];
    image[3 * SECTOR_SIZE..4 * SECTOR_SIZE].fill(0x5A);
    let mut ramdisk = RamDiskTransport::new(image);

    let id = services
        .register_drive(
            &mut mem,
            None,
            NewDrive {
                class: DriveClass::RamDisk,
                cntl_id: 0,
                pchs: Chs::new(1, 1, 8),
                sectors: 8,
            },
        )
        .unwrap();

    let op = DiskOp {
        lba: 3,
        buf: BUF_ADDR,
        count: 1,
        drive_id: id,
        command: Command::Read as u8,
    };
    write_op(&mut mem, &op);

    let mut transports = Transports {
        ramdisk: Some(&mut ramdisk),
        ..Transports::default()
    };
    let status = services.send_disk_op(&mut mem, &mut irq, &mut transports, OP_ADDR);

    assert_eq!(status, DiskStatus::SUCCESS);
    assert_eq!(mem.read_u8(u64::from(BUF_ADDR)), 0x5A);
    assert_eq!(mem.read_u8(u64::from(BUF_ADDR) + 511), 0x5A);
    // Transferred count is written back into the caller's record.
    assert_eq!(mem.read_u16(OP_ADDR + 0x0C), 1);

    // The interrupt window opened exactly once, and closed again.
    assert_eq!(irq.transitions, vec![true, false]);
    assert!(!irq.irq_enabled());
}

#[test]
fn dispatch_copies_the_request_into_the_dedicated_stack_frame() {
    let mut mem = guest_memory();
    let mut services = DiskServices::new();
    let mut irq = TestIrqGate::new();
    let mut ramdisk = RamDiskTransport::with_sectors(8);

    let id = services
        .register_drive(
            &mut mem,
            None,
            NewDrive {
                class: DriveClass::RamDisk,
                cntl_id: 0,
                pchs: Chs::new(1, 1, 8),
                sectors: 8,
            },
        )
        .unwrap();

    let op = DiskOp {
        lba: 5,
        buf: BUF_ADDR,
        count: 2,
        drive_id: id,
        command: Command::Verify as u8,
    };
    write_op(&mut mem, &op);

    let mut transports = Transports {
        ramdisk: Some(&mut ramdisk),
        ..Transports::default()
    };
    let status = services.send_disk_op(&mut mem, &mut irq, &mut transports, OP_ADDR);
    assert!(status.is_ok());

    let frame = EBDA_BASE + EBDA_DISPATCH_STACK_OFFSET + EBDA_DISPATCH_STACK_SIZE
        - DISK_OP_SIZE as u64;
    let mut raw = [0u8; DISK_OP_SIZE];
    mem.read_physical(frame, &mut raw);
    assert_eq!(DiskOp::decode(&raw), op);
}

#[test]
fn unknown_drives_are_rejected_with_invalid_parameter() {
    let mut mem = guest_memory();
    let mut services = DiskServices::new();
    let mut irq = TestIrqGate::new();

    let op = DiskOp {
        lba: 0,
        buf: BUF_ADDR,
        count: 4,
        drive_id: 7,
        command: Command::Read as u8,
    };
    write_op(&mut mem, &op);

    let mut transports = Transports::default();
    let status = services.send_disk_op(&mut mem, &mut irq, &mut transports, OP_ADDR);

    assert_eq!(status, DiskStatus::EPARAM);
    // The rejection still zeroes the caller-visible count.
    assert_eq!(mem.read_u16(OP_ADDR + 0x0C), 0);
    // Rejected before the transfer phase: the IRQ window never opened.
    assert!(irq.transitions.is_empty());
}

#[test]
fn registered_class_without_a_transport_is_rejected() {
    let mut mem = guest_memory();
    let mut services = DiskServices::new();
    let mut irq = TestIrqGate::new();

    let id = services
        .register_drive(
            &mut mem,
            None,
            NewDrive {
                class: DriveClass::Floppy,
                cntl_id: 0,
                pchs: Chs::new(80, 2, 18),
                sectors: 2880,
            },
        )
        .unwrap();

    let op = DiskOp {
        lba: 0,
        buf: BUF_ADDR,
        count: 1,
        drive_id: id,
        command: Command::Read as u8,
    };
    write_op(&mut mem, &op);

    let mut transports = Transports::default();
    let status = services.send_disk_op(&mut mem, &mut irq, &mut transports, OP_ADDR);
    assert_eq!(status, DiskStatus::EPARAM);
    assert_eq!(mem.read_u16(OP_ADDR + 0x0C), 0);
}

#[test]
fn transport_failures_pass_through_and_update_the_count() {
    let mut mem = guest_memory();
    let mut services = DiskServices::new();
    let mut irq = TestIrqGate::new();
    let mut ramdisk = RamDiskTransport::with_sectors(4);

    let id = services
        .register_drive(
            &mut mem,
            None,
            NewDrive {
                class: DriveClass::RamDisk,
                cntl_id: 0,
                pchs: Chs::new(1, 1, 4),
                sectors: 4,
            },
        )
        .unwrap();

    // Two sectors starting at the last valid one: out of range.
    let op = DiskOp {
        lba: 3,
        buf: BUF_ADDR,
        count: 2,
        drive_id: id,
        command: Command::Read as u8,
    };
    write_op(&mut mem, &op);

    let mut transports = Transports {
        ramdisk: Some(&mut ramdisk),
        ..Transports::default()
    };
    let status = services.send_disk_op(&mut mem, &mut irq, &mut transports, OP_ADDR);
    assert_eq!(status, DiskStatus::ESECTORNOTFOUND);
    assert_eq!(mem.read_u16(OP_ADDR + 0x0C), 0);
}
