//! CMOS configuration bank access.
//!
//! Virtual machine hosts publish per-drive translation policy in CMOS; the disk services
//! only ever read it, so the seam is a single-method trait that harnesses can back with
//! a real RTC/CMOS device model or a plain byte image.

use tern_pc_constants::CMOS_DISK_TRANSLATION;

use super::geometry::Translation;

pub trait CmosBank {
    fn read(&self, index: u8) -> u8;
}

/// Host-configured in-memory CMOS image.
#[derive(Debug, Clone)]
pub struct CmosImage {
    bytes: [u8; 128],
}

impl CmosImage {
    pub fn new() -> Self {
        Self { bytes: [0; 128] }
    }

    pub fn set(&mut self, index: u8, value: u8) {
        self.bytes[usize::from(index) & 0x7F] = value;
    }

    /// Program the 2-bit translation field for the ATA drive at `cntl_id`.
    pub fn set_ata_translation(&mut self, cntl_id: u8, translation: Translation) {
        let index = usize::from(CMOS_DISK_TRANSLATION + cntl_id / 4) & 0x7F;
        let shift = 2 * (cntl_id % 4);
        self.bytes[index] &= !(0x03 << shift);
        self.bytes[index] |= (translation as u8) << shift;
    }
}

impl Default for CmosImage {
    fn default() -> Self {
        Self::new()
    }
}

impl CmosBank for CmosImage {
    fn read(&self, index: u8) -> u8 {
        self.bytes[usize::from(index) & 0x7F]
    }
}
