//! Disk geometry translation.
//!
//! Legacy CHS addressing can express at most 1024 cylinders, 255 heads, and 63 sectors
//! per track. Drives larger than that are still exposed through the same interface by
//! *translating* the physical geometry into a legacy geometry that fits those field
//! widths. Which translation applies is a per-drive policy, fixed once when the drive is
//! registered:
//!
//! - [`Translation::None`] — the physical geometry already fits; report it unchanged.
//! - [`Translation::Large`] — halve cylinders / double heads until the cylinder count
//!   fits.
//! - [`Translation::Rechs`] — revised ECHS: 16-head drives are first rescaled to 15
//!   heads, then go through the same halving-doubling step.
//! - [`Translation::Lba`] — derive a synthetic geometry from the absolute sector count
//!   using the maximum 63 sectors/track and an escalating head count.
//!
//! The numeric details (truncating division, the 61439-cylinder clip, the literal
//! 16/32/64/128/255 head ladder, the final 1024-cylinder clip) are load-bearing: decades
//! of boot code key their behavior off these exact values, so the arithmetic here must
//! not be "cleaned up" into an equivalent formula.

use tern_pc_constants::CMOS_DISK_TRANSLATION;

use super::cmos::CmosBank;
use super::drives::DriveClass;

/// Highest cylinder count expressible through the legacy interface.
pub const LEGACY_MAX_CYLINDERS: u16 = 1024;

/// Highest head count expressible through the legacy interface.
pub const LEGACY_MAX_HEADS: u16 = 255;

/// Highest sectors-per-track value expressible through the legacy interface.
pub const LEGACY_MAX_SPT: u16 = 63;

/// A cylinder/head/sectors-per-track triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Chs {
    pub cylinders: u16,
    pub heads: u16,
    pub spt: u16,
}

impl Chs {
    pub const fn new(cylinders: u16, heads: u16, spt: u16) -> Self {
        Self {
            cylinders,
            heads,
            spt,
        }
    }
}

/// Per-drive geometry translation policy.
///
/// The discriminants are the wire encoding of the 2-bit CMOS configuration field and
/// must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Translation {
    None = 0,
    Lba = 1,
    Large = 2,
    Rechs = 3,
}

impl Translation {
    /// Decode a 2-bit CMOS translation field (higher bits are ignored).
    pub fn from_cmos_field(raw: u8) -> Self {
        match raw & 0x03 {
            0 => Translation::None,
            1 => Translation::Lba,
            2 => Translation::Large,
            _ => Translation::Rechs,
        }
    }
}

/// Select the translation policy for a drive.
///
/// ATA drives take their policy from the host-provided CMOS bank when one is wired up
/// (virtual machine hosts publish the policy there); every other case falls back to the
/// threshold heuristic on the physical geometry.
pub fn select_translation(
    class: DriveClass,
    cntl_id: u8,
    pchs: Chs,
    cmos: Option<&dyn CmosBank>,
) -> Translation {
    if class == DriveClass::Ata {
        if let Some(cmos) = cmos {
            let channel = cntl_id / 2;
            let raw = cmos.read(CMOS_DISK_TRANSLATION + channel / 2);
            return Translation::from_cmos_field(raw >> (2 * (cntl_id % 4)));
        }
    }
    heuristic_translation(pchs)
}

/// Threshold heuristic used when no external policy is configured.
pub fn heuristic_translation(pchs: Chs) -> Translation {
    if pchs.cylinders <= LEGACY_MAX_CYLINDERS && pchs.heads <= 16 && pchs.spt <= LEGACY_MAX_SPT {
        return Translation::None;
    }
    if u32::from(pchs.cylinders) * u32::from(pchs.heads) <= 131072 {
        return Translation::Large;
    }
    Translation::Lba
}

/// Derive the legacy geometry for a drive.
///
/// `sectors` is the absolute capacity in 512-byte sectors; it is authoritative for the
/// LBA policy and ignored by the others. The result always satisfies
/// `cylinders <= LEGACY_MAX_CYLINDERS`.
pub fn translate(pchs: Chs, sectors: u64, translation: Translation) -> Chs {
    let mut lchs = pchs;
    match translation {
        Translation::None => {}
        Translation::Lba => {
            lchs.spt = LEGACY_MAX_SPT;
            if sectors > 63 * 255 * 1024 {
                // Capacity exceeds what any legacy geometry can address; saturate.
                lchs.heads = 255;
                lchs.cylinders = 1024;
            } else {
                let sect = (sectors as u32) / 63;
                let heads = sect / 1024;
                let heads = if heads > 128 {
                    255
                } else if heads > 64 {
                    128
                } else if heads > 32 {
                    64
                } else if heads > 16 {
                    32
                } else {
                    16
                };
                lchs.heads = heads as u16;
                lchs.cylinders = (sect / heads) as u16;
            }
        }
        Translation::Rechs => {
            // Revised ECHS applies only to 16-head drives. Clip first so the 16/15
            // rescale cannot overflow the cylinder field.
            if lchs.heads == 16 {
                if lchs.cylinders > 61439 {
                    lchs.cylinders = 61439;
                }
                lchs.heads = 15;
                lchs.cylinders = (u32::from(lchs.cylinders) * 16 / 15) as u16;
            }
            double_heads_until_fit(&mut lchs);
        }
        Translation::Large => double_heads_until_fit(&mut lchs),
    }

    // Universal clip: every policy reports at most 1024 cylinders, losing access to
    // whatever lies beyond.
    if lchs.cylinders > LEGACY_MAX_CYLINDERS {
        lchs.cylinders = LEGACY_MAX_CYLINDERS;
    }
    lchs
}

/// Shared halving-doubling step of the Large and revised-ECHS policies.
fn double_heads_until_fit(chs: &mut Chs) {
    while chs.cylinders > 1024 {
        chs.cylinders >>= 1;
        chs.heads <<= 1;

        // Once the head count maxes out, stop and let the universal clip catch the
        // remaining cylinders.
        if chs.heads > 127 {
            break;
        }
    }
}
