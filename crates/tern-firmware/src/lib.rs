//! Disk subsystem of the tern legacy PC firmware.
//!
//! Translates physical drive geometry into the bounded legacy CHS form, maintains the
//! drive registry and its platform-visible side effects (BDA/EBDA/IVT), and routes disk
//! operations to per-class transport drivers.

pub mod bios;
pub mod memory;
