//! Fixed NAND layout used when files are given without placements.

use crate::placement::{DataPlacement, DeviceType, EraseMode, Placement};
use crate::Error;
use std::path::PathBuf;

// 14MB
pub const UBOOT_OFFSET: u32 = 0xE00000;
// 16MB
pub const UBOOT_END: u32 = 0x1000000;
// 17MB
pub const ROOTFS_OFFSET: u32 = 0x1100000;

/// Map 1, 2 or 3 bare file names onto the legacy layout:
///
/// - `rootfs`: filesystem erased to the end of flash at 17MB
/// - `spl uboot`: bootloader pair, each erasing its own partition
/// - `spl uboot rootfs`: whole device erased, then all three written
pub fn legacy_layout<P: Into<PathBuf> + Clone>(
    files: &[P],
    device: DeviceType,
) -> Result<Vec<Placement>, Error> {
    if device != DeviceType::Nand {
        return Err(Error::Usage(
            "the legacy layout is only available for nand".into(),
        ));
    }

    let placements = match files {
        [rootfs] => vec![DataPlacement::new(rootfs.clone(), ROOTFS_OFFSET, EraseMode::ToEnd)],
        [spl, uboot] => vec![
            DataPlacement::new(spl.clone(), 0, EraseMode::Partition).with_end(UBOOT_OFFSET),
            DataPlacement::new(uboot.clone(), UBOOT_OFFSET, EraseMode::Partition)
                .with_end(UBOOT_END),
        ],
        [spl, uboot, rootfs] => vec![
            DataPlacement::new(spl.clone(), 0, EraseMode::All).with_end(UBOOT_OFFSET),
            DataPlacement::new(uboot.clone(), UBOOT_OFFSET, EraseMode::None),
            DataPlacement::new(rootfs.clone(), ROOTFS_OFFSET, EraseMode::None),
        ],
        _ => {
            return Err(Error::Usage(format!(
                "expected 1, 2 or 3 files, got {}",
                files.len()
            )))
        }
    };

    Ok(placements.into_iter().map(Placement::Data).collect())
}
