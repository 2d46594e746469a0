//! Placements read from a TOML file instead of the command line.
//!
//! ```toml
//! erase_all = true
//! [[segment]]
//! file = "SPL"
//! offset = "0"
//! end = "14M"
//! erase = "erase_part"
//! ```

use crate::placement::{
    BootPartition, DataPlacement, DeviceType, EraseMode, HwPartition, Placement,
};
use crate::{size::parse_size_u32, Error};
use serde::Deserialize;
use std::fs::read;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LayoutFile {
    #[serde(default)]
    pub erase_all: bool,
    pub partconf: Option<String>,
    #[serde(default, rename = "segment")]
    pub segments: Vec<LayoutEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutEntry {
    pub file: PathBuf,
    pub offset: String,
    pub end: Option<String>,
    pub erase: Option<String>,
    pub partition: Option<String>,
}

impl LayoutFile {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = read(path).map_err(|e| Error::file(path, e))?;
        let mut layout: LayoutFile = toml::from_slice(&data)?;
        // relative file names are relative to the layout file
        if let Some(dir) = path.parent() {
            for entry in layout.segments.iter_mut() {
                if entry.file.is_relative() {
                    entry.file = dir.join(&entry.file);
                }
            }
        }
        Ok(layout)
    }

    pub fn placements(&self, device: DeviceType) -> Result<Vec<Placement>, Error> {
        let mut placements = Vec::new();
        if let Some(partconf) = &self.partconf {
            if device != DeviceType::Emmc {
                return Err(Error::InvalidArgument(
                    "partconf is only valid for emmc".into(),
                ));
            }
            placements.push(Placement::PartitionConfig(partconf.parse::<BootPartition>()?));
        }

        let mut default_erase = if self.erase_all {
            EraseMode::All
        } else {
            EraseMode::None
        };
        for entry in &self.segments {
            placements.push(Placement::Data(entry.placement(default_erase, device)?));
            default_erase = EraseMode::None;
        }

        Ok(placements)
    }
}

impl LayoutEntry {
    fn placement(&self, default_erase: EraseMode, device: DeviceType) -> Result<DataPlacement, Error> {
        let erase = self
            .erase
            .as_deref()
            .map(EraseMode::from_name)
            .unwrap_or(default_erase);
        let mut placement = DataPlacement::new(&self.file, parse_size_u32(&self.offset)?, erase);

        if let Some(end) = &self.end {
            let end = parse_size_u32(end)?;
            if end <= placement.offset {
                return Err(Error::InvalidArgument(format!(
                    "{}: end {:#x} is not past start {:#x}",
                    self.file.display(),
                    end,
                    placement.offset
                )));
            }
            placement.end = Some(end);
        }

        if let Some(partition) = &self.partition {
            if device == DeviceType::Emmc {
                placement.partition = partition.parse::<HwPartition>()?;
            } else {
                log::warn!(
                    "{}: partition {:?} ignored on nand",
                    self.file.display(),
                    partition
                );
            }
        }

        Ok(placement)
    }
}
