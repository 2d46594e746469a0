use crate::config::{Config, DEFAULT_CHUNK_SIZE, DEFAULT_EMMC_BLOCK_SIZE};
use crate::image::{SegmentConfig, SegmentHeader, HEADER_SIZE};
use crate::placement::{DataPlacement, DeviceType, EraseMode, HwPartition, Placement};
use crate::Error;
use deku::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::convert::TryFrom;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

fn get_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("  {wide_bar} {bytes}/{total_bytes} {bytes_per_sec} {eta}  ")
            .progress_chars("#>-"),
    );
    bar
}

#[derive(Debug, Copy, Clone)]
pub struct AssembleOptions {
    pub device: DeviceType,
    /// eMMC offsets are encoded in blocks of this many bytes.
    pub emmc_block_size: u32,
    pub chunk_size: usize,
    pub progress: bool,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        AssembleOptions {
            device: DeviceType::Nand,
            emmc_block_size: DEFAULT_EMMC_BLOCK_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress: false,
        }
    }
}

impl AssembleOptions {
    pub fn from_config(config: &Config, device: DeviceType) -> Self {
        AssembleOptions {
            device,
            emmc_block_size: config.emmc_block_size,
            chunk_size: config.chunk_size.max(1),
            progress: true,
        }
    }

    fn target_offset(&self, offset: u32) -> Result<u32, Error> {
        match self.device {
            DeviceType::Nand => Ok(offset),
            DeviceType::Emmc => {
                if offset % self.emmc_block_size != 0 {
                    return Err(Error::InvalidArgument(format!(
                        "emmc offset {:#x} is not a multiple of the {} byte block size",
                        offset, self.emmc_block_size
                    )));
                }
                Ok(offset / self.emmc_block_size)
            }
        }
    }

    fn partition_field(&self, partition: HwPartition) -> u8 {
        match self.device {
            DeviceType::Emmc => partition.field(),
            DeviceType::Nand => 0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    Data,
    Bootstream,
    PartitionConfig,
}

/// A placement resolved against its input file, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub header: SegmentHeader,
    pub source: Option<PathBuf>,
}

impl Segment {
    /// Bytes this segment occupies in the output.
    pub fn encoded_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.header.data_size as u64
    }
}

/// An ordered list of resolved segments.
///
/// Everything that can be checked without streaming payloads is checked when
/// the image is planned, so a bad placement never produces partial output.
#[derive(Debug)]
pub struct Image {
    segments: Vec<Segment>,
    opts: AssembleOptions,
}

impl Image {
    pub fn plan(placements: &[Placement], opts: AssembleOptions) -> Result<Self, Error> {
        let mut segments: Vec<Segment> = Vec::with_capacity(placements.len());

        for placement in placements {
            let segment = match placement {
                Placement::PartitionConfig(boot) => {
                    if opts.device != DeviceType::Emmc {
                        return Err(Error::InvalidArgument(
                            "partition config is only valid for emmc".into(),
                        ));
                    }
                    if !segments.is_empty() {
                        return Err(Error::InvalidArgument(
                            "partition config must come before all other segments".into(),
                        ));
                    }
                    let config = SegmentConfig::new(opts.device, EraseMode::None, boot.field());
                    Segment {
                        kind: SegmentKind::PartitionConfig,
                        header: SegmentHeader::new(config, 0, 0, 0),
                        source: None,
                    }
                }
                Placement::Bootstream {
                    offset,
                    part_size,
                    erase,
                    partition,
                } => {
                    if *part_size == 0 {
                        return Err(Error::InvalidArgument(
                            "bootstream needs a nonzero partition size".into(),
                        ));
                    }
                    let config =
                        SegmentConfig::new(opts.device, *erase, opts.partition_field(*partition));
                    Segment {
                        kind: SegmentKind::Bootstream,
                        header: SegmentHeader::new(
                            config,
                            opts.target_offset(*offset)?,
                            0,
                            *part_size,
                        ),
                        source: None,
                    }
                }
                Placement::Data(data) => resolve_data(data, &opts)?,
            };

            if segment.kind == SegmentKind::Bootstream
                && segments
                    .iter()
                    .any(|s| s.kind != SegmentKind::PartitionConfig)
            {
                return Err(Error::InvalidArgument(format!(
                    "bootstream at {:#x} must be the first segment",
                    segment.header.offset
                )));
            }
            segments.push(segment);
        }

        Ok(Image { segments, opts })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Total length of the assembled stream.
    pub fn len(&self) -> u64 {
        self.segments.iter().map(Segment::encoded_len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Stream every segment to `writer`, returning the number of bytes written.
    pub fn write_to(&self, mut writer: impl Write) -> Result<u64, Error> {
        let mut buf = vec![0u8; self.opts.chunk_size.max(1)];
        let mut written = 0;

        for (index, segment) in self.segments.iter().enumerate() {
            let header = &segment.header;
            log::info!(
                "Segment {}: {:?} offset: {:#x} size: {} part size: {:#x} config: {:#06x}",
                index,
                segment.kind,
                header.offset,
                header.data_size,
                header.part_size,
                header.config
            );
            writer.write_all(&header.to_bytes()?)?;
            written += HEADER_SIZE as u64;

            if let Some(path) = &segment.source {
                written += self.copy_payload(path, header.data_size, &mut buf, &mut writer)?;
            }
        }
        writer.flush()?;

        log::info!("Wrote {} segments, {} bytes", self.segments.len(), written);
        Ok(written)
    }

    fn copy_payload(
        &self,
        path: &Path,
        len: u32,
        buf: &mut [u8],
        writer: &mut impl Write,
    ) -> Result<u64, Error> {
        let mut file = File::open(path).map_err(|e| Error::file(path, e))?;
        let pb = if self.opts.progress {
            get_bar(len as u64)
        } else {
            ProgressBar::hidden()
        };

        let mut copied = 0u64;
        while copied < len as u64 {
            let want = (len as u64 - copied).min(buf.len() as u64) as usize;
            let size = match file.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(size) => size,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::file(path, e)),
            };
            writer.write_all(&buf[..size])?;
            copied += size as u64;
            pb.inc(size as u64);
        }
        pb.finish_and_clear();

        let found = if copied < len as u64 {
            copied
        } else {
            file.metadata().map_err(|e| Error::file(path, e))?.len()
        };
        if found != len as u64 {
            return Err(Error::FileChanged {
                path: path.to_path_buf(),
                expected: len,
                found,
            });
        }
        Ok(copied)
    }
}

fn resolve_data(data: &DataPlacement, opts: &AssembleOptions) -> Result<Segment, Error> {
    let path = &data.file;
    let file = File::open(path).map_err(|e| Error::file(path, e))?;
    let meta = file.metadata().map_err(|e| Error::file(path, e))?;
    if !meta.is_file() {
        return Err(Error::file(
            path,
            io::Error::new(io::ErrorKind::Other, "not a regular file"),
        ));
    }
    let size = u32::try_from(meta.len()).map_err(|_| Error::FileTooLarge {
        path: path.clone(),
        size: meta.len(),
    })?;

    let range = data.range_len();
    if let Some(range) = range {
        if size > range {
            return Err(Error::FileOutOfRange {
                path: path.clone(),
                size,
                range,
            });
        }
    }

    let config = SegmentConfig::new(opts.device, data.erase, opts.partition_field(data.partition));
    let offset = opts.target_offset(data.offset)?;

    if size == 0 {
        // an empty file only reserves its range for the boot ROM image
        let part_size = range.ok_or_else(|| {
            Error::file(
                path,
                io::Error::new(io::ErrorKind::InvalidData, "file is empty"),
            )
        })?;
        log::debug!("{} is empty, emitting a bootstream header", path.display());
        return Ok(Segment {
            kind: SegmentKind::Bootstream,
            header: SegmentHeader::new(config, offset, 0, part_size),
            source: None,
        });
    }

    Ok(Segment {
        kind: SegmentKind::Data,
        header: SegmentHeader::new(config, offset, size, range.unwrap_or(0)),
        source: Some(path.clone()),
    })
}

/// Plan and write an image in one go.
pub fn assemble(
    placements: &[Placement],
    opts: AssembleOptions,
    writer: impl Write,
) -> Result<u64, Error> {
    Image::plan(placements, opts)?.write_to(writer)
}
