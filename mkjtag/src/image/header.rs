use crate::placement::{DeviceType, EraseMode};
use crate::Error;
use deku::prelude::*;

pub const MAGIC: &[u8; 2] = b"GW";
pub const HEADER_SIZE: usize = 16;

const ERASE_MASK: u16 = 0b11;
const PARTITION_SHIFT: u16 = 2;
const PARTITION_MASK: u16 = 0b111;
const COMPRESSED_BIT: u16 = 1 << 5;
const RESERVED_MASK: u16 = 0x1fc0;
const DEVICE_SHIFT: u16 = 13;

/// The fields packed into a segment's 16-bit config word.
///
/// ```text
/// 15..13  device type (0 nand, 1 emmc)
/// 12..6   reserved
///      5  compressed
///  4..2   partition
///  1..0   erase mode
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SegmentConfig {
    pub erase_mode: EraseMode,
    /// 3-bit partition field; see `HwPartition::field` and `BootPartition::field`.
    pub partition: u8,
    pub compressed: bool,
    pub device: DeviceType,
}

impl SegmentConfig {
    pub fn new(device: DeviceType, erase_mode: EraseMode, partition: u8) -> Self {
        SegmentConfig {
            erase_mode,
            partition,
            compressed: false,
            device,
        }
    }

    pub fn to_bits(&self) -> u16 {
        let mut bits = self.erase_mode as u16 & ERASE_MASK;
        bits |= (self.partition as u16 & PARTITION_MASK) << PARTITION_SHIFT;
        if self.compressed {
            bits |= COMPRESSED_BIT;
        }
        bits | (self.device as u16) << DEVICE_SHIFT
    }

    pub fn from_bits(bits: u16) -> Result<Self, Error> {
        if bits & RESERVED_MASK != 0 {
            return Err(Error::InvalidImage(format!(
                "reserved config bits set: {:#06x}",
                bits
            )));
        }
        let erase_mode = match bits & ERASE_MASK {
            0 => EraseMode::All,
            1 => EraseMode::None,
            2 => EraseMode::Partition,
            _ => EraseMode::ToEnd,
        };
        let device = match bits >> DEVICE_SHIFT {
            0 => DeviceType::Nand,
            1 => DeviceType::Emmc,
            other => {
                return Err(Error::InvalidImage(format!("unknown device type {}", other)))
            }
        };
        Ok(SegmentConfig {
            erase_mode,
            partition: ((bits >> PARTITION_SHIFT) & PARTITION_MASK) as u8,
            compressed: bits & COMPRESSED_BIT != 0,
            device,
        })
    }
}

/// Fixed-size header in front of every segment, all fields little endian.
#[derive(Debug, Default, Clone, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(magic = b"GW", endian = "little")]
pub struct SegmentHeader {
    pub config: u16,
    pub offset: u32,
    pub data_size: u32,
    pub part_size: u32,
}

impl SegmentHeader {
    pub fn new(config: SegmentConfig, offset: u32, data_size: u32, part_size: u32) -> Self {
        SegmentHeader {
            config: config.to_bits(),
            offset,
            data_size,
            part_size,
        }
    }

    pub fn segment_config(&self) -> Result<SegmentConfig, Error> {
        SegmentConfig::from_bits(self.config)
    }

    pub fn is_marker(&self) -> bool {
        self.data_size == 0 && self.part_size == 0
    }

    pub fn is_bootstream(&self) -> bool {
        self.data_size == 0 && self.part_size != 0
    }

    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self, Error> {
        if &bytes[..2] != MAGIC {
            return Err(Error::InvalidImage(format!(
                "bad segment magic {:02x?}",
                &bytes[..2]
            )));
        }
        let (_, header) = SegmentHeader::from_bytes((&bytes[..], 0))?;
        Ok(header)
    }
}
