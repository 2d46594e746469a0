//! Where each input file lands on the target flash.
//!
//! Tokens follow a small grammar, tried in this order:
//!
//! ```text
//! file@partition:erasemode:offset[-end]
//! file@start-end
//! file@start-
//! file@start
//! ```

use crate::{size::parse_size_u32, Error};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Nand = 0,
    Emmc = 1,
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Nand
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Nand => f.write_str("nand"),
            DeviceType::Emmc => f.write_str("emmc"),
        }
    }
}

/// How much flash is erased before a segment is programmed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EraseMode {
    All = 0,
    None = 1,
    Partition = 2,
    ToEnd = 3,
}

impl EraseMode {
    /// Unknown names fall back to [`EraseMode::None`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "erase_all" => EraseMode::All,
            "erase_none" => EraseMode::None,
            "erase_part" => EraseMode::Partition,
            "erase_end" => EraseMode::ToEnd,
            other => {
                log::warn!("unknown erase mode {:?}, using erase_none", other);
                EraseMode::None
            }
        }
    }
}

impl fmt::Display for EraseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EraseMode::All => "erase_all",
            EraseMode::None => "erase_none",
            EraseMode::Partition => "erase_part",
            EraseMode::ToEnd => "erase_end",
        })
    }
}

/// eMMC hardware partition a segment is written to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HwPartition {
    None,
    Boot0,
    Boot1,
    User,
    Rpmb,
}

impl HwPartition {
    /// Value of the header's 3-bit partition field.
    pub fn field(self) -> u8 {
        match self {
            HwPartition::None | HwPartition::User => 0,
            HwPartition::Boot0 => 1,
            HwPartition::Boot1 => 2,
            HwPartition::Rpmb => 3,
        }
    }
}

impl FromStr for HwPartition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(HwPartition::User),
            "boot0" => Ok(HwPartition::Boot0),
            "boot1" => Ok(HwPartition::Boot1),
            "rpmb" => Ok(HwPartition::Rpmb),
            other => Err(Error::InvalidArgument(format!(
                "unknown partition {:?} (expected user, boot0, boot1 or rpmb)",
                other
            ))),
        }
    }
}

/// Partition the eMMC boots from, selected by a partition-config marker.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BootPartition {
    Boot0,
    Boot1,
    User,
}

impl BootPartition {
    /// Value of the header's partition field, as in the eMMC PARTITION_CONFIG
    /// boot enable bits.
    pub fn field(self) -> u8 {
        match self {
            BootPartition::Boot0 => 1,
            BootPartition::Boot1 => 2,
            BootPartition::User => 7,
        }
    }
}

impl FromStr for BootPartition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boot0" => Ok(BootPartition::Boot0),
            "boot1" => Ok(BootPartition::Boot1),
            "user" => Ok(BootPartition::User),
            other => Err(Error::InvalidArgument(format!(
                "unknown boot partition {:?} (expected boot0, boot1 or user)",
                other
            ))),
        }
    }
}

/// A file placed at a flash offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPlacement {
    pub file: PathBuf,
    pub offset: u32,
    /// Exclusive end of the reserved range, if one was given.
    pub end: Option<u32>,
    pub erase: EraseMode,
    pub partition: HwPartition,
}

impl DataPlacement {
    pub fn new(file: impl Into<PathBuf>, offset: u32, erase: EraseMode) -> Self {
        DataPlacement {
            file: file.into(),
            offset,
            end: None,
            erase,
            partition: HwPartition::None,
        }
    }

    pub fn with_end(mut self, end: u32) -> Self {
        self.end = Some(end);
        self
    }

    /// Length of the reserved range, `None` without a range or when `end`
    /// does not lie past `offset`.
    pub fn range_len(&self) -> Option<u32> {
        self.end
            .and_then(|end| end.checked_sub(self.offset))
            .filter(|len| *len > 0)
    }
}

/// One entry of the image, before input files are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Data(DataPlacement),
    /// Header-only segment reserving `part_size` bytes for a boot ROM image.
    Bootstream {
        offset: u32,
        part_size: u32,
        erase: EraseMode,
        partition: HwPartition,
    },
    /// Header-only segment switching the active eMMC boot partition.
    PartitionConfig(BootPartition),
}

impl Placement {
    pub fn bootstream(offset: u32, part_size: u32) -> Self {
        Placement::Bootstream {
            offset,
            part_size,
            erase: EraseMode::None,
            partition: HwPartition::None,
        }
    }
}

/// Options that apply to the whole token list.
#[derive(Debug, Copy, Clone, Default)]
pub struct ParseOptions {
    pub device: DeviceType,
    /// The first segment erases the whole device.
    pub erase_all: bool,
    pub partconf: Option<BootPartition>,
}

/// Parse `--partconf=<name>` or a bare partition name.
pub fn parse_partconf(arg: &str) -> Result<BootPartition, Error> {
    arg.strip_prefix("--partconf=").unwrap_or(arg).parse()
}

/// Turn the caller's tokens into placements.
///
/// A leading `--partconf=` token is accepted here as well as through
/// [`ParseOptions::partconf`].
pub fn parse_placements<S: AsRef<str>>(
    tokens: &[S],
    opts: &ParseOptions,
) -> Result<Vec<Placement>, Error> {
    let mut tokens = tokens.iter().map(AsRef::as_ref).peekable();
    let mut partconf = opts.partconf;
    if let Some(token) = tokens.peek() {
        if token.starts_with("--partconf") {
            if partconf.is_some() {
                return Err(Error::InvalidArgument("partconf given twice".into()));
            }
            partconf = Some(parse_partconf(token)?);
            tokens.next();
        }
    }

    let mut placements = Vec::new();
    if let Some(boot) = partconf {
        if opts.device != DeviceType::Emmc {
            return Err(Error::InvalidArgument(
                "--partconf is only valid for emmc".into(),
            ));
        }
        placements.push(Placement::PartitionConfig(boot));
    }

    let mut default_erase = if opts.erase_all {
        EraseMode::All
    } else {
        EraseMode::None
    };
    for token in tokens {
        let placement = parse_token(token, default_erase, opts.device)?;
        log::debug!("{} -> {:x?}", token, placement);
        placements.push(Placement::Data(placement));
        // only the first segment may inherit the whole-device erase
        default_erase = EraseMode::None;
    }

    Ok(placements)
}

/// Parse one `file@...` token. `default_erase` applies unless the token
/// carries its own `partition:erasemode:` override.
pub fn parse_token(
    token: &str,
    default_erase: EraseMode,
    device: DeviceType,
) -> Result<DataPlacement, Error> {
    let invalid = || Error::InvalidArgument(format!("unrecognized placement {:?}", token));
    let (file, spec) = token.split_once('@').ok_or_else(invalid)?;
    if file.is_empty() || spec.is_empty() || spec.contains('@') {
        return Err(invalid());
    }

    let mut placement = DataPlacement::new(file, 0, default_erase);
    let range = if spec.contains(':') {
        let mut fields = spec.splitn(3, ':');
        let (partition, erase, range) = match (fields.next(), fields.next(), fields.next()) {
            (Some(p), Some(e), Some(r)) if !p.is_empty() && !r.is_empty() => (p, e, r),
            _ => return Err(invalid()),
        };
        placement.partition = match device {
            DeviceType::Emmc => partition.parse()?,
            DeviceType::Nand => {
                log::warn!("{}: partition field {:?} ignored on nand", token, partition);
                HwPartition::None
            }
        };
        placement.erase = EraseMode::from_name(erase);
        range
    } else {
        spec
    };

    let (start, end) = parse_range(range, invalid)?;
    placement.offset = start;
    if let Some(end) = end {
        if end <= start {
            return Err(Error::InvalidArgument(format!(
                "{}: end {:#x} is not past start {:#x}",
                token, end, start
            )));
        }
        placement.end = Some(end);
    }

    Ok(placement)
}

fn parse_range(
    range: &str,
    invalid: impl Fn() -> Error,
) -> Result<(u32, Option<u32>), Error> {
    match range.split_once('-') {
        Some((start, "")) => Ok((parse_size_u32(start)?, None)),
        Some((start, end)) => {
            if start.is_empty() || end.contains('-') {
                return Err(invalid());
            }
            Ok((parse_size_u32(start)?, Some(parse_size_u32(end)?)))
        }
        None => Ok((parse_size_u32(range)?, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(placement: &Placement) -> &DataPlacement {
        match placement {
            Placement::Data(data) => data,
            other => panic!("expected data placement, got {:?}", other),
        }
    }

    #[test]
    fn token_forms() {
        let p = parse_token("a.bin@0x100-0x200", EraseMode::None, DeviceType::Nand).unwrap();
        assert_eq!(p.file, PathBuf::from("a.bin"));
        assert_eq!((p.offset, p.end), (0x100, Some(0x200)));
        assert_eq!(p.range_len(), Some(0x100));

        let p = parse_token("a.bin@14M-", EraseMode::None, DeviceType::Nand).unwrap();
        assert_eq!((p.offset, p.end), (14 << 20, None));

        let p = parse_token("a.bin@17M", EraseMode::All, DeviceType::Nand).unwrap();
        assert_eq!((p.offset, p.end, p.erase), (17 << 20, None, EraseMode::All));
    }

    #[test]
    fn explicit_override() {
        let p = parse_token("u-boot@boot0:erase_part:0-1M", EraseMode::All, DeviceType::Emmc)
            .unwrap();
        assert_eq!(p.partition, HwPartition::Boot0);
        assert_eq!(p.erase, EraseMode::Partition);
        assert_eq!((p.offset, p.end), (0, Some(1 << 20)));

        let p = parse_token("x@rpmb:bogus:0", EraseMode::All, DeviceType::Emmc).unwrap();
        assert_eq!(p.erase, EraseMode::None);
        assert_eq!(p.partition, HwPartition::Rpmb);
    }

    #[test]
    fn partition_ignored_on_nand() {
        let p = parse_token("x@boot1:erase_end:0", EraseMode::None, DeviceType::Nand).unwrap();
        assert_eq!(p.partition, HwPartition::None);
        assert_eq!(p.erase, EraseMode::ToEnd);

        let p = parse_token("b@100:erase_all:200", EraseMode::None, DeviceType::Nand).unwrap();
        assert_eq!(p.partition, HwPartition::None);
        assert_eq!((p.offset, p.erase), (200, EraseMode::All));

        assert!(matches!(
            parse_token("b@100:erase_all:200", EraseMode::None, DeviceType::Emmc),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn range_len_never_underflows() {
        let p = DataPlacement::new("a", 0x200, EraseMode::None).with_end(0x100);
        assert_eq!(p.range_len(), None);
        let p = DataPlacement::new("a", 0x200, EraseMode::None).with_end(0x200);
        assert_eq!(p.range_len(), None);
        let p = DataPlacement::new("a", 0x100, EraseMode::None).with_end(0x200);
        assert_eq!(p.range_len(), Some(0x100));
    }

    #[test]
    fn erase_mode_resets_after_every_segment() {
        let tokens = ["a@0", "b@100:erase_all:200", "c@300"];
        let placements = parse_placements(&tokens, &ParseOptions::default()).unwrap();
        let modes: Vec<_> = placements.iter().map(|p| data(p).erase).collect();
        assert_eq!(modes, [EraseMode::None, EraseMode::All, EraseMode::None]);

        let opts = ParseOptions {
            erase_all: true,
            ..Default::default()
        };
        let placements = parse_placements(&["a@0", "b@1M", "c@2M"], &opts).unwrap();
        let modes: Vec<_> = placements.iter().map(|p| data(p).erase).collect();
        assert_eq!(modes, [EraseMode::All, EraseMode::None, EraseMode::None]);
    }

    #[test]
    fn partconf_comes_first() {
        let opts = ParseOptions {
            device: DeviceType::Emmc,
            ..Default::default()
        };
        let placements = parse_placements(&["--partconf=boot1", "a@0"], &opts).unwrap();
        assert_eq!(placements[0], Placement::PartitionConfig(BootPartition::Boot1));
        assert_eq!(data(&placements[1]).offset, 0);

        assert!(matches!(
            parse_placements(&["--partconf=boot2", "a@0"], &opts),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_placements(&["--partconf=user", "a@0"], &ParseOptions::default()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_malformed_tokens() {
        for token in &["file@@bad", "file", "@0", "file@", "file@1-2-3", "file@-5", "f@user:erase_all:"] {
            assert!(
                matches!(
                    parse_token(token, EraseMode::None, DeviceType::Nand),
                    Err(Error::InvalidArgument(_))
                ),
                "{}",
                token
            );
        }
        assert!(matches!(
            parse_token("file@1X", EraseMode::None, DeviceType::Nand),
            Err(Error::InvalidSize(_))
        ));
        assert!(matches!(
            parse_token("file@boot2:erase_all:0", EraseMode::None, DeviceType::Emmc),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_token("file@0x200-0x100", EraseMode::None, DeviceType::Nand),
            Err(Error::InvalidArgument(_))
        ));
    }
}
