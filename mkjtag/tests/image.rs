use mkjtag::image::{ImageReader, SegmentConfig, HEADER_SIZE};
use mkjtag::placement::{DataPlacement, DeviceType, EraseMode, HwPartition};
use mkjtag::{
    assemble, legacy_layout, parse_placements, AssembleOptions, Image, ParseOptions, Placement,
};
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use tempfile::TempDir;

fn make_files(dir: &TempDir, files: &[(&str, usize)]) -> Vec<(PathBuf, Vec<u8>)> {
    files
        .iter()
        .map(|(name, len)| {
            let data: Vec<u8> = (0..*len).map(|i| (i * 7 + name.len()) as u8).collect();
            let path = dir.path().join(name);
            fs::write(&path, &data).unwrap();
            (path, data)
        })
        .collect()
}

#[test]
fn decode_recovers_every_segment() {
    let dir = TempDir::new().unwrap();
    let files = make_files(&dir, &[("SPL", 3000), ("u-boot.img", 70_000), ("env", 1)]);
    let tokens: Vec<String> = vec![
        format!("{}@0-14M", files[0].0.display()),
        format!("{}@boot1:erase_part:14M-16M", files[1].0.display()),
        format!("{}@0x1000000", files[2].0.display()),
    ];
    let opts = ParseOptions {
        device: DeviceType::Emmc,
        erase_all: true,
        partconf: None,
    };
    let placements = parse_placements(&tokens, &opts).unwrap();
    let assemble_opts = AssembleOptions {
        device: DeviceType::Emmc,
        chunk_size: 4096,
        ..Default::default()
    };
    let image = Image::plan(&placements, assemble_opts).unwrap();

    let mut out = Vec::new();
    image.write_to(&mut out).unwrap();
    let expected_len: usize = files.iter().map(|(_, d)| HEADER_SIZE + d.len()).sum();
    assert_eq!(out.len(), expected_len);

    let decoded: Vec<_> = ImageReader::new(Cursor::new(out))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(decoded.len(), 3);
    for ((segment, planned), (_, data)) in decoded.iter().zip(image.segments()).zip(&files) {
        assert_eq!(segment.header, planned.header);
        assert_eq!(&segment.payload, data);
    }

    let expected = [
        (EraseMode::All, 0, 0, 14 << 20),
        (EraseMode::Partition, 2, (14 << 20) / 512, 2 << 20),
        (EraseMode::None, 0, (16 << 20) / 512, 0),
    ];
    for (segment, (erase, partition, offset, part_size)) in decoded.iter().zip(expected.iter()) {
        assert_eq!(
            segment.config,
            SegmentConfig::new(DeviceType::Emmc, *erase, *partition)
        );
        assert_eq!(segment.header.offset, *offset);
        assert_eq!(segment.header.part_size, *part_size);
    }
}

#[test]
fn erase_mode_does_not_carry_over() {
    let dir = TempDir::new().unwrap();
    let files = make_files(&dir, &[("a", 10), ("b", 10), ("c", 10)]);
    let tokens = [
        format!("{}@0", files[0].0.display()),
        format!("{}@100:erase_all:200", files[1].0.display()),
        format!("{}@300", files[2].0.display()),
    ];
    let placements = parse_placements(&tokens, &ParseOptions::default()).unwrap();
    let mut out = Vec::new();
    assemble(&placements, AssembleOptions::default(), &mut out).unwrap();

    let modes: Vec<_> = ImageReader::new(Cursor::new(out))
        .map(|s| s.unwrap().config.erase_mode)
        .collect();
    assert_eq!(modes, [EraseMode::None, EraseMode::All, EraseMode::None]);
}

#[test]
fn legacy_pair_ignores_file_contents() {
    let dir = TempDir::new().unwrap();
    for sizes in &[(1, 1), (4096, 100_000)] {
        let files = make_files(&dir, &[("X", sizes.0), ("Y", sizes.1)]);
        let names: Vec<_> = files.iter().map(|(p, _)| p.clone()).collect();
        let placements = legacy_layout(&names, DeviceType::Nand).unwrap();
        let image = Image::plan(&placements, AssembleOptions::default()).unwrap();

        let summary: Vec<_> = image
            .segments()
            .iter()
            .map(|s| (s.header.offset, s.header.part_size, s.header.config))
            .collect();
        let part = EraseMode::Partition as u16;
        assert_eq!(summary, [(0, 0xE00000, part), (0xE00000, 0x200000, part)]);
    }
}

#[test]
fn bootstream_header_has_no_payload() {
    let dir = TempDir::new().unwrap();
    let files = make_files(&dir, &[("u-boot.img", 512)]);
    let placements = [
        Placement::bootstream(0, 0xE00000),
        Placement::Data(DataPlacement::new(&files[0].0, 0xE00000, EraseMode::None)),
    ];
    let mut out = Vec::new();
    let written = assemble(&placements, AssembleOptions::default(), &mut out).unwrap();
    assert_eq!(written as usize, 2 * HEADER_SIZE + 512);

    let decoded: Vec<_> = ImageReader::new(Cursor::new(out))
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(decoded[0].header.is_bootstream());
    assert_eq!(decoded[0].header.data_size, 0);
    assert_eq!(decoded[0].header.part_size, 0xE00000);
    assert!(decoded[0].payload.is_empty());
    assert_eq!(decoded[1].payload, files[0].1);
}

#[test]
fn nand_never_encodes_partition() {
    let dir = TempDir::new().unwrap();
    let files = make_files(&dir, &[("a", 4)]);
    let mut placement = DataPlacement::new(&files[0].0, 0, EraseMode::ToEnd);
    placement.partition = HwPartition::Boot0;
    let image = Image::plan(&[Placement::Data(placement)], AssembleOptions::default()).unwrap();
    let config = image.segments()[0].header.segment_config().unwrap();
    assert_eq!(config.partition, 0);
    assert_eq!(config.device, DeviceType::Nand);
}
