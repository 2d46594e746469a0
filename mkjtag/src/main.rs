use env_logger::Env;
use main_error::MainError;
use mkjtag::{
    image::ImageReader,
    legacy_layout, parse_placements,
    placement::{parse_partconf, BootPartition, DeviceType},
    AssembleOptions, Config, Error, Image, LayoutFile, ParseOptions, Placement,
};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use structopt::StructOpt;

/// Assemble a JTAG flash programming image.
///
/// Placements are `file@offset`, `file@start-`, `file@start-end` or
/// `file@partition:erasemode:offset[-end]`. Without -s/-e, one to three
/// plain files select the legacy NAND layout: `rootfs`, `spl uboot` or
/// `spl uboot rootfs`.
#[derive(StructOpt)]
#[structopt(name = "mkjtag")]
struct Opt {
    /// Target NAND flash (default)
    #[structopt(long)]
    nand: bool,
    /// Target eMMC flash
    #[structopt(long)]
    emmc: bool,
    /// Don't erase the whole device before the first segment
    #[structopt(short = "s")]
    no_erase: bool,
    /// Erase the whole device before the first segment
    #[structopt(short = "e")]
    erase_all: bool,
    /// Select the active eMMC boot partition: boot0, boot1 or user
    #[structopt(long, parse(try_from_str = parse_partconf))]
    partconf: Option<BootPartition>,
    /// Read placements from a TOML layout file
    #[structopt(short, long, parse(from_os_str))]
    layout: Option<PathBuf>,
    /// Write the image to a file instead of stdout
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,
    /// Print the segments of an existing image and exit
    #[structopt(long, parse(from_os_str))]
    inspect: Option<PathBuf>,
    /// Log everything
    #[structopt(short, long)]
    verbose: bool,
    /// Placements, or files for the legacy layout
    tokens: Vec<String>,
}

impl Opt {
    fn device(&self, config: &Config) -> Result<DeviceType, Error> {
        match (self.nand, self.emmc) {
            (true, true) => Err(Error::Usage("--nand and --emmc conflict".into())),
            (true, false) => Ok(DeviceType::Nand),
            (false, true) => Ok(DeviceType::Emmc),
            (false, false) => Ok(config.device),
        }
    }

    fn placements(&self, device: DeviceType) -> Result<Vec<Placement>, Error> {
        if self.no_erase && self.erase_all {
            return Err(Error::Usage("-s and -e conflict".into()));
        }

        if let Some(path) = &self.layout {
            if !self.tokens.is_empty() {
                return Err(Error::Usage("--layout can't be combined with placements".into()));
            }
            if self.partconf.is_some() {
                return Err(Error::Usage("set partconf in the layout file".into()));
            }
            let mut layout = LayoutFile::load(path)?;
            layout.erase_all |= self.erase_all;
            return layout.placements(device);
        }

        if self.tokens.is_empty() {
            return Err(Error::Usage("no input files".into()));
        }
        let placement_mode =
            self.no_erase || self.erase_all || self.tokens.iter().any(|t| t.contains('@'));
        if placement_mode {
            let opts = ParseOptions {
                device,
                erase_all: self.erase_all,
                partconf: self.partconf,
            };
            parse_placements(&self.tokens, &opts)
        } else {
            if self.partconf.is_some() {
                return Err(Error::Usage("--partconf needs -s or -e".into()));
            }
            legacy_layout(&self.tokens, device)
        }
    }
}

fn inspect(path: &Path) -> Result<(), Error> {
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0;
    for segment in ImageReader::new(reader).headers_only() {
        let segment = segment?;
        let (header, config) = (&segment.header, &segment.config);
        let kind = if header.is_marker() {
            " partconf"
        } else if header.is_bootstream() {
            " bootstream"
        } else {
            ""
        };
        log::info!(
            "{:>3}: {} {} partition: {} offset: {:#x} size: {} part size: {:#x}{}",
            count,
            config.device,
            config.erase_mode,
            config.partition,
            header.offset,
            header.data_size,
            header.part_size,
            kind
        );
        count += 1;
    }
    log::info!("{} segments", count);
    Ok(())
}

fn run(args: &Opt) -> Result<(), Error> {
    let config = Config::load()?;
    if let Some(path) = &args.inspect {
        return inspect(path);
    }

    let device = args.device(&config)?;
    let placements = args.placements(device)?;
    let image = Image::plan(&placements, AssembleOptions::from_config(&config, device))?;

    match &args.output {
        Some(path) => {
            image.write_to(BufWriter::new(File::create(path)?))?;
        }
        None => {
            let stdout = io::stdout();
            image.write_to(BufWriter::new(stdout.lock()))?;
        }
    }

    Ok(())
}

#[paw::main]
fn main(args: Opt) -> Result<(), MainError> {
    let filter = if args.verbose {
        "mkjtag=trace"
    } else {
        "mkjtag=info"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .init();

    if let Err(e) = run(&args) {
        if e.is_usage() {
            let _ = Opt::clap().write_help(&mut io::stderr());
            eprintln!();
        }
        return Err(e.into());
    }

    Ok(())
}
