use crate::placement::DeviceType;
use crate::Error;
use serde::Deserialize;
use std::env;
use std::fs::read;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "MKJTAG_CONFIG";
pub const CONFIG_FILE: &str = "mkjtag.toml";

pub const DEFAULT_EMMC_BLOCK_SIZE: u32 = 512;
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Tool defaults, read from `$MKJTAG_CONFIG` or `./mkjtag.toml`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Used when neither `--nand` nor `--emmc` is given.
    pub device: DeviceType,
    pub emmc_block_size: u32,
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device: DeviceType::Nand,
            emmc_block_size: DEFAULT_EMMC_BLOCK_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        let path = match env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => {
                let path = PathBuf::from(CONFIG_FILE);
                if !path.exists() {
                    return Ok(Config::default());
                }
                path
            }
        };
        Config::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, Error> {
        log::debug!("Loading config from {}", path.display());
        let data = read(path).map_err(|e| Error::file(path, e))?;
        Config::from_slice(&data)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        let config: Config = toml::from_slice(data)?;
        if config.chunk_size == 0 {
            return Err(Error::InvalidArgument("chunk_size must not be 0".into()));
        }
        if config.emmc_block_size == 0 {
            return Err(Error::InvalidArgument("emmc_block_size must not be 0".into()));
        }
        Ok(config)
    }
}
