mod assembler;
mod config;
mod error;
pub mod image;
mod layout;
mod legacy;
pub mod placement;
mod size;

pub use assembler::{assemble, AssembleOptions, Image, Segment, SegmentKind};
pub use config::Config;
pub use error::Error;
pub use layout::{LayoutEntry, LayoutFile};
pub use legacy::legacy_layout;
pub use placement::{parse_placements, ParseOptions, Placement};
pub use size::{parse_size, parse_size_u32};
