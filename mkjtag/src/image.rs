mod header;
mod reader;

pub use header::{SegmentConfig, SegmentHeader, HEADER_SIZE, MAGIC};
pub use reader::{DecodedSegment, ImageReader};
