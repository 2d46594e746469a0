use super::header::{SegmentConfig, SegmentHeader, HEADER_SIZE};
use crate::Error;
use std::io::{self, Read};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSegment {
    pub header: SegmentHeader,
    pub config: SegmentConfig,
    /// Empty for header-only segments, and when payloads are skipped.
    pub payload: Vec<u8>,
}

/// Walks an assembled image segment by segment.
pub struct ImageReader<R> {
    reader: R,
    keep_payload: bool,
    done: bool,
}

impl<R> ImageReader<R>
where
    R: Read,
{
    pub fn new(reader: R) -> ImageReader<R> {
        ImageReader {
            reader,
            keep_payload: true,
            done: false,
        }
    }

    /// Only decode headers, discarding payload bytes.
    pub fn headers_only(mut self) -> Self {
        self.keep_payload = false;
        self
    }

    fn read_header(&mut self) -> Result<Option<SegmentHeader>, Error> {
        let mut raw = [0u8; HEADER_SIZE];
        let mut filled = 0;
        while filled < HEADER_SIZE {
            match self.reader.read(&mut raw[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(None),
            HEADER_SIZE => SegmentHeader::parse(&raw).map(Some),
            n => Err(Error::InvalidImage(format!(
                "truncated header ({} of {} bytes)",
                n, HEADER_SIZE
            ))),
        }
    }

    fn read_segment(&mut self) -> Result<Option<DecodedSegment>, Error> {
        let header = match self.read_header()? {
            Some(header) => header,
            None => return Ok(None),
        };
        let config = header.segment_config()?;

        let len = header.data_size as u64;
        let mut payload = Vec::new();
        let mut take = (&mut self.reader).take(len);
        let copied = if self.keep_payload {
            take.read_to_end(&mut payload)? as u64
        } else {
            io::copy(&mut take, &mut io::sink())?
        };
        if copied != len {
            return Err(Error::InvalidImage(format!(
                "truncated payload at offset {:#x} ({} of {} bytes)",
                header.offset, copied, len
            )));
        }

        Ok(Some(DecodedSegment {
            header,
            config,
            payload,
        }))
    }
}

impl<R> Iterator for ImageReader<R>
where
    R: Read,
{
    type Item = Result<DecodedSegment, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let segment = self.read_segment();
        if !matches!(segment, Ok(Some(_))) {
            self.done = true;
        }
        segment.transpose()
    }
}
