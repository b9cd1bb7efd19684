use crate::{errors::HeaderError, image::Marker};
use std::io::{BufRead, Read, Write};

/// Line that ends the header; payload bytes follow it directly
pub const SENTINEL: &[u8] = b"@CONTY_MARKER_END@\n";

/// Longest header line accepted, newline included
pub const MAX_LINE_LEN: usize = 4096;

/// The ordered list of embedded files
///
/// Payloads are stored back to back after the sentinel, in marker order and
/// without padding, so the markers must be consumed in this order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Header {
    markers: Vec<Marker>,
    len: u64,
}

impl Header {
    /// Build a header from markers, computing its encoded length
    pub fn new(markers: Vec<Marker>) -> Self {
        let len = markers
            .iter()
            .map(|marker| marker.to_line().len() as u64)
            .sum::<u64>()
            + SENTINEL.len() as u64;
        Header { markers, len }
    }

    /// Read lines up to and including the sentinel
    ///
    /// On success the reader is positioned at the first payload byte.
    pub fn read_from<R: BufRead>(reader: &mut R) -> Result<Self, HeaderError> {
        let mut markers = Vec::new();
        let mut len = 0u64;
        let mut line = Vec::with_capacity(256);
        loop {
            line.clear();
            let count = reader
                .by_ref()
                .take(MAX_LINE_LEN as u64)
                .read_until(b'\n', &mut line)?;
            len += count as u64;
            if line.last() != Some(&b'\n') {
                return Err(if count == MAX_LINE_LEN {
                    HeaderError::LineTooLong(MAX_LINE_LEN)
                } else {
                    HeaderError::CorruptHeader
                });
            }
            if line.len() == SENTINEL.len() && line == SENTINEL {
                break;
            }
            let marker = Marker::parse(&line[..line.len() - 1])?;
            log::trace!("header {:?}", marker);
            markers.push(marker);
        }
        if markers.is_empty() {
            return Err(HeaderError::NoMarkers);
        }
        Ok(Header { markers, len })
    }

    /// Write every marker line and the sentinel
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for marker in &self.markers {
            writer.write_all(&marker.to_line())?;
        }
        writer.write_all(SENTINEL)
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Encoded size in bytes, sentinel included
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Sum of all payload sizes
    pub fn payload_len(&self) -> u64 {
        self.markers.iter().map(Marker::size).sum()
    }

    /// Find a marker by its flattened name
    pub fn find<S: AsRef<std::ffi::OsStr>>(&self, name: S) -> Option<&Marker> {
        let name = name.as_ref();
        self.markers.iter().find(|marker| marker.name() == name)
    }
}
