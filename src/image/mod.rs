//! The embedded region of a self-extracting image
//!
//! An image file is laid out as:
//!
//! ```text
//! [native stub][header lines][sentinel line][payload bytes...]
//! ```
//!
//! Each header line is `<octal-mode>@<decimal-size>@<name>\n` and the
//! sentinel is `@CONTY_MARKER_END@\n`. The stub length is a build-time
//! constant of the stub itself.


mod header;
mod layout;
mod locator;
mod marker;
pub mod pack;

pub use header::{Header, MAX_LINE_LEN, SENTINEL};
pub use layout::StubLayout;
pub use locator::SelfImage;
pub use marker::{
    flatten_name, parse_mode, Marker, DEFAULT_MODE, FLATTEN_BYTE, MAX_MODE, MAX_NAME_LEN,
};

use std::io::{self, Read, Write};

/// Write `header` followed by each payload in marker order
///
/// Every payload must produce exactly as many bytes as its marker says.
pub fn write_region<W, R>(writer: &mut W, header: &Header, payloads: &mut [R]) -> io::Result<()>
where
    W: Write,
    R: Read,
{
    if payloads.len() != header.markers().len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "payload count does not match header",
        ));
    }
    header.write_to(writer)?;
    for (marker, payload) in header.markers().iter().zip(payloads.iter_mut()) {
        let copied = io::copy(&mut payload.by_ref().take(marker.size()), writer)?;
        if copied != marker.size() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("payload {:?} shorter than its marker", marker.name()),
            ));
        }
    }
    Ok(())
}
