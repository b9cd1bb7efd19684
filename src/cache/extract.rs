use crate::{cache::PayloadWriter, errors::ExtractError, image::Marker};
use std::{fs, io, io::Read, path::Path};

/// Size of the transfer buffer used for every payload
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Copy each payload from `reader` into `content_dir`, in marker order
///
/// `reader` must be positioned on the first payload byte, right after the
/// header sentinel. Payloads share the one stream and have no offsets of
/// their own, so this is strictly sequential. Each file is written under a
/// temporary name, gets its mode, and is then renamed into place.
pub fn extract<R: Read>(
    markers: &[Marker],
    reader: &mut R,
    content_dir: &Path,
) -> Result<(), ExtractError> {
    ensure_dir(content_dir)?;
    let mut buffer = vec![0u8; BUFFER_SIZE];
    for marker in markers {
        let dest_path = content_dir.join(marker.name());
        log::debug!(
            "extract {:?}, {} bytes, mode {:o}",
            dest_path,
            marker.size(),
            marker.mode()
        );
        let mut writer = PayloadWriter::create(&dest_path)?;
        copy_payload(marker.size(), reader, &mut writer, &mut buffer)?;
        writer.commit(marker.mode())?;
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<(), ExtractError> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(ExtractError::NotADirectory(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(ExtractError::io(path))
        }
        Err(e) => Err(ExtractError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn copy_payload<R: Read>(
    size: u64,
    reader: &mut R,
    writer: &mut PayloadWriter,
    buffer: &mut [u8],
) -> Result<(), ExtractError> {
    let mut remaining = size;
    while remaining > 0 {
        let want = remaining.min(buffer.len() as u64) as usize;
        let count = match reader.read(&mut buffer[..want]) {
            Ok(0) => {
                return Err(ExtractError::TruncatedPayload {
                    path: writer.dest_path().to_path_buf(),
                    expected: size,
                    found: size - remaining,
                })
            }
            Ok(count) => count,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ExtractError::io(writer.dest_path())(e)),
        };
        writer.write_chunk(&buffer[..count])?;
        remaining -= count as u64;
    }
    Ok(())
}
