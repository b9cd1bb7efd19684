//! Writing images, the build-side counterpart of the parser

use crate::{
    errors::PackError,
    image::{write_region, Header, Marker, StubLayout},
};
use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Write},
    os::unix::fs::{OpenOptionsExt, PermissionsExt},
    path::{Path, PathBuf},
};

/// Describe a payload file by its mode, length and file name
pub fn marker_for(path: &Path) -> Result<Marker, PackError> {
    let metadata = fs::metadata(path).map_err(PackError::io(path))?;
    let name = path
        .file_name()
        .ok_or_else(|| PackError::NoFileName(path.to_path_buf()))?;
    Ok(Marker::new(
        metadata.permissions().mode() & 0o7777,
        metadata.len(),
        name,
    )?)
}

/// Write `stub`, a header for `payloads`, and the payload bytes to `output`
pub fn create_image(stub: &Path, payloads: &[PathBuf], output: &Path) -> Result<Header, PackError> {
    let mut markers = Vec::with_capacity(payloads.len());
    let mut files = Vec::with_capacity(payloads.len());
    for path in payloads {
        markers.push(marker_for(path)?);
        files.push(File::open(path).map_err(PackError::io(path))?);
    }
    let header = Header::new(markers);

    let mut writer = open_output(output)?;
    copy_file(stub, &mut writer, output)?;
    write_region(&mut writer, &header, &mut files).map_err(PackError::io(output))?;
    writer.flush().map_err(PackError::io(output))?;
    log::info!(
        "wrote {:?}, {} files, {} payload bytes",
        output,
        header.markers().len(),
        header.payload_len()
    );
    Ok(header)
}

/// Write the fixed segments of a direct-exec image, returning their sizes
pub fn create_direct_image(
    stub: &Path,
    busybox: &Path,
    script: &Path,
    utils: &Path,
    output: &Path,
) -> Result<StubLayout, PackError> {
    let mut writer = open_output(output)?;
    let layout = StubLayout {
        program_size: copy_file(stub, &mut writer, output)?,
        busybox_size: copy_file(busybox, &mut writer, output)?,
        script_size: copy_file(script, &mut writer, output)?,
        utils_size: copy_file(utils, &mut writer, output)?,
    };
    writer.flush().map_err(PackError::io(output))?;
    log::info!("wrote {:?}, {:?}", output, layout);
    Ok(layout)
}

fn open_output(output: &Path) -> Result<BufWriter<File>, PackError> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o755)
        .open(output)
        .map_err(PackError::io(output))?;
    Ok(BufWriter::new(file))
}

fn copy_file<W: Write>(path: &Path, writer: &mut W, output: &Path) -> Result<u64, PackError> {
    let mut file = File::open(path).map_err(PackError::io(path))?;
    io::copy(&mut file, writer).map_err(PackError::io(output))
}
