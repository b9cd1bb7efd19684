use crate::errors::ExtractError;
use std::{
    ffi::OsString,
    fs,
    fs::{File, OpenOptions, Permissions},
    io,
    io::Write,
    os::unix::{ffi::OsStringExt, fs::PermissionsExt},
    path::{Path, PathBuf},
};

/// Writes one payload next to its destination, then renames it into place
///
/// Until [PayloadWriter::commit] succeeds the destination is untouched, so
/// an interrupted extraction never leaves a partial file under a final name.
/// Dropping an uncommitted writer deletes the temporary file.
#[derive(Debug)]
pub struct PayloadWriter<W = File> {
    sink: Option<W>,
    temp_path: Option<PathBuf>,
    dest_path: PathBuf,
    written: u64,
}

impl PayloadWriter<File> {
    pub fn create(dest_path: &Path) -> Result<Self, ExtractError> {
        let temp_path = temp_path_for(dest_path);
        let temp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(ExtractError::io(&temp_path))?;
        Ok(PayloadWriter::from_parts(temp_file, temp_path, dest_path))
    }
}

impl<W> PayloadWriter<W> {
    /// Wrap a sink that is already writing to `temp_path`
    pub fn from_parts(sink: W, temp_path: PathBuf, dest_path: &Path) -> Self {
        PayloadWriter {
            sink: Some(sink),
            temp_path: Some(temp_path),
            dest_path: dest_path.to_path_buf(),
            written: 0,
        }
    }

    pub fn dest_path(&self) -> &Path {
        &self.dest_path
    }

    /// Total bytes accepted so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Delete the temporary file backing this writer
    pub fn remove_temp(&mut self) -> Result<(), ExtractError> {
        self.sink.take();
        if let Some(path) = self.temp_path.take() {
            fs::remove_file(&path).map_err(ExtractError::io(&path))?;
        }
        Ok(())
    }
}

impl<W: Write> PayloadWriter<W> {
    /// Write one chunk with a single call, a partial write is an error
    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ExtractError> {
        let dest_path = &self.dest_path;
        let sink = self.sink.as_mut().ok_or_else(|| closed(dest_path))?;
        let written = loop {
            match sink.write(chunk) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => break result.map_err(ExtractError::io(&self.dest_path))?,
            }
        };
        self.written += written as u64;
        if written != chunk.len() {
            return Err(ExtractError::ShortWrite {
                path: self.dest_path.clone(),
                expected: chunk.len(),
                written,
            });
        }
        Ok(())
    }

    /// Apply the permission bits and move the file over its destination
    pub fn commit(mut self, mode: u32) -> Result<(), ExtractError> {
        let sink = self.sink.take();
        let temp_path = self
            .temp_path
            .take()
            .ok_or_else(|| closed(&self.dest_path))?;
        let result = finish(sink, &temp_path, &self.dest_path, mode);
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }
}

impl<W> Drop for PayloadWriter<W> {
    fn drop(&mut self) {
        if let Err(err) = self.remove_temp() {
            log::warn!("leftover temporary file, {}", err);
        }
    }
}

fn closed(path: &Path) -> ExtractError {
    ExtractError::Io {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::Other, "payload writer already closed"),
    }
}

fn finish<W: Write>(
    sink: Option<W>,
    temp_path: &Path,
    dest_path: &Path,
    mode: u32,
) -> Result<(), ExtractError> {
    // closed before the rename, the result may be executed right away
    if let Some(mut sink) = sink {
        sink.flush().map_err(ExtractError::io(temp_path))?;
    }
    fs::set_permissions(temp_path, Permissions::from_mode(mode))
        .map_err(ExtractError::io(dest_path))?;
    fs::rename(temp_path, dest_path).map_err(ExtractError::io(dest_path))
}

/// `.name.<pid>-<random>.tmp` in the destination's own directory
fn temp_path_for(dest_path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    if let Some(file_name) = dest_path.file_name() {
        name.push(file_name);
    }
    name.push(format!(".{}-{:x}.tmp", std::process::id(), rand::random::<u64>()));
    // keep the temp name within the file name limit
    let mut bytes = name.into_vec();
    if bytes.len() > crate::image::MAX_NAME_LEN {
        let excess = bytes.len() - crate::image::MAX_NAME_LEN;
        bytes.drain(1..1 + excess);
    }
    dest_path.with_file_name(OsString::from_vec(bytes))
}

#[cfg(test)]
mod test {
    use super::*;

    /// Accepts at most `limit` bytes per call, like a full disk or a pipe
    struct Limited {
        inner: File,
        limit: usize,
    }

    impl Write for Limited {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let len = buf.len().min(self.limit);
            self.inner.write(&buf[..len])
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    #[test]
    fn temp_paths() {
        let temp = temp_path_for(Path::new("/cache/content/busybox"));
        assert_eq!(temp.parent(), Some(Path::new("/cache/content")));
        let name = temp.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".busybox."));
        assert!(name.ends_with(".tmp"));

        let long = "x".repeat(crate::image::MAX_NAME_LEN);
        let temp = temp_path_for(&Path::new("/c").join(&long));
        assert_eq!(
            temp.file_name().unwrap().len(),
            crate::image::MAX_NAME_LEN
        );
    }

    #[test]
    fn commit_and_drop() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("payload");

        let mut writer = PayloadWriter::create(&dest).unwrap();
        writer.write_chunk(b"hello").unwrap();
        assert_eq!(writer.written(), 5);
        assert!(!dest.exists());
        writer.commit(0o750).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"hello");
        assert_eq!(
            fs::metadata(&dest).unwrap().permissions().mode() & 0o7777,
            0o750
        );

        let mut writer = PayloadWriter::create(&dest).unwrap();
        writer.write_chunk(b"discarded").unwrap();
        drop(writer);
        assert_eq!(fs::read(&dest).unwrap(), b"hello");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn short_write_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("busybox");
        let temp_path = temp_path_for(&dest);
        let sink = Limited {
            inner: File::create(&temp_path).unwrap(),
            limit: 4,
        };

        let mut writer = PayloadWriter::from_parts(sink, temp_path, &dest);
        writer.write_chunk(b"abc").unwrap();
        match writer.write_chunk(b"hello world") {
            Err(ExtractError::ShortWrite {
                path,
                expected,
                written,
            }) => {
                assert_eq!(path, dest);
                assert_eq!(expected, 11);
                assert_eq!(written, 4);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(writer.written(), 7);
        drop(writer);

        assert!(!dest.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
