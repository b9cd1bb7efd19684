use conty::{
    cache::CacheDir,
    errors::{HeaderError, RuntimeError},
    image::pack,
    launcher::{prepare_cache, CacheState},
    Config, SelfImage,
};
use std::{
    ffi::OsString,
    fs,
    fs::OpenOptions,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    thread,
    time::{Duration, SystemTime},
};
use tempfile::TempDir;

const STUB: &[u8] = b"\x7fELF pretend this is a compiled launcher stub";

// Stands in for the real toolchain: logs each call and fakes its effects
const FAKE_TOOLCHAIN: &str = r#"#!/bin/sh
echo "$*" >> "$CONTY_TEST_LOG"
case "$1" in
    tar) cp "$3" "$5/unpacked" ;;
    --install) : > "$3/sh" ;;
esac
"#;

struct Fixture {
    dir: TempDir,
    image: PathBuf,
    config: Config,
}

impl Fixture {
    fn new(payloads: &[(&str, &[u8], u32)]) -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let sources = dir.path().join("sources");
        fs::create_dir(&sources).unwrap();
        let stub = sources.join("stub");
        fs::write(&stub, STUB).unwrap();

        let mut paths = Vec::new();
        for (name, data, mode) in payloads {
            let path = sources.join(name);
            fs::write(&path, data).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(*mode)).unwrap();
            paths.push(path);
        }
        let image = dir.path().join("image");
        pack::create_image(&stub, &paths, &image).unwrap();

        let config = Config::from_vars(vec![
            (OsString::from("PATH"), OsString::from("/usr/bin:/bin")),
            (
                OsString::from("HOME"),
                dir.path().join("home").into_os_string(),
            ),
            (
                OsString::from("CONTY_TEST_LOG"),
                dir.path().join("toolchain.log").into_os_string(),
            ),
        ]);
        Fixture { dir, image, config }
    }

    fn standard() -> Fixture {
        Fixture::new(&[
            ("busybox", FAKE_TOOLCHAIN.as_bytes(), 0o755),
            ("utils.tar.gz", b"pretend archive", 0o644),
            ("conty-start.sh", b"#!/bin/sh\nexec \"$@\"\n", 0o700),
        ])
    }

    fn cache(&self) -> CacheDir {
        CacheDir::from_config(&self.config).unwrap()
    }

    fn prepare(&self) -> Result<CacheState, RuntimeError> {
        let image = SelfImage::open(&self.image).unwrap();
        prepare_cache(&self.config, &image, STUB.len() as u64, &self.cache())
    }

    fn toolchain_log(&self) -> String {
        fs::read_to_string(self.dir.path().join("toolchain.log")).unwrap_or_default()
    }

    fn set_image_modified(&self, time: SystemTime) {
        let file = OpenOptions::new().write(true).open(&self.image).unwrap();
        file.set_modified(time).unwrap();
    }
}

fn mode(path: &Path) -> u32 {
    fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

// Only this test runs the extracted toolchain. Spawning from several test
// threads while others hold freshly written executables open for writing
// can fail with ETXTBSY.
#[test]
fn extract_skip_and_refresh() {
    let fixture = Fixture::standard();
    let cache = fixture.cache();
    let content = cache.content_dir();
    assert_eq!(
        cache.path(),
        fixture.dir.path().join("home/.local/share/conty")
    );

    // first run extracts and installs
    assert_eq!(fixture.prepare().unwrap(), CacheState::Extracted);
    assert_eq!(
        fs::read(content.join("busybox")).unwrap(),
        FAKE_TOOLCHAIN.as_bytes()
    );
    assert_eq!(mode(&content.join("busybox")), 0o755);
    assert_eq!(mode(&content.join("utils.tar.gz")), 0o644);
    assert_eq!(mode(&content.join("conty-start.sh")), 0o700);
    assert_eq!(
        fs::read(cache.utils_dir().join("unpacked")).unwrap(),
        b"pretend archive"
    );
    assert!(cache.utils_dir().join("busybox/sh").exists());
    let image_modified = fs::metadata(&fixture.image).unwrap().modified().unwrap();
    assert_eq!(cache.marker_modified(), Some(image_modified));
    assert_eq!(
        fixture.toolchain_log(),
        format!(
            "tar -xf {} -C {}\n--install -s {}\n",
            content.join("utils.tar.gz").display(),
            cache.utils_dir().display(),
            cache.utils_dir().join("busybox").display()
        )
    );

    // second run leaves everything alone
    fs::write(content.join("conty-start.sh"), b"edited").unwrap();
    assert_eq!(fixture.prepare().unwrap(), CacheState::Fresh);
    assert_eq!(fs::read(content.join("conty-start.sh")).unwrap(), b"edited");
    assert_eq!(fixture.toolchain_log().lines().count(), 2);

    // a newer image extracts again and moves the marker to its mtime
    let upgraded = image_modified + Duration::from_secs(60);
    fixture.set_image_modified(upgraded);
    assert_eq!(fixture.prepare().unwrap(), CacheState::Extracted);
    assert_eq!(
        fs::read(content.join("conty-start.sh")).unwrap(),
        b"#!/bin/sh\nexec \"$@\"\n"
    );
    assert_eq!(cache.marker_modified(), Some(upgraded));
    assert_eq!(fixture.toolchain_log().lines().count(), 4);
    assert_eq!(fixture.prepare().unwrap(), CacheState::Fresh);
}

#[test]
fn older_image_is_still_fresh() {
    let fixture = Fixture::standard();
    let cache = fixture.cache();
    fs::create_dir_all(cache.path()).unwrap();
    cache.stamp(SystemTime::now() + Duration::from_secs(3600)).unwrap();
    assert_eq!(fixture.prepare().unwrap(), CacheState::Fresh);
    assert!(!cache.content_dir().exists());
}

#[test]
fn waiter_finds_cache_fresh_after_lock() {
    let fixture = Fixture::standard();
    let cache = fixture.cache();
    let image = SelfImage::open(&fixture.image).unwrap();
    let lock = cache.lock().unwrap();

    let config = fixture.config.clone();
    let image_path = fixture.image.clone();
    let waiter_cache = cache.clone();
    let waiter = thread::spawn(move || {
        let image = SelfImage::open(&image_path).unwrap();
        prepare_cache(&config, &image, STUB.len() as u64, &waiter_cache)
            .map_err(|err| err.to_string())
    });

    // the lock is exclusive, so the other invocation has to wait for it
    thread::sleep(Duration::from_millis(300));
    assert!(!waiter.is_finished());

    // meanwhile this invocation finishes its extraction
    cache.stamp(image.modified()).unwrap();
    drop(lock);

    assert_eq!(waiter.join().unwrap(), Ok(CacheState::Fresh));
    assert_eq!(fixture.toolchain_log(), "");
    assert!(!cache.content_dir().exists());
}

#[test]
fn missing_payload_is_reported_before_writing() {
    let fixture = Fixture::new(&[
        ("busybox", FAKE_TOOLCHAIN.as_bytes(), 0o755),
        ("conty-start.sh", b"#!/bin/sh\n", 0o755),
    ]);
    assert!(matches!(
        fixture.prepare(),
        Err(RuntimeError::MissingPayload("utils.tar.gz"))
    ));
    assert!(!fixture.cache().content_dir().exists());
    assert!(fixture.cache().marker_modified().is_none());
}

#[test]
fn corrupt_header() {
    let fixture = Fixture::standard();
    let mut bytes = fs::read(&fixture.image).unwrap();
    bytes.truncate(STUB.len() + 20);
    fs::write(&fixture.image, &bytes).unwrap();
    assert!(matches!(
        fixture.prepare(),
        Err(RuntimeError::Header(HeaderError::CorruptHeader))
    ));
    assert!(fixture.cache().marker_modified().is_none());
}

#[test]
fn wrong_program_size() {
    // lands inside the first size field, leaving a single '@' on the line
    let fixture = Fixture::standard();
    let image = SelfImage::open(&fixture.image).unwrap();
    let offset = STUB.len() as u64 + 5;
    let result = prepare_cache(&fixture.config, &image, offset, &fixture.cache());
    assert!(matches!(
        result,
        Err(RuntimeError::Header(HeaderError::Malformed(_)))
    ));
}

#[test]
fn truncated_payload_leaves_no_marker() {
    let fixture = Fixture::standard();
    let mut bytes = fs::read(&fixture.image).unwrap();
    bytes.truncate(bytes.len() - 4);
    fs::write(&fixture.image, &bytes).unwrap();
    assert!(matches!(
        fixture.prepare(),
        Err(RuntimeError::Extract(_))
    ));
    let content = fixture.cache().content_dir();
    assert!(content.join("busybox").exists());
    assert!(!content.join("conty-start.sh").exists());
    assert!(fixture.cache().marker_modified().is_none());
}

#[test]
fn no_base_directory() {
    let config = Config::from_vars(vec![("PATH", "/bin")]);
    assert!(matches!(
        CacheDir::from_config(&config),
        Err(RuntimeError::NoBaseDirectory)
    ));
}
