#[macro_use] extern crate clap;

use clap::{App, ArgMatches};
use conty::{image::pack, Header, SelfImage};
use env_logger::{from_env, Env};
use std::{
    error::Error,
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

fn main() {
    let yaml = load_yaml!("pack.yml");
    let matches = App::from_yaml(yaml).get_matches();

    let log_level = matches.value_of("log_level").unwrap_or("warn");
    from_env(Env::new().filter_or("CONTY_LOG", log_level)).init();

    let result = match matches.subcommand() {
        ("create", Some(sub)) => create(sub),
        ("direct", Some(sub)) => direct(sub),
        ("list", Some(sub)) => list(sub),
        _ => Ok(()),
    };
    if let Err(err) = result {
        log::error!("{}", err);
        eprintln!("conty-pack: {}", err);
        std::process::exit(1);
    }
}

fn create(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let stub = path_value(matches, "stub");
    let output = path_value(matches, "output");
    let files: Vec<PathBuf> = matches
        .values_of_os("files")
        .into_iter()
        .flatten()
        .map(PathBuf::from)
        .collect();

    let stub_len = std::fs::metadata(&stub)?.len();
    let header = pack::create_image(&stub, &files, &output)?;
    println!("stub size (CONTY_PROGRAM_SIZE): {}", stub_len);
    println!("header size: {}", header.len());
    println!("payload size: {}", header.payload_len());
    Ok(())
}

fn direct(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let layout = pack::create_direct_image(
        &path_value(matches, "stub"),
        &path_value(matches, "busybox"),
        &path_value(matches, "script"),
        &path_value(matches, "utils"),
        &path_value(matches, "output"),
    )?;
    for (name, value) in layout.env_vars() {
        println!("{}={}", name, value);
    }
    Ok(())
}

fn list(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let offset: u64 = value_t!(matches, "offset", u64)?;
    let image = SelfImage::open(&path_value(matches, "image"))?;
    let header = Header::read_from(&mut image.reader_at(offset)?)?;

    let mut position = offset + header.len();
    for marker in header.markers() {
        println!(
            "{:04o} {:>12} {:>12} {}",
            marker.mode(),
            position,
            marker.size(),
            String::from_utf8_lossy(marker.name().as_bytes())
        );
        position += marker.size();
    }
    Ok(())
}

fn path_value(matches: &ArgMatches, name: &str) -> PathBuf {
    matches
        .value_of_os(name)
        .map(Path::new)
        .map(Path::to_path_buf)
        .unwrap_or_default()
}
