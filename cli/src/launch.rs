use conty::{launcher, Config};
use env_logger::{from_env, Env};
use std::ffi::OsString;

/// Length of this stub, where the header starts
const PROGRAM_SIZE: &str = env!("CONTY_PROGRAM_SIZE");

fn main() {
    // every argument belongs to the entry script, so logging is set up
    // from the environment only
    from_env(Env::new().filter_or("CONTY_LOG", "warn")).init();

    let program_size = match PROGRAM_SIZE.parse::<u64>() {
        Ok(size) => size,
        Err(err) => fail(format!("bad built-in program size: {}", err)),
    };
    let config = Config::from_env();
    let argv: Vec<OsString> = std::env::args_os().collect();

    let err = launcher::run_extracting(&config, program_size, &argv);
    fail(err.to_string())
}

fn fail(message: String) -> ! {
    log::error!("{}", message);
    eprintln!("conty: {}", message);
    std::process::exit(1)
}
