use conty::{launcher, Config, StubLayout};
use env_logger::{from_env, Env};
use std::ffi::OsString;

fn main() {
    from_env(Env::new().filter_or("CONTY_LOG", "warn")).init();

    let layout = match StubLayout::from_strs(
        env!("CONTY_PROGRAM_SIZE"),
        env!("CONTY_BUSYBOX_SIZE"),
        env!("CONTY_SCRIPT_SIZE"),
        env!("CONTY_UTILS_SIZE"),
    ) {
        Ok(layout) => layout,
        Err(err) => fail(format!("bad built-in segment sizes: {}", err)),
    };
    let config = Config::from_env();
    let argv: Vec<OsString> = std::env::args_os().collect();

    let err = launcher::run_direct(&config, &layout, &argv);
    fail(format!("failed to execute builtin busybox, {}", err))
}

fn fail(message: String) -> ! {
    log::error!("{}", message);
    eprintln!("conty: {}", message);
    std::process::exit(1)
}
