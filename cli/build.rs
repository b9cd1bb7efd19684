use std::env::var;

// Segment sizes are baked into the stubs. The image build compiles the stub
// once, measures it, and compiles again with the real values set.
const SIZE_VARS: &[&str] = &[
    "CONTY_PROGRAM_SIZE",
    "CONTY_BUSYBOX_SIZE",
    "CONTY_SCRIPT_SIZE",
    "CONTY_UTILS_SIZE",
];

fn main() {
    for name in SIZE_VARS {
        println!("cargo:rerun-if-env-changed={}", name);
        let value = var(name).unwrap_or_else(|_| "0".to_string());
        if value.trim().parse::<u64>().is_err() {
            panic!("{} must be a byte count, found {:?}", name, value);
        }
        println!("cargo:rustc-env={}={}", name, value.trim());
    }
}
