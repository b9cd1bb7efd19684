use std::num::ParseIntError;

/// Fixed segment sizes of a direct-exec image
///
/// These are baked into the stub when it is built, never read from the
/// image itself. The segments follow each other in this order.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StubLayout {
    /// Length of the native stub, the embedded region starts here
    pub program_size: u64,
    /// Length of the toolchain binary
    pub busybox_size: u64,
    /// Length of the launch script
    pub script_size: u64,
    /// Length of the utility archive, only passed on to the script
    pub utils_size: u64,
}

impl StubLayout {
    /// Parse the four build-time constants
    pub fn from_strs(
        program_size: &str,
        busybox_size: &str,
        script_size: &str,
        utils_size: &str,
    ) -> Result<Self, ParseIntError> {
        Ok(StubLayout {
            program_size: program_size.trim().parse()?,
            busybox_size: busybox_size.trim().parse()?,
            script_size: script_size.trim().parse()?,
            utils_size: utils_size.trim().parse()?,
        })
    }

    /// Offset of the launch script
    pub fn script_offset(&self) -> u64 {
        self.program_size + self.busybox_size
    }

    /// Offset of the utility archive
    pub fn utils_offset(&self) -> u64 {
        self.script_offset() + self.script_size
    }

    /// Variables that let the launch script find the same segments again
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        vec![
            ("CONTY_PROGRAM_SIZE", self.program_size.to_string()),
            ("CONTY_BUSYBOX_SIZE", self.busybox_size.to_string()),
            ("CONTY_SCRIPT_SIZE", self.script_size.to_string()),
            ("CONTY_UTILS_SIZE", self.utils_size.to_string()),
        ]
    }
}
