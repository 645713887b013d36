// Boot Settings

use serde::Deserialize;
use serde_json_core::*;

/// Contents of the boot configuration file.
///
/// Paths are written with `/` separators; the JSON reader does not unescape
/// strings, so a `\\` would reach the firmware as two backslashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootSettings<'a> {
    #[serde(default = "config_default_kernel", borrow)]
    kernel: &'a str,

    #[serde(default = "config_default_cmdline", borrow)]
    cmdline: &'a str,

    #[serde(default)]
    debug: bool,

    #[serde(default)]
    dump_headers: bool,

    #[serde(default = "config_default_pause_on_error")]
    pause_on_error: bool,
}

fn config_default_kernel() -> &'static str {
    "/kernel.elf"
}

fn config_default_cmdline() -> &'static str {
    ""
}

fn config_default_pause_on_error() -> bool {
    true
}

impl Default for BootSettings<'_> {
    fn default() -> Self {
        Self {
            kernel: config_default_kernel(),
            cmdline: config_default_cmdline(),
            debug: false,
            dump_headers: false,
            pause_on_error: config_default_pause_on_error(),
        }
    }
}

impl<'a> BootSettings<'a> {
    pub const DEFAULT_CONFIG_PATH: &'static str = "/EFI/BOOT/config.json";

    #[inline]
    pub fn load(json: &'a str) -> de::Result<Self> {
        serde_json_core::from_str(json).map(|v| v.0)
    }

    #[inline]
    pub const fn kernel_path(&self) -> &'a str {
        self.kernel
    }

    #[inline]
    pub const fn cmdline(&self) -> &'a str {
        self.cmdline
    }

    #[inline]
    pub const fn is_debug_mode(&self) -> bool {
        self.debug
    }

    /// Header dump is implied by debug mode.
    #[inline]
    pub const fn dump_headers(&self) -> bool {
        self.dump_headers || self.debug
    }

    /// Wait for a key before returning a fatal error to the firmware.
    #[inline]
    pub const fn pause_on_error(&self) -> bool {
        self.pause_on_error
    }

    #[inline]
    pub const fn log_level(&self) -> log::LevelFilter {
        if self.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }
}
