//! Low/high memory watermark flags.
//!
//! Some kernels expose memory pressure as two flag files under
//! /sys/kernel, each holding an ASCII `0` or `1`. Both files must be readable
//! at startup for the flags to be shown at all.

/// Low watermark flag file, relative to the sysfs root.
pub const LOW_WATERMARK: &str = "kernel/low_watermark";
/// High watermark flag file, relative to the sysfs root.
pub const HIGH_WATERMARK: &str = "kernel/high_watermark";

/// Watermark state sampled once per round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatermarkFlags {
    pub low: bool,
    pub high: bool,
}

impl WatermarkFlags {
    /// Two-letter label for the BL report column.
    pub fn label(&self) -> &'static str {
        match (self.low, self.high) {
            (true, true) => "BL",
            (true, false) => "B-",
            // Only the high mark set should not happen.
            (false, true) => "-L",
            (false, false) => "--",
        }
    }
}

/// A flag is set when the file starts with `1`.
pub fn parse_flag(content: &[u8]) -> bool {
    content.first() == Some(&b'1')
}
