//! Memory parsing for /proc/<pid>/smaps.
//!
//! The monitor reports private memory only. Clean pages come from
//! `Private_Clean`; dirty pages from `Private_Dirty` plus `Swap`, because
//! swapped-out private pages would otherwise sit in dirty memory. Shared pages
//! can be swapped too, so the dirty figure is an approximation.

const PRIVATE_CLEAN: &[u8] = b"Private_Clean:";
const PRIVATE_DIRTY: &[u8] = b"Private_Dirty:";
const SWAP: &[u8] = b"Swap:";

/// Private memory of one process in kilobytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrivateMemory {
    pub clean_kb: u64,
    pub dirty_kb: u64,
}

impl PrivateMemory {
    pub fn total_kb(&self) -> u64 {
        self.clean_kb.saturating_add(self.dirty_kb)
    }
}

/// Parses kilobyte values from smaps and meminfo lines.
pub fn parse_kb_value(v: &str) -> Option<u64> {
    v.split_whitespace().next()?.parse().ok()
}

fn parse_kb_bytes(v: &[u8]) -> u64 {
    std::str::from_utf8(v)
        .ok()
        .and_then(parse_kb_value)
        .unwrap_or(0)
}

/// Accumulates private clean and dirty memory over every mapping in `smaps`.
///
/// Works on raw bytes: mapping header lines carry file names that are not
/// guaranteed to be UTF-8.
pub fn parse_smaps(smaps: &[u8]) -> PrivateMemory {
    let mut mem = PrivateMemory::default();

    for line in smaps.split(|&b| b == b'\n') {
        match line.first() {
            Some(b'P') | Some(b'S') => {}
            _ => continue,
        }
        if let Some(kb) = line.strip_prefix(PRIVATE_CLEAN) {
            mem.clean_kb = mem.clean_kb.saturating_add(parse_kb_bytes(kb));
        } else if let Some(kb) = line.strip_prefix(PRIVATE_DIRTY) {
            mem.dirty_kb = mem.dirty_kb.saturating_add(parse_kb_bytes(kb));
        } else if let Some(kb) = line.strip_prefix(SWAP) {
            mem.dirty_kb = mem.dirty_kb.saturating_add(parse_kb_bytes(kb));
        }
    }

    mem
}
