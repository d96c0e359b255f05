//! Engine log reading.
//!
//! The engine owns the log file and rewrites it from scratch on every
//! invocation, bracketing its lines with start/end sentinels. Reads here are
//! stateless: each call re-reads the whole file and strips the sentinels. No
//! cursor is kept between calls; the pane showing these lines renders by
//! replacement, and the file never grows across runs.

use std::fs;
use std::io;
use std::path::Path;

const SENTINEL_START: &str = "=== Logger started ===";
const SENTINEL_END: &str = "=== Logger ended ===";

/// Read every non-sentinel line of the engine log, in file order.
///
/// Sentinel matching tolerates surrounding whitespace so a trailing `\r` or
/// stray indent does not leak a sentinel into the output.
pub fn read_log(path: &Path) -> io::Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            trimmed != SENTINEL_START && trimmed != SENTINEL_END
        })
        .map(str::to_string)
        .collect())
}
