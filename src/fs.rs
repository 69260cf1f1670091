//! Bounded-retry file I/O
//!
//! The target file and the project manifest may be held open by an editor or
//! the game tooling mid-write; reads and writes retry a fixed number of times
//! with a fixed delay before giving up.

use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::error::{LupackError, LupackResult};

/// Read a file to a string, retrying transient failures. A missing file is
/// not an error: it reads as empty, which for the target file means "no
/// generated block yet".
pub fn read_with_retry(path: &Path, attempts: u32, delay: Duration) -> LupackResult<String> {
    let mut last = None;
    for attempt in 1..=attempts {
        match std::fs::read_to_string(path) {
            Ok(content) => return Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
            Err(e) => {
                last = Some(e);
                if attempt < attempts {
                    thread::sleep(delay);
                }
            }
        }
    }
    Err(LupackError::RetriesExhausted {
        path: path.to_path_buf(),
        attempts,
        message: last.map(|e| e.to_string()).unwrap_or_default(),
    })
}

/// Write a file, retrying transient failures.
pub fn write_with_retry(
    path: &Path,
    contents: &str,
    attempts: u32,
    delay: Duration,
) -> LupackResult<()> {
    let mut last = None;
    for attempt in 1..=attempts {
        match std::fs::write(path, contents) {
            Ok(()) => return Ok(()),
            Err(e) => {
                last = Some(e);
                if attempt < attempts {
                    thread::sleep(delay);
                }
            }
        }
    }
    Err(LupackError::RetriesExhausted {
        path: path.to_path_buf(),
        attempts,
        message: last.map(|e| e.to_string()).unwrap_or_default(),
    })
}
