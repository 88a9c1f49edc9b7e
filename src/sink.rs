//! Shared output sink.
//!
//! Participants write their console output here. `write_line` emits a whole
//! line at once; `write_unit` emits a single byte and is what the mutual
//! exclusion writers use inside their guarded region.

use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

/// Destination for participant output.
pub trait OutputSink: Send + Sync {
    /// Emit one byte.
    fn write_unit(&self, unit: u8);

    /// Emit `line` followed by a newline, without interleaving.
    fn write_line(&self, line: &str);
}

/// Process stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn write_unit(&self, unit: u8) {
        emit(&mut std::io::stdout().lock(), &[unit]);
    }

    fn write_line(&self, line: &str) {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        emit(&mut std::io::stdout().lock(), &bytes);
    }
}

/// Write and flush `bytes`, logging a failure. Returns whether it succeeded.
fn emit(out: &mut impl Write, bytes: &[u8]) -> bool {
    match out.write_all(bytes).and_then(|()| out.flush()) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, len = bytes.len(), "Console write failed");
            false
        }
    }
}

/// In-memory sink that keeps everything written to it.
#[derive(Debug, Default)]
pub struct MemorySink {
    buffer: Mutex<Vec<u8>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Written output split into lines.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    /// Number of lines equal to `line`.
    pub fn count_lines(&self, line: &str) -> usize {
        self.contents().lines().filter(|l| *l == line).count()
    }
}

impl OutputSink for MemorySink {
    fn write_unit(&self, unit: u8) {
        self.lock().push(unit);
    }

    fn write_line(&self, line: &str) {
        let mut buffer = self.lock();
        buffer.extend_from_slice(line.as_bytes());
        buffer.push(b'\n');
    }
}
