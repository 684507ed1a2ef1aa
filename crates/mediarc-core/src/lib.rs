//! Indexing and import pipeline for a personal media archive.
//!
//! Every archived file is named by its index, `<PREFIX><DATE><SUFFIX>`:
//! the media type prefix, the capture time and a size-derived suffix.
//! Files are indexed in a quarantine area, checked, then imported into
//! the archive tree.

pub mod cancel;
pub mod config;
pub mod directory;
pub mod entity;
pub mod error;
pub mod file;
pub mod import;
pub mod index;
pub mod layout;

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub use cancel::CancellationToken;
pub use config::ArchiveConfig;
pub use directory::{IntegrityIssue, IntegrityReport, IssueKind, MediaDirectory};
pub use entity::{EntityKind, PathEntity};
pub use error::{MediaError, ParseFailure, Result};
pub use file::{CopyOptions, FileTimes, MediaFile, TimeKind, TouchMode};
pub use import::{import_file, import_files, BatchReport, ImportOptions, ImportOutcome};
pub use index::{format_number, IndexCodec, ParsedIndex, PartialIndex};
pub use layout::{LayoutStrategy, Organize};

/// Progress sink: `(stage, current, total, message)`
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(200);

/// Rate-limits a [`ProgressCallback`].
///
/// The first report and the one completing a stage always go through;
/// the rest are dropped unless `interval` has passed since the last one.
pub struct ThrottledProgress<'a> {
    sink: &'a ProgressCallback<'a>,
    interval: Duration,
    last_emit: Mutex<Option<Instant>>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(sink: &'a ProgressCallback<'a>) -> Self {
        Self::with_interval(sink, DEFAULT_REPORT_INTERVAL)
    }

    pub fn with_interval(sink: &'a ProgressCallback<'a>, interval: Duration) -> Self {
        Self {
            sink,
            interval,
            last_emit: Mutex::new(None),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let completes = current + 1 >= total;
        let mut last = self.last_emit.lock().unwrap_or_else(PoisonError::into_inner);
        let due = last.map_or(true, |at| at.elapsed() >= self.interval);
        if !(due || completes) {
            return;
        }
        *last = Some(Instant::now());
        drop(last);
        (self.sink)(stage, current, total, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_throttled_progress_always_emits_first_and_last() {
        let calls = AtomicU64::new(0);
        let cb = |_: &str, _: u64, _: u64, _: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
        };
        let tp = ThrottledProgress::with_interval(&cb, Duration::from_secs(3600));
        for i in 0..100 {
            tp.report("stage", i, 100, "");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_interval_emits_everything() {
        let seen = Mutex::new(Vec::new());
        let cb = |stage: &str, current: u64, _: u64, _: &str| {
            seen.lock().unwrap().push(format!("{}:{}", stage, current));
        };
        let tp = ThrottledProgress::with_interval(&cb, Duration::ZERO);
        for i in 0..3 {
            tp.report("copy", i, 10, "");
        }
        assert_eq!(*seen.lock().unwrap(), vec!["copy:0", "copy:1", "copy:2"]);
    }
}
