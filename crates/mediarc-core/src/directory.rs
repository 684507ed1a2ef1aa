use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::entity::{EntityCore, EntityKind, PathEntity};
use crate::error::{MediaError, Result};
use crate::file::{MediaFile, TimeKind, TouchMode};
use crate::index::IndexCodec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// The name does not parse as an index
    InvalidIndex,
    /// mtime differs from the timestamp encoded in the index
    DatetimeMismatch,
    /// The file's metadata could not be read
    Unreadable,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::InvalidIndex => write!(f, "invalid index"),
            IssueKind::DatetimeMismatch => write!(f, "datetime mismatch"),
            IssueKind::Unreadable => write!(f, "unreadable"),
        }
    }
}

/// One file that failed the integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityIssue {
    pub path: PathBuf,
    pub kind: IssueKind,
    pub detail: String,
}

impl IntegrityIssue {
    /// Path relative to `root`, for display.
    pub fn relative_to(&self, root: &Path) -> PathBuf {
        pathdiff::diff_paths(&self.path, root).unwrap_or_else(|| self.path.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub checked: usize,
    pub repaired: usize,
}

/// Handle on a directory of media files.
#[derive(Debug, Clone)]
pub struct MediaDirectory {
    core: EntityCore,
}

impl PathEntity for MediaDirectory {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Directory
    }
}

impl MediaDirectory {
    /// Wrap an existing directory. Fails with `NotFound` if `path` is not a directory.
    pub fn open(
        path: impl Into<PathBuf>,
        media_type: Option<&str>,
        codec: &Arc<IndexCodec>,
    ) -> Result<Self> {
        let core = EntityCore::new(path.into(), EntityKind::Directory, media_type, codec)?;
        Ok(Self { core })
    }

    fn entries(&self, recursive: bool) -> Result<Vec<walkdir::DirEntry>> {
        let root = self.existing_path()?;
        let mut walker = WalkDir::new(root).min_depth(1);
        if !recursive {
            walker = walker.max_depth(1);
        }
        walker
            .into_iter()
            .map(|entry| {
                entry.map_err(|e| {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    MediaError::io(path, e.into())
                })
            })
            .collect()
    }

    /// Total size in bytes of the files inside.
    pub fn size(&self, recursive: bool) -> Result<u64> {
        let mut total = 0;
        for entry in self.entries(recursive)? {
            if entry.path().is_file() {
                let meta = entry
                    .path()
                    .metadata()
                    .map_err(|e| MediaError::io(entry.path(), e))?;
                total += meta.len();
            }
        }
        Ok(total)
    }

    /// Child directories (all descendants when `recursive`), tagged with this
    /// directory's media type. Never includes the directory itself.
    pub fn dirs(&self, recursive: bool) -> Result<Vec<MediaDirectory>> {
        self.entries(recursive)?
            .into_iter()
            .filter(|e| e.path().is_dir())
            .map(|e| MediaDirectory::open(e.into_path(), self.media_type(), self.codec()))
            .collect()
    }

    /// Files inside (at every depth when `recursive`), tagged with this
    /// directory's media type.
    pub fn files(&self, recursive: bool) -> Result<Vec<MediaFile>> {
        self.entries(recursive)?
            .into_iter()
            .filter(|e| e.path().is_file())
            .map(|e| MediaFile::open(e.into_path(), self.media_type(), self.codec()))
            .collect()
    }

    /// Check that every file below is named by a valid index whose timestamp
    /// matches the file's mtime.
    ///
    /// With `fix`, each issue is repaired in place where possible. Issues
    /// that remain are returned together in `IntegrityCheckFailed`.
    pub fn check_integrity(&self, fix: bool) -> Result<IntegrityReport> {
        let files = self.files(true)?;
        let mut report = IntegrityReport {
            checked: files.len(),
            repaired: 0,
        };
        let mut issues = Vec::new();

        for mut file in files {
            let Some(issue) = inspect(&file) else {
                continue;
            };
            warn!(
                path = %issue.path.display(),
                kind = %issue.kind,
                detail = %issue.detail,
                "Integrity issue"
            );
            if !fix {
                issues.push(issue);
                continue;
            }
            match repair(&mut file, issue.kind) {
                Ok(()) => match inspect(&file) {
                    None => {
                        info!(from = %issue.path.display(), to = %file, "Repaired");
                        report.repaired += 1;
                    }
                    Some(residual) => issues.push(residual),
                },
                Err(e) => issues.push(IntegrityIssue {
                    detail: format!("{}; repair failed: {}", issue.detail, e),
                    ..issue
                }),
            }
        }

        // A repair renames or touches one file; make sure none of them broke another.
        if report.repaired > 0 {
            let known: HashSet<PathBuf> = issues.iter().map(|i| i.path.clone()).collect();
            for file in self.files(true)? {
                if let Some(issue) = inspect(&file) {
                    if !known.contains(&issue.path) {
                        issues.push(issue);
                    }
                }
            }
        }

        debug!(
            dir = %self.path()?.display(),
            checked = report.checked,
            repaired = report.repaired,
            issues = issues.len(),
            "Integrity check done"
        );
        if issues.is_empty() {
            Ok(report)
        } else {
            Err(MediaError::IntegrityCheckFailed(issues))
        }
    }
}

fn inspect(file: &MediaFile) -> Option<IntegrityIssue> {
    let path = file.path().ok()?.to_path_buf();
    let parsed = match file.index() {
        Ok(parsed) => parsed,
        Err(e) => {
            return Some(IntegrityIssue {
                path,
                kind: IssueKind::InvalidIndex,
                detail: e.to_string(),
            })
        }
    };
    match file.datetime(TimeKind::Modified) {
        Ok(mtime) if mtime == parsed.timestamp => None,
        Ok(mtime) => Some(IntegrityIssue {
            path,
            kind: IssueKind::DatetimeMismatch,
            detail: format!("mtime {} but index says {}", mtime, parsed.timestamp),
        }),
        Err(e) => Some(IntegrityIssue {
            path,
            kind: IssueKind::Unreadable,
            detail: e.to_string(),
        }),
    }
}

fn repair(file: &mut MediaFile, kind: IssueKind) -> Result<()> {
    match kind {
        IssueKind::DatetimeMismatch => file.set_datetime(None, true, TouchMode::Both),
        IssueKind::Unreadable => file.times().map(|_| ()),
        IssueKind::InvalidIndex => {
            let before = file.times()?;
            let media_type = file.media_type().map(str::to_string);
            let result = salvage_index(file);
            if result.is_err() {
                // A failed repair leaves the file as it was found.
                let restored = file
                    .set_datetime(Some(before.accessed), false, TouchMode::Access)
                    .and_then(|_| {
                        file.set_datetime(Some(before.modified), false, TouchMode::Modify)
                    })
                    .and_then(|_| file.set_media_type(media_type.as_deref()));
                if let Err(e) = restored {
                    warn!(file = %file, error = %e, "Could not restore file after failed repair");
                }
            }
            result
        }
    }
}

/// Index the file, keeping whatever date and media type its old name still tells.
fn salvage_index(file: &mut MediaFile) -> Result<()> {
    let partial = file.codec().probe(&file.name()?);
    if let Some(ts) = partial.timestamp {
        file.set_datetime(Some(ts), false, TouchMode::Both)?;
    }
    if file.media_type().is_none() {
        file.set_media_type(partial.media_type.as_deref())?;
    }
    file.set_index(false)
}
