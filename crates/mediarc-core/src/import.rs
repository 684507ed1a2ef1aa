use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::cancel::{self, CancellationToken};
use crate::entity::PathEntity;
use crate::error::{MediaError, Result};
use crate::file::{ensure_dir, CopyOptions, MediaFile};
use crate::layout::Organize;
use crate::{ProgressCallback, ThrottledProgress};

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Copy the source (true) or move it (false)
    pub copy: bool,
    /// Index the imported file
    pub indexing: bool,
    pub copy_options: CopyOptions,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            copy: true,
            indexing: false,
            copy_options: CopyOptions::default(),
        }
    }
}

/// Import one file into `dst_root`.
///
/// The destination directory comes from `organize` when given. Once the
/// file has been transferred, any failure (indexing, interruption) undoes
/// the transfer: a copy is deleted, a moved file goes back where it was.
/// Those failures are reported as `MediaError::Import`, carrying the
/// rollback error too if undoing failed.
///
/// Returns the copy, or `src` itself repointed at its new location.
pub fn import_file(
    src: &mut MediaFile,
    dst_root: &Path,
    organize: Option<&dyn Organize>,
    options: &ImportOptions,
    cancel: Option<&CancellationToken>,
) -> Result<MediaFile> {
    let src_path = src.existing_path()?.to_path_buf();
    let dest_dir = match organize {
        Some(layout) => layout.subdirectory(dst_root, src)?,
        None => dst_root.to_path_buf(),
    };
    ensure_dir(&dest_dir)?;
    let dest = match src_path.file_name() {
        Some(name) => dest_dir.join(name),
        None => return Err(MediaError::NotFound(src_path)),
    };

    let failed = |cause: MediaError, rollback: Result<()>| {
        import_error(&src_path, dst_root, cause, rollback)
    };

    if options.copy {
        // Nothing exists at the destination yet if this fails.
        let mut copy = src
            .copy_to(&dest, options.copy_options)
            .map_err(|e| failed(e, Ok(())))?;
        if let Err(e) = finish(&mut copy, options.indexing, cancel) {
            warn!(copy = %copy, error = %e, "Import failed, removing copy");
            let rollback = copy.delete();
            if let Err(rb) = &rollback {
                error!(copy = %copy, error = %rb, "Could not remove partial copy");
            }
            return Err(failed(e, rollback));
        }
        info!(from = %src_path.display(), to = %copy, "Imported (copy)");
        Ok(copy)
    } else {
        src.move_to(&dest, options.copy_options.strict)
            .map_err(|e| failed(e, Ok(())))?;
        if let Err(e) = finish(src, options.indexing, cancel) {
            warn!(file = %src, error = %e, "Import failed, moving back");
            let rollback = src.move_to(&src_path, false);
            if let Err(rb) = &rollback {
                error!(
                    file = %src,
                    original = %src_path.display(),
                    error = %rb,
                    "Could not move file back"
                );
            }
            return Err(failed(e, rollback));
        }
        info!(from = %src_path.display(), to = %src, "Imported (move)");
        Ok(src.clone())
    }
}

/// `MediaError::Import` for `cause`, keeping the outcome of the undo step.
fn import_error(
    src: &Path,
    dst_root: &Path,
    cause: MediaError,
    rollback: Result<()>,
) -> MediaError {
    MediaError::Import {
        src: src.to_path_buf(),
        dst_root: dst_root.to_path_buf(),
        source: Box::new(cause),
        rollback: rollback.err().map(Box::new),
    }
}

/// Work done after the transfer; any error here triggers rollback.
fn finish(file: &mut MediaFile, indexing: bool, cancel: Option<&CancellationToken>) -> Result<()> {
    cancel::check(cancel)?;
    if indexing {
        file.set_index(false)?;
    }
    cancel::check(cancel)
}

/// What happened to one file of a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportOutcome {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub error: Option<String>,
}

impl ImportOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<ImportOutcome>,
    /// The batch stopped early on cancellation
    pub interrupted: bool,
}

impl BatchReport {
    pub fn imported(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ImportOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// Import every file, carrying on past individual failures.
///
/// Stops early only when `cancel` fires.
pub fn import_files(
    files: Vec<MediaFile>,
    dst_root: &Path,
    organize: Option<&dyn Organize>,
    options: &ImportOptions,
    cancel: Option<&CancellationToken>,
    progress: &ProgressCallback<'_>,
) -> BatchReport {
    let tp = ThrottledProgress::new(progress);
    let total = files.len() as u64;
    let mut report = BatchReport::default();

    for (i, mut file) in files.into_iter().enumerate() {
        if cancel::check(cancel).is_err() {
            report.interrupted = true;
            break;
        }
        let source = file.path().map(Path::to_path_buf).unwrap_or_default();
        tp.report("import", i as u64, total, &source.display().to_string());

        match import_file(&mut file, dst_root, organize, options, cancel) {
            Ok(imported) => report.outcomes.push(ImportOutcome {
                source,
                destination: imported.path().ok().map(Path::to_path_buf),
                error: None,
            }),
            Err(e) => {
                warn!(source = %source.display(), error = %e, "Import failed");
                let interrupted = matches!(e.root_cause(), MediaError::Interrupted);
                report.outcomes.push(ImportOutcome {
                    source,
                    destination: None,
                    error: Some(describe(&e)),
                });
                if interrupted {
                    report.interrupted = true;
                    break;
                }
            }
        }
    }

    info!(
        imported = report.imported(),
        failed = report.outcomes.len() - report.imported(),
        interrupted = report.interrupted,
        "Batch import done"
    );
    report
}

/// Error text including a failed rollback, if any.
pub fn describe(e: &MediaError) -> String {
    match e {
        MediaError::Import {
            rollback: Some(rb),
            ..
        } => format!("{}; rollback failed: {}", e, rb),
        other => other.to_string(),
    }
}
