use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use mediarc_core::{
    import_files, ArchiveConfig, BatchReport, CancellationToken, ImportOptions, IndexCodec,
    MediaDirectory, MediaError, MediaFile, Organize, PathEntity, TouchMode,
};

use crate::{CheckArgs, DatetimeArgs, ImportArgs, SetIndexArgs};

/// Wrap PATHS as files, or as every file below them with `dirs`.
/// Paths that cannot be opened are reported and skipped.
fn collect_files(
    paths: &[PathBuf],
    dirs: bool,
    media_type: Option<&str>,
    codec: &Arc<IndexCodec>,
) -> anyhow::Result<Vec<MediaFile>> {
    let mut files = Vec::new();
    for path in paths {
        let opened = if dirs {
            MediaDirectory::open(path, media_type, codec).and_then(|d| d.files(true))
        } else {
            MediaFile::open(path, media_type, codec).map(|f| vec![f])
        };
        match opened {
            Ok(found) => files.extend(found),
            // a bad media type applies to every path
            Err(e @ MediaError::InvalidMediaType(_)) => return Err(e.into()),
            Err(e) => eprintln!("Skipping {}: {}", path.display(), e),
        }
    }
    Ok(files)
}

fn progress_bar(len: usize, label: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar().template(&format!("[{{bar:40}}] {{pos}}/{{len}} {}", label))?,
    );
    Ok(pb)
}

fn run_import(
    files: Vec<MediaFile>,
    dst_root: &Path,
    organize: Option<&dyn Organize>,
    options: &ImportOptions,
    token: &CancellationToken,
) -> anyhow::Result<BatchReport> {
    eprintln!("Importing {} file(s) to {}", files.len(), dst_root.display());
    let pb = progress_bar(files.len(), "importing")?;
    let report = import_files(files, dst_root, organize, options, Some(token), &|_, current, _, _| {
        pb.set_position(current);
    });
    pb.finish_and_clear();

    for failure in report.failures() {
        eprintln!(
            "  failed {}: {}",
            failure.source.display(),
            failure.error.as_deref().unwrap_or_default()
        );
    }
    eprintln!(
        "Done! {} of {} file(s) imported",
        report.imported(),
        report.outcomes.len()
    );
    if report.interrupted {
        bail!("import interrupted");
    }
    if report.imported() < report.outcomes.len() {
        bail!("{} file(s) could not be imported", report.outcomes.len() - report.imported());
    }
    Ok(report)
}

pub fn import(
    config: &ArchiveConfig,
    args: ImportArgs,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    let codec = config.codec()?;
    let options = ImportOptions {
        copy: !args.move_files,
        indexing: args.index,
        copy_options: mediarc_core::CopyOptions {
            buffer_size: config.buffer_size,
            ..Default::default()
        },
    };

    if args.database {
        return import_to_archive(config, &codec, args, options, token);
    }

    if args.paths.is_empty() {
        bail!("no files given");
    }
    let dst_root = match (&args.quarantine, &args.path) {
        (Some(sub), _) => {
            if args.media_type.is_none() {
                bail!("importing to the quarantine requires a media type (-t)");
            }
            config.quarantine_root()?.join(sub)
        }
        (None, Some(path)) => {
            if args.index && args.media_type.is_none() {
                bail!("indexing requires a media type (-t)");
            }
            path.clone()
        }
        (None, None) => bail!("no import target given"),
    };

    let files = collect_files(&args.paths, args.dirs, args.media_type.as_deref(), &codec)?;
    run_import(files, &dst_root, None, &options, token)?;
    Ok(())
}

/// Import the whole quarantine into the archive, once it passes the integrity check.
fn import_to_archive(
    config: &ArchiveConfig,
    codec: &Arc<IndexCodec>,
    args: ImportArgs,
    options: ImportOptions,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    let quarantine = MediaDirectory::open(config.quarantine_root()?, None, codec)
        .context("cannot open quarantine")?;
    verify(&quarantine, args.fix)?;

    let layout = args.layout.unwrap_or(config.layout);
    let options = ImportOptions {
        indexing: false,
        ..options
    };
    let files = quarantine.files(true)?;
    run_import(files, config.archive_root()?, Some(&layout), &options, token)?;
    Ok(())
}

/// Run the integrity check, printing every issue left.
fn verify(dir: &MediaDirectory, fix: bool) -> anyhow::Result<()> {
    let root = dir.path()?.to_path_buf();
    match dir.check_integrity(fix) {
        Ok(report) => {
            eprintln!(
                "{}: {} file(s) checked, {} repaired",
                root.display(),
                report.checked,
                report.repaired
            );
            Ok(())
        }
        Err(MediaError::IntegrityCheckFailed(issues)) => {
            eprintln!("The following issues were detected in {}:", root.display());
            for issue in &issues {
                eprintln!(
                    "  [{}] {} for file {}",
                    issue.kind,
                    issue.detail,
                    issue.relative_to(&root).display()
                );
            }
            if fix {
                bail!("{} issue(s) could not be fixed", issues.len());
            }
            bail!("{} issue(s) found; rerun with --fix to repair", issues.len());
        }
        Err(e) => Err(e.into()),
    }
}

/// Apply `op` to every file, reporting failures and carrying on.
fn for_each_file(
    mut files: Vec<MediaFile>,
    token: &CancellationToken,
    label: &str,
    mut op: impl FnMut(&mut MediaFile) -> mediarc_core::Result<()>,
) -> anyhow::Result<()> {
    let pb = progress_bar(files.len(), label)?;
    let mut failed = 0;
    for file in files.iter_mut() {
        if token.is_cancelled() {
            pb.finish_and_clear();
            bail!("interrupted");
        }
        let before = file.to_string();
        if let Err(e) = op(file) {
            pb.suspend(|| eprintln!("  failed {}: {}", before, e));
            failed += 1;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    eprintln!("Done! {} of {} file(s) updated", files.len() - failed, files.len());
    if failed > 0 {
        bail!("{} file(s) failed", failed);
    }
    Ok(())
}

pub fn datetime(
    config: &ArchiveConfig,
    args: DatetimeArgs,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    let codec = config.codec()?;
    let files = collect_files(&args.paths, args.dirs, None, &codec)?;
    match args.add {
        Some(seconds) => for_each_file(files, token, "shifting datetimes", |f| {
            f.shift_datetime(seconds)
        }),
        None => for_each_file(files, token, "fixing datetimes", |f| {
            f.set_datetime(None, true, TouchMode::Both)
        }),
    }
}

pub fn set_index(
    config: &ArchiveConfig,
    args: SetIndexArgs,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    let codec = config.codec()?;
    let files = collect_files(&args.paths, args.dirs, args.media_type.as_deref(), &codec)?;
    let force = args.update;
    for_each_file(files, token, "indexing", |f| f.set_index(force))
}

pub fn check(config: &ArchiveConfig, args: CheckArgs) -> anyhow::Result<()> {
    let codec = config.codec()?;
    let dir = MediaDirectory::open(&args.dir, args.media_type.as_deref(), &codec)?;
    verify(&dir, args.fix)
}
