use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use filetime::FileTime;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::DEFAULT_BUFFER_SIZE;
use crate::entity::{EntityCore, EntityKind, PathEntity};
use crate::error::{MediaError, Result};
use crate::index::{IndexCodec, ParsedIndex};

/// Which filesystem timestamp to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TimeKind {
    Modified,
    Accessed,
    /// Status change time on Unix, creation time elsewhere
    Changed,
}

/// Which timestamps `set_datetime` writes: `a`, `m` or `am`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchMode {
    Access,
    Modify,
    Both,
}

impl FromStr for TouchMode {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "a" => Ok(TouchMode::Access),
            "m" => Ok(TouchMode::Modify),
            "am" => Ok(TouchMode::Both),
            other => Err(MediaError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTimes {
    pub modified: i64,
    pub accessed: i64,
    pub changed: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct CopyOptions {
    /// Upper bound for the copy buffer
    pub buffer_size: usize,
    /// Give the copy the source's access and modification times
    pub preserve_date: bool,
    /// Refuse to copy next to a byte-identical file, whatever its name
    pub strict: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            preserve_date: true,
            strict: true,
        }
    }
}

/// Handle on a media file. Wrapping a path never creates anything on disk.
#[derive(Debug, Clone)]
pub struct MediaFile {
    core: EntityCore,
}

impl PathEntity for MediaFile {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn kind(&self) -> EntityKind {
        EntityKind::File
    }
}

impl std::fmt::Display for MediaFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.path() {
            Ok(path) => write!(f, "{}", path.display()),
            Err(_) => write!(f, "<detached>"),
        }
    }
}

impl MediaFile {
    /// Wrap an existing file. Fails with `NotFound` if `path` is not a file.
    pub fn open(
        path: impl Into<PathBuf>,
        media_type: Option<&str>,
        codec: &Arc<IndexCodec>,
    ) -> Result<Self> {
        let core = EntityCore::new(path.into(), EntityKind::File, media_type, codec)?;
        Ok(Self { core })
    }

    /// Extension without the leading dot.
    pub fn ext(&self) -> Result<Option<String>> {
        Ok(self
            .path()?
            .extension()
            .map(|e| e.to_string_lossy().into_owned()))
    }

    fn metadata(&self) -> Result<Metadata> {
        let path = self.existing_path()?;
        fs::metadata(path).map_err(|e| MediaError::io(path, e))
    }

    /// Size in bytes.
    pub fn size(&self) -> Result<u64> {
        Ok(self.metadata()?.len())
    }

    pub fn times(&self) -> Result<FileTimes> {
        let meta = self.metadata()?;
        Ok(FileTimes {
            modified: FileTime::from_last_modification_time(&meta).unix_seconds(),
            accessed: FileTime::from_last_access_time(&meta).unix_seconds(),
            changed: changed_time(&meta),
        })
    }

    /// Filesystem timestamp in Unix seconds.
    pub fn datetime(&self, kind: TimeKind) -> Result<i64> {
        let times = self.times()?;
        Ok(match kind {
            TimeKind::Modified => times.modified,
            TimeKind::Accessed => times.accessed,
            TimeKind::Changed => times.changed,
        })
    }

    /// The index embedded in the current name.
    pub fn index(&self) -> Result<ParsedIndex> {
        let name = self.name()?;
        Ok(self.codec().parse(&name)?)
    }

    pub fn is_indexed(&self) -> bool {
        self.index().is_ok()
    }

    /// Timestamp encoded in the current name.
    pub fn datetime_from_index(&self) -> Result<i64> {
        Ok(self.index()?.timestamp)
    }

    /// The stored media type, or the one implied by the index prefix when unset.
    pub fn media_type_from_index(&self) -> Option<String> {
        match self.media_type() {
            Some(t) => Some(t.to_string()),
            None => self.index().ok().map(|parsed| parsed.media_type),
        }
    }

    /// Write access and/or modification time.
    ///
    /// Exactly one of `timestamp` and `from_index` must be given.
    pub fn set_datetime(
        &self,
        timestamp: Option<i64>,
        from_index: bool,
        mode: TouchMode,
    ) -> Result<()> {
        let timestamp = match (timestamp, from_index) {
            (Some(ts), false) => ts,
            (None, true) => self.datetime_from_index()?,
            (None, false) => return Err(MediaError::MissingArgument("timestamp or from_index")),
            (Some(_), true) => {
                return Err(MediaError::MissingArgument(
                    "only one of timestamp and from_index",
                ))
            }
        };
        let path = self.existing_path()?;
        let ft = FileTime::from_unix_time(timestamp, 0);
        let res = match mode {
            TouchMode::Access => filetime::set_file_atime(path, ft),
            TouchMode::Modify => filetime::set_file_mtime(path, ft),
            TouchMode::Both => filetime::set_file_times(path, ft, ft),
        };
        res.map_err(|e| MediaError::io(path, e))?;
        debug!(path = %path.display(), timestamp, ?mode, "Set file datetime");
        Ok(())
    }

    /// Move both access and modification time by `seconds`, relative to mtime.
    pub fn shift_datetime(&self, seconds: i64) -> Result<()> {
        let mtime = self.datetime(TimeKind::Modified)?;
        self.set_datetime(Some(mtime + seconds), false, TouchMode::Both)
    }

    /// Rename the basename, keeping directory and extension.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let src = self.existing_path()?.to_path_buf();
        let mut dest = src.with_file_name(name);
        if let Some(ext) = src.extension() {
            let mut file_name = dest.file_name().unwrap_or_default().to_os_string();
            file_name.push(".");
            file_name.push(ext);
            dest.set_file_name(file_name);
        }
        if dest.exists() {
            return Err(MediaError::NameCollision(dest));
        }
        fs::rename(&src, &dest).map_err(|e| MediaError::io(&src, e))?;
        debug!(from = %src.display(), to = %dest.display(), "Renamed");
        self.core.set_path(dest);
        Ok(())
    }

    /// Rename the file to the index derived from its media type, mtime and size.
    ///
    /// An already indexed name fails with `AlreadyIndexed` unless `force` is
    /// set, in which case the file's timestamps are first restored from the
    /// old index so the new one keeps the same date.
    pub fn set_index(&mut self, force: bool) -> Result<()> {
        let path = self.existing_path()?.to_path_buf();
        let current = self.name()?;
        let existing = self.codec().parse(&current).ok();
        if existing.is_some() && !force {
            return Err(MediaError::AlreadyIndexed(current));
        }
        self.assign_index(&current, existing)
            .map_err(|e| MediaError::indexing(&path, e))
    }

    fn assign_index(&mut self, current: &str, existing: Option<ParsedIndex>) -> Result<()> {
        let mut media_type = self.media_type().map(str::to_string);
        if let Some(parsed) = existing {
            self.set_datetime(Some(parsed.timestamp), false, TouchMode::Both)?;
            media_type = media_type.or(Some(parsed.media_type));
        }

        let prefix = self.codec().prefix(media_type.as_deref())?.to_string();
        let mtime = self.datetime(TimeKind::Modified)?;
        let size = i64::try_from(self.size()?).unwrap_or(i64::MAX);
        let index = self.codec().generate(&prefix, mtime, size)?;
        if index == current {
            return Ok(());
        }
        self.set_name(&index)?;
        info!(file = %self, index = %index, "Indexed");
        Ok(())
    }

    /// Copy to `dest`, creating its directory if needed.
    ///
    /// Returns a handle on the copy with the same media type.
    pub fn copy_to(&self, dest: impl AsRef<Path>, options: CopyOptions) -> Result<MediaFile> {
        let src = self.existing_path()?;
        let dest = dest.as_ref();
        // Taken before reading the source, which may bump its atime.
        let src_meta = self.metadata()?;
        let dest_dir = parent_dir(dest);
        ensure_dir(dest_dir)?;
        check_collisions(src, dest, dest_dir, options.strict)?;

        let size = src_meta.len();
        let buffer_size = options
            .buffer_size
            .min(usize::try_from(size).unwrap_or(usize::MAX))
            .max(1);
        copy_stream(src, dest, buffer_size)?;

        if options.preserve_date {
            copy_times(&src_meta, dest)?;
            // Hashing and copying read the source, which bumps its atime.
            filetime::set_file_atime(src, FileTime::from_last_access_time(&src_meta))
                .map_err(|e| MediaError::io(src, e))?;
        }
        debug!(from = %src.display(), to = %dest.display(), size, "Copied");

        MediaFile::open(dest, self.media_type(), self.codec())
    }

    /// Move to `dest`, repointing this handle at the new location.
    pub fn move_to(&mut self, dest: impl AsRef<Path>, strict: bool) -> Result<()> {
        let src = self.existing_path()?.to_path_buf();
        let src_meta = self.metadata()?;
        let dest = dest.as_ref();
        let dest_dir = parent_dir(dest);
        ensure_dir(dest_dir)?;
        check_collisions(&src, dest, dest_dir, strict)?;

        if let Err(rename_err) = fs::rename(&src, dest) {
            // Renames fail across filesystems; fall back to copy + remove.
            let buffer_size = DEFAULT_BUFFER_SIZE
                .min(usize::try_from(src_meta.len()).unwrap_or(usize::MAX))
                .max(1);
            if copy_stream(&src, dest, buffer_size).is_err() {
                return Err(MediaError::io(&src, rename_err));
            }
            copy_times(&src_meta, dest)?;
            fs::remove_file(&src).map_err(|e| MediaError::io(&src, e))?;
        }
        debug!(from = %src.display(), to = %dest.display(), "Moved");

        self.core.set_path(dest.to_path_buf());
        Ok(())
    }

    /// Remove the file from disk and detach the handle.
    pub fn delete(&mut self) -> Result<()> {
        let path = self.existing_path()?.to_path_buf();
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                warn!(path = %path.display(), "Permission denied, retrying as writable");
                make_writable(&path)?;
                fs::remove_file(&path).map_err(|e| MediaError::io(&path, e))?;
            }
            Err(e) => return Err(MediaError::io(&path, e)),
        }
        debug!(path = %path.display(), "Deleted");
        self.unlink();
        Ok(())
    }
}

#[cfg(unix)]
fn changed_time(meta: &Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.ctime()
}

#[cfg(not(unix))]
fn changed_time(meta: &Metadata) -> i64 {
    FileTime::from_creation_time(meta)
        .map(|t| t.unix_seconds())
        .unwrap_or_default()
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|source| MediaError::DirectoryCreation {
        path: dir.to_path_buf(),
        source,
    })?;
    debug!(dir = %dir.display(), "Created directory");
    Ok(())
}

/// Refuse `dest` if it is already a file, or, when `strict`, if any file in
/// `dest_dir` has the same content as `src`.
fn check_collisions(src: &Path, dest: &Path, dest_dir: &Path, strict: bool) -> Result<()> {
    let entries = fs::read_dir(dest_dir).map_err(|e| MediaError::io(dest_dir, e))?;
    let src_size = fs::metadata(src).map_err(|e| MediaError::io(src, e))?.len();
    let mut src_digest: Option<String> = None;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path == dest {
            return Err(MediaError::DestinationCollision {
                dest: dest.to_path_buf(),
                existing: path,
            });
        }
        if !strict || entry.metadata().map(|m| m.len()).ok() != Some(src_size) {
            continue;
        }
        let digest = match &src_digest {
            Some(d) => d.clone(),
            None => {
                let d = file_digest(src)?;
                src_digest = Some(d.clone());
                d
            }
        };
        if file_digest(&path)? == digest {
            return Err(MediaError::DestinationCollision {
                dest: dest.to_path_buf(),
                existing: path,
            });
        }
    }
    Ok(())
}

/// SHA-256 of the file content, hex encoded.
fn file_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| MediaError::io(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| MediaError::io(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Stream `src` into a new file at `dest`; a partial `dest` is removed on failure.
fn copy_stream(src: &Path, dest: &Path, buffer_size: usize) -> Result<()> {
    let mut reader = File::open(src).map_err(|e| MediaError::io(src, e))?;
    let mut writer = match OpenOptions::new().write(true).create_new(true).open(dest) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(MediaError::DestinationCollision {
                dest: dest.to_path_buf(),
                existing: dest.to_path_buf(),
            })
        }
        Err(e) => return Err(MediaError::io(dest, e)),
    };

    let mut buffer = vec![0u8; buffer_size];
    let result = (|| -> io::Result<()> {
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buffer[..n])?;
        }
        writer.flush()
    })();

    if let Err(e) = result {
        drop(writer);
        let _ = fs::remove_file(dest);
        return Err(MediaError::io(dest, e));
    }
    Ok(())
}

/// Give `dest` the access and modification times recorded in `src_meta`.
fn copy_times(src_meta: &Metadata, dest: &Path) -> Result<()> {
    filetime::set_file_times(
        dest,
        FileTime::from_last_access_time(src_meta),
        FileTime::from_last_modification_time(src_meta),
    )
    .map_err(|e| MediaError::io(dest, e))
}

#[allow(clippy::permissions_set_readonly_false)]
fn make_writable(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)
        .map_err(|e| MediaError::io(path, e))?
        .permissions();
    perms.set_readonly(false);
    fs::set_permissions(path, perms).map_err(|e| MediaError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArchiveConfig;
    use chrono::{Local, TimeZone};
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        codec: Arc<IndexCodec>,
        testfile: MediaFile,
        tgtfile: MediaFile,
    }

    fn write(path: &Path, byte: u8, len: usize) {
        fs::write(path, vec![byte; len]).unwrap();
    }

    fn local_ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        Local
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .earliest()
            .unwrap()
            .timestamp()
    }

    fn set_mtime(path: &Path, ts: i64) {
        let ft = FileTime::from_unix_time(ts, 0);
        filetime::set_file_times(path, ft, ft).unwrap();
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let codec = ArchiveConfig::default().codec().unwrap();
        write(&dir.path().join("testfile.dat"), 1, 1024);
        write(&dir.path().join("tgtfile.dat"), 2, 2048);
        let testfile = MediaFile::open(dir.path().join("testfile.dat"), None, &codec).unwrap();
        let tgtfile = MediaFile::open(dir.path().join("tgtfile.dat"), None, &codec).unwrap();
        Fixture {
            dir,
            codec,
            testfile,
            tgtfile,
        }
    }

    #[test]
    fn test_open_requires_existing_file() {
        let fx = fixture();
        assert!(matches!(
            MediaFile::open(fx.dir.path().join("invalid.dat"), None, &fx.codec),
            Err(MediaError::NotFound(_))
        ));
        assert!(matches!(
            MediaFile::open(fx.dir.path(), None, &fx.codec),
            Err(MediaError::NotFound(_))
        ));
        assert!(matches!(
            MediaFile::open(fx.dir.path().join("testfile.dat"), Some("video"), &fx.codec),
            Err(MediaError::InvalidMediaType(_))
        ));
    }

    #[test]
    fn test_path_decomposition() {
        let fx = fixture();
        assert_eq!(fx.testfile.name().unwrap(), "testfile");
        assert_eq!(fx.testfile.ext().unwrap().as_deref(), Some("dat"));
        assert_eq!(fx.testfile.dir().unwrap(), fx.dir.path());
        assert_eq!(fx.testfile.size().unwrap(), 1024);
    }

    #[test]
    fn test_unlink_detaches() {
        let mut fx = fixture();
        assert!(fx.testfile.exists());
        fx.testfile.unlink();
        assert!(!fx.testfile.exists());
        assert!(matches!(fx.testfile.path(), Err(MediaError::InvalidReference)));
        assert!(matches!(fx.testfile.name(), Err(MediaError::InvalidReference)));
        // the file itself is untouched
        assert!(fx.dir.path().join("testfile.dat").is_file());
    }

    #[test]
    fn test_reference_may_break() {
        let fx = fixture();
        fs::remove_file(fx.testfile.path().unwrap()).unwrap();
        assert!(!fx.testfile.exists());
        assert!(matches!(fx.testfile.size(), Err(MediaError::NotFound(_))));
    }

    #[test]
    fn test_media_type_validation() {
        let mut fx = fixture();
        fx.testfile.set_media_type(Some("audio")).unwrap();
        assert_eq!(fx.testfile.media_type(), Some("audio"));
        assert!(matches!(
            fx.testfile.set_media_type(Some("somemedia")),
            Err(MediaError::InvalidMediaType(_))
        ));
        assert_eq!(fx.testfile.media_type(), Some("audio"));
        fx.testfile.set_media_type(None).unwrap();
        assert_eq!(fx.testfile.media_type(), None);
    }

    #[test]
    fn test_rename_does_not_overwrite() {
        let mut fx = fixture();
        let other = fx.tgtfile.name().unwrap();
        assert!(matches!(fx.testfile.set_name(&other), Err(MediaError::NameCollision(_))));
        assert!(matches!(fx.testfile.set_name("testfile"), Err(MediaError::NameCollision(_))));
        assert_eq!(fs::read(fx.dir.path().join("tgtfile.dat")).unwrap().len(), 2048);
    }

    #[test]
    fn test_rename_changes_name() {
        let mut fx = fixture();
        fx.testfile.set_name("anotherName").unwrap();
        assert_eq!(fx.testfile.name().unwrap(), "anotherName");
        assert!(fx.testfile.exists());
        assert!(fx.dir.path().join("anotherName.dat").is_file());
    }

    #[test]
    fn test_copy_does_not_overwrite() {
        let fx = fixture();
        let res = fx.testfile.copy_to(fx.tgtfile.path().unwrap(), CopyOptions::default());
        assert!(matches!(res, Err(MediaError::DestinationCollision { .. })));
        let res = fx.testfile.copy_to(fx.testfile.path().unwrap(), CopyOptions::default());
        assert!(matches!(res, Err(MediaError::DestinationCollision { .. })));
        assert_eq!(fs::read(fx.tgtfile.path().unwrap()).unwrap(), vec![2u8; 2048]);
    }

    #[test]
    fn test_copy_returns_valid_handle() {
        let mut fx = fixture();
        fx.testfile.set_media_type(Some("footage")).unwrap();
        let original = fx.testfile.path().unwrap().to_path_buf();

        let copy = fx
            .testfile
            .copy_to(fx.dir.path().join("copy/testfile.dat"), CopyOptions::default())
            .unwrap();
        assert!(copy.exists());
        assert_eq!(copy.media_type(), Some("footage"));
        assert_eq!(fs::read(copy.path().unwrap()).unwrap(), fs::read(&original).unwrap());
        assert_eq!(fx.testfile.path().unwrap(), original);
        assert!(original.is_file());
    }

    #[test]
    fn test_copy_preserves_date() {
        let fx = fixture();
        let ts = local_ts(2014, 6, 1, 10, 0, 0);
        set_mtime(fx.testfile.path().unwrap(), ts);

        let copy = fx
            .testfile
            .copy_to(fx.dir.path().join("copy/newfile.dat"), CopyOptions::default())
            .unwrap();
        assert_eq!(copy.times().unwrap().modified, ts);
        assert_eq!(copy.times().unwrap().accessed, ts);
        assert_eq!(fx.testfile.times().unwrap().modified, ts);
    }

    #[test]
    fn test_copy_leaves_source_times_alone() {
        let fx = fixture();
        let dest_dir = fx.dir.path().join("dest");
        fs::create_dir_all(&dest_dir).unwrap();
        // same size as the source, so the strict scan has to hash both
        write(&dest_dir.join("lookalike.dat"), 9, 1024);
        let src = fx.testfile.path().unwrap();
        let accessed = local_ts(2014, 5, 13, 17, 53, 20);
        let modified = local_ts(2014, 5, 1, 8, 0, 0);
        filetime::set_file_times(
            src,
            FileTime::from_unix_time(accessed, 0),
            FileTime::from_unix_time(modified, 0),
        )
        .unwrap();

        fx.testfile
            .copy_to(dest_dir.join("testfile.dat"), CopyOptions::default())
            .unwrap();
        let times = fx.testfile.times().unwrap();
        assert_eq!(times.accessed, accessed);
        assert_eq!(times.modified, modified);
    }

    #[test]
    fn test_strict_copy_detects_identical_content() {
        let fx = fixture();
        let dest_dir = fx.dir.path().join("dest");
        fs::create_dir_all(&dest_dir).unwrap();
        write(&dest_dir.join("renamed.bin"), 1, 1024);

        let strict = CopyOptions::default();
        assert!(matches!(
            fx.testfile.copy_to(dest_dir.join("testfile.dat"), strict),
            Err(MediaError::DestinationCollision { .. })
        ));
        assert!(!dest_dir.join("testfile.dat").exists());

        let lax = CopyOptions {
            strict: false,
            ..CopyOptions::default()
        };
        assert!(fx.testfile.copy_to(dest_dir.join("testfile.dat"), lax).is_ok());
    }

    #[test]
    fn test_copy_empty_file() {
        let fx = fixture();
        let empty = fx.dir.path().join("empty.dat");
        fs::write(&empty, b"").unwrap();
        let file = MediaFile::open(&empty, None, &fx.codec).unwrap();
        let copy = file
            .copy_to(fx.dir.path().join("copy/empty.dat"), CopyOptions::default())
            .unwrap();
        assert_eq!(copy.size().unwrap(), 0);
    }

    #[test]
    fn test_move_does_not_overwrite() {
        let mut fx = fixture();
        let target = fx.tgtfile.path().unwrap().to_path_buf();
        assert!(matches!(
            fx.testfile.move_to(&target, true),
            Err(MediaError::DestinationCollision { .. })
        ));
        let own = fx.testfile.path().unwrap().to_path_buf();
        assert!(matches!(
            fx.testfile.move_to(&own, false),
            Err(MediaError::DestinationCollision { .. })
        ));
        assert_eq!(fx.testfile.path().unwrap(), own);
    }

    #[test]
    fn test_move_repoints_handle() {
        let mut fx = fixture();
        fx.testfile.set_media_type(Some("ctraps")).unwrap();
        let original = fx.testfile.path().unwrap().to_path_buf();
        let dest = fx.dir.path().join("move/newfile.dat");

        fx.testfile.move_to(&dest, true).unwrap();
        assert_eq!(fx.testfile.path().unwrap(), dest);
        assert!(fx.testfile.exists());
        assert_eq!(fx.testfile.media_type(), Some("ctraps"));
        assert!(!original.exists());
    }

    #[test]
    fn test_delete() {
        let mut fx = fixture();
        let path = fx.testfile.path().unwrap().to_path_buf();
        fx.testfile.delete().unwrap();
        assert!(!path.exists());
        assert!(matches!(fx.testfile.path(), Err(MediaError::InvalidReference)));
        assert!(matches!(fx.testfile.delete(), Err(MediaError::InvalidReference)));

        fs::remove_file(fx.tgtfile.path().unwrap()).unwrap();
        assert!(matches!(fx.tgtfile.delete(), Err(MediaError::NotFound(_))));
    }

    #[test]
    fn test_delete_read_only_file() {
        let mut fx = fixture();
        let path = fx.testfile.path().unwrap().to_path_buf();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms).unwrap();

        fx.testfile.delete().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_set_datetime_arguments() {
        let fx = fixture();
        assert!(matches!(
            fx.testfile.set_datetime(None, false, TouchMode::Both),
            Err(MediaError::MissingArgument(_))
        ));
        assert!(matches!(
            fx.testfile.set_datetime(Some(0), true, TouchMode::Both),
            Err(MediaError::MissingArgument(_))
        ));
        assert!(matches!("x".parse::<TouchMode>(), Err(MediaError::InvalidMode(_))));
        assert_eq!("am".parse::<TouchMode>().unwrap(), TouchMode::Both);
        // the name is not an index
        assert!(matches!(
            fx.testfile.set_datetime(None, true, TouchMode::Both),
            Err(MediaError::Parse(_))
        ));
    }

    #[test]
    fn test_set_datetime_modes() {
        let fx = fixture();
        let base = local_ts(2013, 9, 25, 19, 10, 32);
        set_mtime(fx.testfile.path().unwrap(), base);

        fx.testfile.set_datetime(Some(base + 60), false, TouchMode::Access).unwrap();
        assert_eq!(fx.testfile.datetime(TimeKind::Accessed).unwrap(), base + 60);
        assert_eq!(fx.testfile.datetime(TimeKind::Modified).unwrap(), base);

        fx.testfile.set_datetime(Some(base + 120), false, TouchMode::Modify).unwrap();
        assert_eq!(fx.testfile.datetime(TimeKind::Modified).unwrap(), base + 120);
        assert_eq!(fx.testfile.datetime(TimeKind::Accessed).unwrap(), base + 60);

        fx.testfile.shift_datetime(-120).unwrap();
        assert_eq!(fx.testfile.datetime(TimeKind::Modified).unwrap(), base);
        assert_eq!(fx.testfile.datetime(TimeKind::Accessed).unwrap(), base);
    }

    #[test]
    fn test_set_index_renames() {
        let mut fx = fixture();
        let ts = local_ts(2015, 1, 14, 12, 30, 5);
        set_mtime(fx.testfile.path().unwrap(), ts);
        fx.testfile.set_media_type(Some("footage")).unwrap();

        fx.testfile.set_index(false).unwrap();
        assert_eq!(fx.testfile.name().unwrap(), "MVDC2015011412300501024");
        assert_eq!(fx.testfile.ext().unwrap().as_deref(), Some("dat"));
        assert!(fx.testfile.exists());
        assert_eq!(fx.testfile.datetime_from_index().unwrap(), ts);
        assert!(!fx.dir.path().join("testfile.dat").exists());
    }

    #[test]
    fn test_set_index_requires_media_type() {
        let mut fx = fixture();
        let err = fx.testfile.set_index(false).unwrap_err();
        assert!(matches!(err, MediaError::Indexing { .. }));
        assert!(matches!(err.root_cause(), MediaError::UnknownMediaType(None)));
        assert_eq!(fx.testfile.name().unwrap(), "testfile");
    }

    #[test]
    fn test_set_index_already_indexed() {
        let mut fx = fixture();
        let ts = local_ts(2015, 1, 14, 12, 30, 5);
        set_mtime(fx.testfile.path().unwrap(), ts);
        fx.testfile.set_media_type(Some("footage")).unwrap();
        fx.testfile.set_index(false).unwrap();
        let name = fx.testfile.name().unwrap();

        assert!(matches!(fx.testfile.set_index(false), Err(MediaError::AlreadyIndexed(_))));
        assert_eq!(fx.testfile.name().unwrap(), name);
    }

    #[test]
    fn test_forced_reindex_resyncs_datetime() {
        let fx = fixture();
        let path = fx.dir.path().join("MVDC2015011412300599999.dat");
        write(&path, 3, 1024);
        set_mtime(&path, local_ts(2020, 5, 5, 5, 5, 5));

        // media type comes from the old prefix
        let mut file = MediaFile::open(&path, None, &fx.codec).unwrap();
        file.set_index(true).unwrap();
        assert_eq!(file.name().unwrap(), "MVDC2015011412300501024");
        assert_eq!(
            file.datetime(TimeKind::Modified).unwrap(),
            local_ts(2015, 1, 14, 12, 30, 5)
        );

        // regenerating the same index is a no-op
        file.set_index(true).unwrap();
        assert_eq!(file.name().unwrap(), "MVDC2015011412300501024");
    }

    #[test]
    fn test_set_index_name_collision() {
        let mut fx = fixture();
        let ts = local_ts(2015, 1, 14, 12, 30, 5);
        set_mtime(fx.testfile.path().unwrap(), ts);
        fx.testfile.set_media_type(Some("footage")).unwrap();
        write(&fx.dir.path().join("MVDC2015011412300501024.dat"), 9, 10);

        let err = fx.testfile.set_index(false).unwrap_err();
        assert!(matches!(err.root_cause(), MediaError::NameCollision(_)));
        assert_eq!(fx.testfile.name().unwrap(), "testfile");
        assert_eq!(fs::read(fx.testfile.path().unwrap()).unwrap(), vec![1u8; 1024]);
    }

    #[test]
    fn test_media_type_from_index() {
        let fx = fixture();
        let path = fx.dir.path().join("TRDC2013092519103201024.avi");
        write(&path, 4, 1024);
        let mut file = MediaFile::open(&path, None, &fx.codec).unwrap();
        assert_eq!(file.media_type(), None);
        assert_eq!(file.media_type_from_index().as_deref(), Some("ctraps"));
        file.set_media_type(Some("audio")).unwrap();
        assert_eq!(file.media_type_from_index().as_deref(), Some("audio"));
        assert_eq!(fx.testfile.media_type_from_index(), None);
    }
}
