use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{MediaError, Result};
use crate::index::IndexCodec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    File,
    Directory,
}

impl EntityKind {
    fn matches(self, path: &Path) -> bool {
        match self {
            EntityKind::File => path.is_file(),
            EntityKind::Directory => path.is_dir(),
        }
    }
}

/// State shared by every filesystem handle.
///
/// `path == None` means the handle is detached (unlinked, moved away or deleted).
#[derive(Debug, Clone)]
pub struct EntityCore {
    path: Option<PathBuf>,
    media_type: Option<String>,
    codec: Arc<IndexCodec>,
}

impl EntityCore {
    pub(crate) fn new(
        path: PathBuf,
        kind: EntityKind,
        media_type: Option<&str>,
        codec: &Arc<IndexCodec>,
    ) -> Result<Self> {
        if !kind.matches(&path) {
            return Err(MediaError::NotFound(path));
        }
        let mut core = Self {
            path: Some(path),
            media_type: None,
            codec: Arc::clone(codec),
        };
        core.set_media_type(media_type)?;
        Ok(core)
    }

    pub(crate) fn set_path(&mut self, path: PathBuf) {
        self.path = Some(path);
    }

    fn set_media_type(&mut self, media_type: Option<&str>) -> Result<()> {
        match media_type {
            Some(t) if !self.codec.is_registered(t) => {
                Err(MediaError::InvalidMediaType(t.to_string()))
            }
            _ => {
                self.media_type = media_type.map(str::to_string);
                Ok(())
            }
        }
    }
}

/// Common behavior of [`MediaFile`](crate::MediaFile) and
/// [`MediaDirectory`](crate::MediaDirectory).
pub trait PathEntity {
    fn core(&self) -> &EntityCore;
    fn core_mut(&mut self) -> &mut EntityCore;
    fn kind(&self) -> EntityKind;

    /// True iff the handle is attached and its path is the expected kind of object.
    fn exists(&self) -> bool {
        self.core()
            .path
            .as_deref()
            .is_some_and(|p| self.kind().matches(p))
    }

    fn path(&self) -> Result<&Path> {
        self.core().path.as_deref().ok_or(MediaError::InvalidReference)
    }

    /// Basename; for files the extension is stripped.
    fn name(&self) -> Result<String> {
        let path = self.path()?;
        let name = match self.kind() {
            EntityKind::File => path.file_stem(),
            EntityKind::Directory => path.file_name(),
        };
        Ok(name.map(|n| n.to_string_lossy().into_owned()).unwrap_or_default())
    }

    /// Containing directory.
    fn dir(&self) -> Result<&Path> {
        Ok(self.path()?.parent().unwrap_or(Path::new("")))
    }

    /// Detach the handle without touching the filesystem.
    fn unlink(&mut self) {
        self.core_mut().path = None;
    }

    fn media_type(&self) -> Option<&str> {
        self.core().media_type.as_deref()
    }

    /// Tag the handle with a registered media type, or clear it with `None`.
    fn set_media_type(&mut self, media_type: Option<&str>) -> Result<()> {
        self.core_mut().set_media_type(media_type)
    }

    fn codec(&self) -> &Arc<IndexCodec> {
        &self.core().codec
    }

    /// The path, provided it still exists on disk.
    fn existing_path(&self) -> Result<&Path> {
        let path = self.path()?;
        if !self.kind().matches(path) {
            return Err(MediaError::NotFound(path.to_path_buf()));
        }
        Ok(path)
    }
}
