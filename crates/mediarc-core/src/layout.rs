use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::entity::PathEntity;
use crate::error::{MediaError, Result};
use crate::file::{MediaFile, TimeKind};

/// Maps an import root and a file to the directory the file belongs in.
pub trait Organize {
    fn subdirectory(&self, root: &Path, file: &MediaFile) -> Result<PathBuf>;
}

impl<F> Organize for F
where
    F: Fn(&Path, &MediaFile) -> PathBuf,
{
    fn subdirectory(&self, root: &Path, file: &MediaFile) -> Result<PathBuf> {
        Ok(self(root, file))
    }
}

/// Named archive layouts.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutStrategy {
    /// Everything directly under the root
    Flat,
    /// `<root>/YYYY/MM`
    YearMonth,
    /// `<root>/<PREFIX>`
    MediaType,
    /// `<root>/<PREFIX>/YYYY/MM`
    #[default]
    MediaTypeYearMonth,
}

impl Organize for LayoutStrategy {
    fn subdirectory(&self, root: &Path, file: &MediaFile) -> Result<PathBuf> {
        Ok(match self {
            LayoutStrategy::Flat => root.to_path_buf(),
            LayoutStrategy::YearMonth => root.join(year_month(file)?),
            LayoutStrategy::MediaType => root.join(prefix(file)?),
            LayoutStrategy::MediaTypeYearMonth => root.join(prefix(file)?).join(year_month(file)?),
        })
    }
}

/// `YYYY/MM` from the index date, or from mtime for files not yet indexed.
fn year_month(file: &MediaFile) -> Result<PathBuf> {
    let timestamp = match file.datetime_from_index() {
        Ok(ts) => ts,
        Err(_) => file.datetime(TimeKind::Modified)?,
    };
    let local = DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| MediaError::InvalidNumber(timestamp))?
        .with_timezone(&Local);
    let year = local.format("%Y").to_string();
    let month = local.format("%m").to_string();
    Ok(Path::new(&year).join(month))
}

fn prefix(file: &MediaFile) -> Result<String> {
    let media_type = file.media_type_from_index();
    Ok(file.codec().prefix(media_type.as_deref())?.to_string())
}
