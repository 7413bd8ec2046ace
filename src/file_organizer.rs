/// Placement of classified files into category directories.
///
/// Every file is moved to `<parent>/<organized_dir>/<category>/<file name>`,
/// where `<parent>` is the directory that currently holds it. Directory
/// creation is idempotent, so concurrent or repeated runs over the same tree
/// do not trip over directories that already exist.
use crate::config::PipelineConfig;
use crate::file_category::Category;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while placing a file.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// The source file disappeared before it could be moved.
    #[error("Source file {} no longer exists", .path.display())]
    SourceMissing { path: PathBuf },
    /// The source path has no file name (e.g. `..`).
    #[error("Path {} has no file name component", .path.display())]
    InvalidSource { path: PathBuf },
    /// Failed to create the organized root or a category directory.
    #[error("Failed to create directory {}: {source}", .path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },
    /// A file with the same name is already at the destination.
    #[error("Destination {} already exists", .path.display())]
    DestinationExists { path: PathBuf },
    /// Failed to move a file to its category directory.
    #[error("Failed to move {} to {}: {source}", .from.display(), .to.display())]
    FileMoveFailure {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

/// Result type for placement operations.
pub type PlacementResult<T> = Result<T, PlacementError>;

/// What to do when the destination file name is already taken.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Leave both files alone and report the collision.
    #[default]
    Fail,
    /// Move to `<stem>_<n>.<ext>` using the smallest free `n`.
    Rename,
    /// Replace the existing file.
    Overwrite,
}

/// Moves files into `organized/<category>/` next to where they are.
#[derive(Debug, Clone)]
pub struct FileOrganizer {
    organized_dir: String,
    collision: CollisionPolicy,
}

impl FileOrganizer {
    pub fn new(organized_dir: impl Into<String>, collision: CollisionPolicy) -> Self {
        Self {
            organized_dir: organized_dir.into(),
            collision,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.organized_dir.clone(), config.on_collision)
    }

    pub fn collision_policy(&self) -> CollisionPolicy {
        self.collision
    }

    /// Returns `<parent>/<organized_dir>` for a file.
    pub fn destination_root(&self, file_path: &Path) -> PathBuf {
        let parent = file_path.parent().unwrap_or_else(|| Path::new(""));
        parent.join(&self.organized_dir)
    }

    /// Computes where `file_path` would land without touching the filesystem.
    ///
    /// # Examples
    ///
    /// ```
    /// use classifile::file_category::Category;
    /// use classifile::file_organizer::{CollisionPolicy, FileOrganizer};
    /// use std::path::Path;
    ///
    /// let organizer = FileOrganizer::new("organized", CollisionPolicy::Fail);
    /// let dest = organizer
    ///     .destination_for(Path::new("/inbox/report.pdf"), &Category::normalize("documents"))
    ///     .unwrap();
    /// assert_eq!(dest, Path::new("/inbox/organized/documents/report.pdf"));
    /// ```
    pub fn destination_for(&self, file_path: &Path, category: &Category) -> PlacementResult<PathBuf> {
        let file_name = file_path
            .file_name()
            .ok_or_else(|| PlacementError::InvalidSource {
                path: file_path.to_path_buf(),
            })?;
        Ok(self
            .destination_root(file_path)
            .join(category.dir_name())
            .join(file_name))
    }

    /// Creates `<parent>/<organized_dir>/<category>` if needed and returns it.
    ///
    /// Calling this for a directory that already exists is not an error.
    pub fn ensure_category_dir(&self, file_path: &Path, category: &Category) -> PlacementResult<PathBuf> {
        let category_path = self.destination_root(file_path).join(category.dir_name());
        fs::create_dir_all(&category_path).map_err(|e| PlacementError::DirectoryCreationFailed {
            path: category_path.clone(),
            source: e,
        })?;
        Ok(category_path)
    }

    /// Moves a file into its category directory and returns the new absolute path.
    ///
    /// Under [`CollisionPolicy::Fail`] and [`CollisionPolicy::Rename`] an
    /// existing entry at the destination is never replaced, including dangling
    /// symlinks and entries that appear between the check and the move.
    ///
    /// # Errors
    ///
    /// * [`PlacementError::SourceMissing`] if the file is gone (checked up front
    ///   and again when the move itself reports `NotFound`)
    /// * [`PlacementError::DirectoryCreationFailed`] if the directories cannot be made
    /// * [`PlacementError::DestinationExists`] under [`CollisionPolicy::Fail`]
    /// * [`PlacementError::FileMoveFailure`] for any other I/O failure
    pub fn place(&self, file_path: &Path, category: &Category) -> PlacementResult<PathBuf> {
        let source = std::path::absolute(file_path).map_err(|_| PlacementError::SourceMissing {
            path: file_path.to_path_buf(),
        })?;

        match fs::metadata(&source) {
            Ok(meta) if meta.is_file() => {}
            _ => {
                return Err(PlacementError::SourceMissing { path: source });
            }
        }

        let planned = self.destination_for(&source, category)?;
        self.ensure_category_dir(&source, category)?;

        let destination = match self.collision {
            CollisionPolicy::Fail => {
                relocate(&source, &planned)?;
                planned
            }
            CollisionPolicy::Rename => relocate_to_free_name(&source, planned)?,
            CollisionPolicy::Overwrite => {
                if entry_exists(&planned) {
                    warn!(path = %planned.display(), "overwriting existing file");
                }
                replace(&source, &planned)?;
                planned
            }
        };

        debug!(from = %source.display(), to = %destination.display(), "moved file");
        Ok(destination)
    }
}

/// Whether anything (file, directory or symlink, dangling or not) sits at `path`.
fn entry_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Finds `<stem>_<n>.<ext>` next to `taken` with the smallest free `n >= 1`.
fn next_free_name(taken: &Path) -> PathBuf {
    let parent = taken.parent().unwrap_or_else(|| Path::new(""));
    let stem = taken
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let ext = taken
        .extension()
        .map(|e| e.to_string_lossy().into_owned());

    let mut counter = 1;
    loop {
        let name = match &ext {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        let candidate = parent.join(name);
        if !entry_exists(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

fn move_error(from: &Path, to: &Path, source: io::Error) -> PlacementError {
    if source.kind() == io::ErrorKind::NotFound && !from.exists() {
        PlacementError::SourceMissing {
            path: from.to_path_buf(),
        }
    } else {
        PlacementError::FileMoveFailure {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        }
    }
}

/// Moves `from` to `to` without ever replacing an entry at `to`.
///
/// Hard-links the file into place, or copies it into a freshly created file
/// when linking is not possible (other volume, no link support), then
/// removes the source. If the source cannot be removed the new entry is
/// dropped again so exactly one copy remains.
fn relocate(from: &Path, to: &Path) -> PlacementResult<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(PlacementError::DestinationExists {
                path: to.to_path_buf(),
            });
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(move_error(from, to, e)),
        Err(e) => {
            debug!(from = %from.display(), error = %e, "hard link unavailable, copying");
            copy_exclusive(from, to)?;
        }
    }

    if let Err(e) = fs::remove_file(from) {
        let _ = fs::remove_file(to);
        return Err(move_error(from, to, e));
    }
    Ok(())
}

/// [`CollisionPolicy::Rename`]: retries with the next free name whenever the
/// candidate turns out to be taken.
fn relocate_to_free_name(from: &Path, planned: PathBuf) -> PlacementResult<PathBuf> {
    let mut candidate = planned.clone();
    loop {
        match relocate(from, &candidate) {
            Ok(()) => return Ok(candidate),
            Err(PlacementError::DestinationExists { .. }) => {
                candidate = next_free_name(&planned);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Copies `from` into a new file at `to`; fails if `to` already exists.
fn copy_exclusive(from: &Path, to: &Path) -> PlacementResult<()> {
    let mut reader = fs::File::open(from).map_err(|e| move_error(from, to, e))?;
    let mut writer = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(to)
        .map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                PlacementError::DestinationExists {
                    path: to.to_path_buf(),
                }
            } else {
                move_error(from, to, e)
            }
        })?;

    let copied = io::copy(&mut reader, &mut writer)
        .and_then(|_| reader.metadata())
        .and_then(|meta| writer.set_permissions(meta.permissions()));
    if let Err(e) = copied {
        let _ = fs::remove_file(to);
        return Err(move_error(from, to, e));
    }
    Ok(())
}

/// [`CollisionPolicy::Overwrite`]: renames over `to`, copying across volumes.
fn replace(from: &Path, to: &Path) -> PlacementResult<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(from = %from.display(), "cross-device move, copying");
            copy_over(from, to)
        }
        Err(e) => Err(move_error(from, to, e)),
    }
}

/// Copies `from` next to `to` under a staging name, removes the source and
/// only then renames the copy over `to`. A failure before the final rename
/// leaves the previous `to` untouched.
fn copy_over(from: &Path, to: &Path) -> PlacementResult<()> {
    let staging = staging_path(to);
    copy_exclusive(from, &staging)?;

    if let Err(e) = fs::remove_file(from) {
        let _ = fs::remove_file(&staging);
        return Err(move_error(from, to, e));
    }
    fs::rename(&staging, to).map_err(|e| move_error(&staging, to, e))
}

/// A free hidden name in `to`'s directory for an in-progress copy.
fn staging_path(to: &Path) -> PathBuf {
    let parent = to.parent().unwrap_or_else(|| Path::new(""));
    let name = to
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());

    let mut counter = 0;
    loop {
        let candidate = parent.join(format!(".{}.{}.partial", name, counter));
        if !entry_exists(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}
