// Container file access
// Opens files on disk as chunk backing stores

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

/// Why a container file could not be opened or created.
///
/// Opening requires an existing regular file; creating refuses to replace
/// anything already at the path. Other OS failures keep their error kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileError {
    /// No container at the path
    Missing,
    /// The OS denied read or write access
    NoAccess,
    /// `create_container` found a file already at the path
    WouldClobber,
    /// The path names a directory, not a container file
    NotAFile,
    Io(io::ErrorKind),
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileError::Missing => write!(f, "Container file not found"),
            FileError::NoAccess => write!(f, "Access to container file denied"),
            FileError::WouldClobber => write!(f, "Refusing to overwrite an existing file"),
            FileError::NotAFile => write!(f, "Path is a directory, not a container file"),
            FileError::Io(kind) => write!(f, "I/O error on container file: {}", kind),
        }
    }
}

impl std::error::Error for FileError {}

impl From<io::Error> for FileError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FileError::Missing,
            io::ErrorKind::PermissionDenied => FileError::NoAccess,
            io::ErrorKind::AlreadyExists => FileError::WouldClobber,
            kind => FileError::Io(kind),
        }
    }
}

fn check_regular_file(path: &Path) -> Result<(), FileError> {
    if !path.exists() {
        return Err(FileError::Missing);
    }
    if fs::metadata(path)?.is_dir() {
        return Err(FileError::NotAFile);
    }
    Ok(())
}

/// Open an existing container for reading only
pub fn open_container(path: &Path) -> Result<File, FileError> {
    check_regular_file(path)?;
    Ok(File::open(path)?)
}

/// Open an existing container for in-place modification
pub fn open_container_rw(path: &Path) -> Result<File, FileError> {
    check_regular_file(path)?;
    Ok(OpenOptions::new().read(true).write(true).open(path)?)
}

/// Create a new, empty container file. Refuses to clobber an existing file.
pub fn create_container(path: &Path) -> Result<File, FileError> {
    if path.is_dir() {
        return Err(FileError::NotAFile);
    }
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)?)
}
