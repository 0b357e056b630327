//! Archive extraction for `.zip` and `.tar.gz` resources.
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;

use super::ArchiveFormat;
use super::error::InstallError;

/// Directory an archive at `path` extracts into: the same path with the
/// archive extension removed (`micro-1.4.1-win64.zip` → `micro-1.4.1-win64`).
///
/// Suffixes are matched case-insensitively.  A path that carries none of the
/// format's suffixes loses its last extension, or gains `.d` when it has
/// none, so the directory never collides with the archive itself.
#[must_use]
pub fn extraction_dir(path: &Path, format: ArchiveFormat) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = name.to_ascii_lowercase();
    let stem = format
        .suffixes()
        .iter()
        .find(|suffix| lower.ends_with(*suffix) && lower.len() > suffix.len())
        .and_then(|suffix| name.get(..name.len() - suffix.len()));
    match stem {
        Some(stem) => path.with_file_name(stem),
        None if path.extension().is_some() => path.with_extension(""),
        None => path.with_file_name(format!("{name}.d")),
    }
}

/// Extract every entry of the archive at `path` into its
/// [`extraction_dir`], preserving relative structure.  Returns the
/// directory.
///
/// # Errors
///
/// Returns [`InstallError::ArchiveCorrupt`] when the archive cannot be
/// decoded and [`InstallError::FilesystemFailure`] when the target cannot be
/// written.
pub fn extract(path: &Path, format: ArchiveFormat) -> Result<PathBuf, InstallError> {
    let file = File::open(path).map_err(|e| InstallError::filesystem(path, e))?;
    let dest = extraction_dir(path, format);
    fs::create_dir_all(&dest).map_err(|e| InstallError::filesystem(&dest, e))?;
    match format {
        ArchiveFormat::Zip => unpack_zip(file, path, &dest)?,
        ArchiveFormat::TarGz => unpack_tar_gz(file, path, &dest)?,
    }
    Ok(dest)
}

fn unpack_tar_gz(file: File, path: &Path, dest: &Path) -> Result<(), InstallError> {
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    let entries = archive.entries().map_err(|e| corrupt(path, &e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| corrupt(path, &e))?;
        // unpack_in refuses entries escaping `dest`.
        entry
            .unpack_in(dest)
            .map_err(|e| classify(path, dest, e))?;
    }
    Ok(())
}

fn unpack_zip(file: File, path: &Path, dest: &Path) -> Result<(), InstallError> {
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(path, &e))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| corrupt(path, &e))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(InstallError::ArchiveCorrupt {
                path: path.to_path_buf(),
                reason: format!("entry '{}' escapes the extraction directory", entry.name()),
            });
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| InstallError::filesystem(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| InstallError::filesystem(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| InstallError::filesystem(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| classify(path, &target, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&target, fs::Permissions::from_mode(mode))
                    .map_err(|e| InstallError::filesystem(&target, e))?;
            }
        }
    }
    Ok(())
}

fn corrupt(path: &Path, err: &dyn std::fmt::Display) -> InstallError {
    InstallError::ArchiveCorrupt {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Split an I/O error raised mid-extraction into "could not write" and
/// "could not decode".
fn classify(archive: &Path, target: &Path, err: io::Error) -> InstallError {
    match err.kind() {
        io::ErrorKind::PermissionDenied
        | io::ErrorKind::AlreadyExists
        | io::ErrorKind::ReadOnlyFilesystem
        | io::ErrorKind::StorageFull
        | io::ErrorKind::IsADirectory
        | io::ErrorKind::NotADirectory => InstallError::filesystem(target, err),
        _ => corrupt(archive, &err),
    }
}
