//! File moves and copies.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::debug;

use super::error::RelocateError;

const BUFFER_SIZE: usize = 4 * 1024 * 1024; // 4 MB

/// How a taken destination name is disambiguated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuffixStyle {
    /// `Game (1).chd`
    Parenthesized,
    /// `Game_1.bin`
    Underscore,
}

/// First free path for `file_name` inside `dir`.
pub fn unique_destination(dir: &Path, file_name: &str, style: SuffixStyle) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let extension = name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1u32;
    loop {
        let numbered = match style {
            SuffixStyle::Parenthesized => format!("{} ({}){}", stem, counter, extension),
            SuffixStyle::Underscore => format!("{}_{}{}", stem, counter, extension),
        };
        let candidate = dir.join(numbered);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Attempts to move a file atomically (rename).
///
/// Returns `Ok(false)` when source and destination are on different
/// filesystems and a copy is needed instead.
pub async fn try_atomic_move(source: &Path, destination: &Path) -> Result<bool, std::io::Error> {
    match fs::rename(source, destination).await {
        Ok(()) => Ok(true),
        Err(e) => {
            // Cross-filesystem moves fail with EXDEV (18 on Linux)
            if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) {
                Ok(false)
            } else {
                Err(e)
            }
        }
    }
}

/// Copies a file, optionally hashing the bytes as they stream through.
pub async fn copy_file(
    source: &Path,
    destination: &Path,
    calculate_checksum: bool,
) -> Result<(u64, Option<String>), RelocateError> {
    let source_file = File::open(source).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RelocateError::SourceNotFound {
                path: source.to_path_buf(),
            }
        } else {
            RelocateError::Io(e)
        }
    })?;

    let dest_file = File::create(destination).await.map_err(|e| {
        RelocateError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
    })?;

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, source_file);
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, dest_file);
    let mut hasher = calculate_checksum.then(Sha256::new);

    let mut total_bytes = 0u64;
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer).await.map_err(|e| {
            RelocateError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
        })?;

        if bytes_read == 0 {
            break;
        }

        if let Some(ref mut h) = hasher {
            h.update(&buffer[..bytes_read]);
        }

        writer.write_all(&buffer[..bytes_read]).await.map_err(|e| {
            RelocateError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
        })?;

        total_bytes += bytes_read as u64;
    }

    writer.flush().await.map_err(|e| {
        RelocateError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
    })?;

    let checksum = hasher.map(|h| format!("{:x}", h.finalize()));

    Ok((total_bytes, checksum))
}

/// SHA-256 of a file, hex encoded.
pub async fn sha256_file(path: &Path) -> Result<String, RelocateError> {
    let file = File::open(path).await?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut hasher = Sha256::new();
    loop {
        let bytes_read = reader.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Copies and checks the copy against the source's checksum.
pub async fn copy_verified(source: &Path, destination: &Path) -> Result<u64, RelocateError> {
    let (size, expected) = copy_file(source, destination, true).await?;
    let actual = sha256_file(destination).await?;
    match expected {
        Some(expected) if expected != actual => {
            let _ = fs::remove_file(destination).await;
            Err(RelocateError::ChecksumMismatch {
                path: destination.to_path_buf(),
                expected,
                actual,
            })
        }
        _ => Ok(size),
    }
}

/// Moves a file, falling back to copy and delete across filesystems.
pub async fn move_file(
    source: &Path,
    destination: &Path,
    verify: bool,
) -> Result<u64, RelocateError> {
    if !source.exists() {
        return Err(RelocateError::SourceNotFound {
            path: source.to_path_buf(),
        });
    }

    let moved = try_atomic_move(source, destination).await.map_err(|e| {
        RelocateError::move_failed(source.to_path_buf(), destination.to_path_buf(), e)
    })?;
    if moved {
        return Ok(fs::metadata(destination).await?.len());
    }

    debug!(
        source = %source.display(),
        destination = %destination.display(),
        "Cross-device move, copying instead"
    );
    let size = if verify {
        copy_verified(source, destination).await?
    } else {
        copy_file(source, destination, false).await?.0
    };
    fs::remove_file(source)
        .await
        .map_err(|e| RelocateError::RemoveFailed {
            path: source.to_path_buf(),
            source: e,
        })?;
    Ok(size)
}

/// Creates a directory and its parents.
pub async fn ensure_dir(path: &Path) -> Result<(), RelocateError> {
    if path.exists() && !path.is_dir() {
        return Err(RelocateError::NotADirectory {
            path: path.to_path_buf(),
        });
    }
    fs::create_dir_all(path)
        .await
        .map_err(|e| RelocateError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: e,
        })
}
