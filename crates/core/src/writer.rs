//! Pre-sized destination file with positional writes
//!
//! The file is created at its final length before any piece arrives, so an
//! interrupted download leaves a full-size file with zero-filled gaps.
//! Pieces are disjoint, so concurrent positional writes never overlap and
//! need no locking.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Random-access sink for downloaded pieces
#[derive(Debug, Clone)]
pub struct DestinationWriter {
    file: Arc<File>,
    path: PathBuf,
    len: u64,
}

impl DestinationWriter {
    /// Create (or truncate) `path` and pre-size it to `len` bytes
    pub async fn create(path: impl Into<PathBuf>, len: u64) -> io::Result<Self> {
        let path = path.into();
        let open_path = path.clone();
        let file = tokio::task::spawn_blocking(move || {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&open_path)?;
            file.set_len(len)?;
            Ok::<_, io::Error>(file)
        })
        .await
        .map_err(io::Error::other)??;

        Ok(Self {
            file: Arc::new(file),
            path,
            len,
        })
    }

    /// Destination path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pre-allocated length
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the destination is zero-length
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Write `data` at `offset`
    pub async fn write_at(&self, offset: u64, data: Vec<u8>) -> io::Result<()> {
        let end = offset + data.len() as u64;
        if end > self.len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("write {offset}..{end} past end of {} byte file", self.len),
            ));
        }
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || write_all_at(&file, &data, offset))
            .await
            .map_err(io::Error::other)?
    }

    /// Flush file contents to disk
    pub async fn sync(&self) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || file.sync_all())
            .await
            .map_err(io::Error::other)?
    }
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
