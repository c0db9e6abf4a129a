//! Directory-backed object store.
//!
//! [`LocalStore`] maps an account onto a directory tree:
//!
//! ```text
//! <root>/<account>/<container>/<blob name>
//! <root>/<account>/<container>/.gzchunk-blocks/<encoded blob name>/<encoded block id>
//! ```
//!
//! Staged blocks live in a per-blob staging directory until the block list is
//! committed. A commit assembles the listed blocks into a temporary file,
//! renames it over the blob and removes the staging directory, so readers
//! never observe a partially written blob.

use std::io;
use std::path::{Component, Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;

use super::{BlobRef, ByteSource, ObjectStore, StoreResult};
use crate::block::{BlockId, ContentMd5};
use crate::error::{ErrorCode, StorageError};

const STAGING_DIR: &str = ".gzchunk-blocks";

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    account_root: PathBuf,
}

impl LocalStore {
    /// Creates a store for `account` under `root`. Directories are created lazily.
    pub fn new(root: impl AsRef<Path>, account: &str) -> Self {
        Self {
            account_root: root.as_ref().join(account),
        }
    }

    /// Returns the file path of a committed blob.
    pub fn blob_path(&self, blob: &BlobRef) -> StoreResult<PathBuf> {
        check_segment(blob.container(), "container")?;
        check_name(blob.name())?;
        Ok(self.account_root.join(blob.container()).join(blob.name()))
    }

    fn staging_dir(&self, blob: &BlobRef) -> StoreResult<PathBuf> {
        check_segment(blob.container(), "container")?;
        check_name(blob.name())?;
        Ok(self
            .account_root
            .join(blob.container())
            .join(STAGING_DIR)
            .join(URL_SAFE_NO_PAD.encode(blob.name())))
    }

    fn block_path(&self, blob: &BlobRef, block_id: &BlockId) -> StoreResult<PathBuf> {
        Ok(self
            .staging_dir(blob)?
            .join(URL_SAFE_NO_PAD.encode(block_id.as_str())))
    }

    async fn open(&self, blob: &BlobRef) -> StoreResult<ByteSource> {
        let path = self.blob_path(blob)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| map_io(e, &path))?;
        Ok(Box::new(file))
    }

    async fn stage(
        &self,
        blob: &BlobRef,
        block_id: &BlockId,
        data: &[u8],
        checksum: &ContentMd5,
    ) -> StoreResult<()> {
        if ContentMd5::compute(data) != *checksum {
            return Err(StorageError::new(
                ErrorCode::Md5Mismatch,
                format!("checksum mismatch for block {} of {}", block_id, blob),
            ));
        }

        let path = self.block_path(blob, block_id)?;
        let dir = self.staging_dir(blob)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| map_io(e, &dir))?;

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| map_io(e, &tmp))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| map_io(e, &path))?;
        log::trace!("staged {} bytes at {}", data.len(), path.display());
        Ok(())
    }

    async fn commit(&self, blob: &BlobRef, block_ids: &[BlockId]) -> StoreResult<()> {
        let target = self.blob_path(blob)?;
        let staging = self.staging_dir(blob)?;

        let mut sources = Vec::with_capacity(block_ids.len());
        for id in block_ids {
            let path = self.block_path(blob, id)?;
            match tokio::fs::try_exists(&path).await {
                Ok(true) => sources.push(path),
                Ok(false) => {
                    return Err(StorageError::new(
                        ErrorCode::InvalidBlockList,
                        format!("block {} of {} was never staged", id, blob),
                    ));
                }
                Err(e) => return Err(map_io(e, &path)),
            }
        }

        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| map_io(e, &staging))?;
        let assembled = staging.join("commit.tmp");
        let mut out = tokio::fs::File::create(&assembled)
            .await
            .map_err(|e| map_io(e, &assembled))?;
        for path in &sources {
            let bytes = tokio::fs::read(path).await.map_err(|e| map_io(e, path))?;
            out.write_all(&bytes)
                .await
                .map_err(|e| map_io(e, &assembled))?;
        }
        out.flush().await.map_err(|e| map_io(e, &assembled))?;
        drop(out);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(e, parent))?;
        }
        tokio::fs::rename(&assembled, &target)
            .await
            .map_err(|e| map_io(e, &target))?;

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            log::warn!(
                "failed to clean staging directory {}: {}",
                staging.display(),
                e
            );
        }
        Ok(())
    }
}

impl ObjectStore for LocalStore {
    fn open_read<'a>(&'a self, blob: &'a BlobRef) -> BoxFuture<'a, StoreResult<ByteSource>> {
        Box::pin(self.open(blob))
    }

    fn put_block<'a>(
        &'a self,
        blob: &'a BlobRef,
        block_id: &'a BlockId,
        data: &'a [u8],
        checksum: &'a ContentMd5,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(self.stage(blob, block_id, data, checksum))
    }

    fn put_block_list<'a>(
        &'a self,
        blob: &'a BlobRef,
        block_ids: &'a [BlockId],
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(self.commit(blob, block_ids))
    }
}

fn invalid_name(what: &str, value: &str) -> StorageError {
    StorageError::new(
        ErrorCode::Other("InvalidResourceName".into()),
        format!("invalid {} name '{}'", what, value),
    )
}

fn check_segment(value: &str, what: &str) -> StoreResult<()> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(invalid_name(what, value));
    }
    Ok(())
}

/// Blob names may contain `/` separated virtual directories, but must stay
/// inside the container.
fn check_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.contains('\\') || name.starts_with(STAGING_DIR) {
        return Err(invalid_name("blob", name));
    }
    let path = Path::new(name);
    if !path
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(invalid_name("blob", name));
    }
    Ok(())
}

fn map_io(err: io::Error, path: &Path) -> StorageError {
    let message = format!("{}: {}", path.display(), err);
    let code = match err.kind() {
        io::ErrorKind::NotFound => ErrorCode::BlobNotFound,
        io::ErrorKind::PermissionDenied => ErrorCode::AuthenticationFailed,
        io::ErrorKind::TimedOut => ErrorCode::OperationTimedOut,
        _ => ErrorCode::Other("LocalIo".into()),
    };
    StorageError::new(code, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_commit_assembles_blocks_in_list_order() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path(), "acct");
        let blob = BlobRef::new("out", "dir/part000000.csv");
        let ids = [BlockId::derive(blob.name(), 0), BlockId::derive(blob.name(), 1)];

        store
            .put_block(&blob, &ids[1], b"b\n", &ContentMd5::compute(b"b\n"))
            .await
            .unwrap();
        store
            .put_block(&blob, &ids[0], b"a\n", &ContentMd5::compute(b"a\n"))
            .await
            .unwrap();
        store.put_block_list(&blob, &ids).await.unwrap();

        let path = dir.path().join("acct/out/dir/part000000.csv");
        assert_eq!(std::fs::read(&path).unwrap(), b"a\nb\n");
        assert!(!dir.path().join("acct/out").join(STAGING_DIR).join(URL_SAFE_NO_PAD.encode(blob.name())).exists());

        let mut reader = store.open_read(&blob).await.unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"a\nb\n");
    }

    #[tokio::test]
    async fn test_missing_blob_and_block() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path(), "acct");
        let blob = BlobRef::new("in", "missing.gz");

        let err = store.open_read(&blob).await.err().unwrap();
        assert_eq!(err.code, ErrorCode::BlobNotFound);

        let err = store
            .put_block_list(&blob, &[BlockId::derive("missing.gz", 0)])
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidBlockList);
    }

    #[tokio::test]
    async fn test_checksum_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path(), "acct");
        let blob = BlobRef::new("out", "x");
        let err = store
            .put_block(&blob, &BlockId::derive("x", 0), b"abc", &ContentMd5::compute(b"abd"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Md5Mismatch);
    }

    #[test]
    fn test_rejects_escaping_names() {
        let store = LocalStore::new("/tmp/unused", "acct");
        for name in ["../x", "/abs", "a/../../b", "", ".gzchunk-blocks/x", "a\\b"] {
            assert!(store.blob_path(&BlobRef::new("c", name)).is_err(), "{}", name);
        }
        assert!(store.blob_path(&BlobRef::new("..", "x")).is_err());
        assert!(store.blob_path(&BlobRef::new("c", "a/b/c.csv")).is_ok());
    }
}
