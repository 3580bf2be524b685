//! On-disk layout of a storage server.
//!
//! Every file `<name>` lives directly under the base path together with its
//! `<name>.meta` sidecar and, after the first committed write, a one
//! generation `<name>.bak` undo point.

use std::io::ErrorKind;
use std::path::PathBuf;

use docs_core::acl::Acl;
use docs_core::meta::{self, FileMeta, MetaParseError};
use docs_core::names::{self, BACKUP_SUFFIX, META_SUFFIX, NameError};
use docs_core::protocol::Status;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("File '{0}' not found on storage")]
    NotFound(String),
    #[error("File '{0}' already exists on storage")]
    Exists(String),
    #[error("Only the owner can delete this file")]
    NotOwner,
    #[error("Undo not available: no backup of '{0}'")]
    NoBackup(String),
    #[error(transparent)]
    InvalidName(#[from] NameError),
    #[error("corrupt metadata: {0}")]
    Meta(#[from] MetaParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn status(&self) -> Status {
        match self {
            // A missing backup is reported as a missing file.
            StoreError::NotFound(_) | StoreError::NoBackup(_) => Status::NotFound,
            StoreError::Exists(_) => Status::FileExists,
            StoreError::NotOwner => Status::OwnerRequired,
            StoreError::InvalidName(_) => Status::InvalidFilename,
            StoreError::Io(err) if err.kind() == ErrorKind::StorageFull => Status::StorageFull,
            StoreError::Meta(_) | StoreError::Io(_) => Status::Internal,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub struct DocStore {
    base_path: PathBuf,
    /// Serializes every read-modify-write of a data file or sidecar.
    write_lock: Mutex<()>,
}

impl DocStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn base_path(&self) -> &std::path::Path {
        &self.base_path
    }

    pub async fn init(&self) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    fn data_path(&self, name: &str) -> StoreResult<PathBuf> {
        names::validate_filename(name)?;
        Ok(self.base_path.join(name))
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{name}{META_SUFFIX}"))
    }

    fn backup_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{name}{BACKUP_SUFFIX}"))
    }

    pub async fn exists(&self, name: &str) -> StoreResult<bool> {
        let path = self.data_path(name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn require(&self, name: &str) -> StoreResult<PathBuf> {
        let path = self.data_path(name)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(path)
    }

    /// Creates an empty file owned by `owner`. The data file is removed
    /// again if its sidecar cannot be written.
    pub async fn create(&self, name: &str, owner: &str) -> StoreResult<FileMeta> {
        let path = self.data_path(name)?;
        let _guard = self.write_lock.lock().await;
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        match file {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::Exists(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        let meta = FileMeta::new(owner);
        if let Err(err) = self.write_meta(name, &meta).await {
            warn!("sidecar for {name} failed, removing data file: {err}");
            let _ = tokio::fs::remove_file(&path).await;
            return Err(err);
        }
        debug!("created {name} for {owner}");
        Ok(meta)
    }

    /// Removes the file, its sidecar and its backup. Only the recorded
    /// owner may delete; a file without an owner can be deleted by anyone.
    pub async fn delete(&self, name: &str, requester: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.require(name).await?;
        let meta = self.read_meta(name).await?;
        if !meta.owner.is_empty() && !meta.is_owner(requester) {
            return Err(StoreError::NotOwner);
        }
        tokio::fs::remove_file(&path).await?;
        for extra in [self.meta_path(name), self.backup_path(name)] {
            match tokio::fs::remove_file(&extra).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!("failed to remove {}: {err}", extra.display()),
            }
        }
        debug!("deleted {name}");
        Ok(())
    }

    pub async fn read(&self, name: &str) -> StoreResult<String> {
        let path = self.require(name).await?;
        Ok(tokio::fs::read_to_string(&path).await?)
    }

    pub async fn meta(&self, name: &str) -> StoreResult<FileMeta> {
        self.require(name).await?;
        self.read_meta(name).await
    }

    /// Raw sidecar text, as returned to the name server by GET_ACL.
    pub async fn meta_text(&self, name: &str) -> StoreResult<String> {
        Ok(self.meta(name).await?.to_sidecar())
    }

    /// Applies `f` to the sidecar and persists the result.
    pub async fn update_meta<F>(&self, name: &str, f: F) -> StoreResult<FileMeta>
    where
        F: FnOnce(&mut FileMeta),
    {
        let _guard = self.write_lock.lock().await;
        self.require(name).await?;
        let mut meta = self.read_meta(name).await?;
        f(&mut meta);
        self.write_meta(name, &meta).await?;
        Ok(meta)
    }

    pub async fn set_acl(&self, name: &str, acl: Acl) -> StoreResult<FileMeta> {
        self.update_meta(name, move |meta| {
            let owner = meta.owner.clone();
            meta.acl = acl;
            meta.acl.revoke(&owner);
        })
        .await
    }

    /// Replaces the content with `edit(current)`, keeping the previous
    /// content as the undo point. If writing fails the backup is moved
    /// back so the original path never stays empty.
    pub async fn commit<F>(&self, name: &str, user: &str, edit: F) -> StoreResult<FileMeta>
    where
        F: FnOnce(&str) -> String,
    {
        let _guard = self.write_lock.lock().await;
        let path = self.require(name).await?;
        let backup = self.backup_path(name);
        let current = tokio::fs::read_to_string(&path).await?;
        let content = edit(&current);

        tokio::fs::rename(&path, &backup).await?;
        if let Err(err) = tokio::fs::write(&path, content.as_bytes()).await {
            warn!("write of {name} failed, restoring backup: {err}");
            if let Err(restore) = tokio::fs::rename(&backup, &path).await {
                warn!("restoring {name} from backup failed: {restore}");
            }
            return Err(err.into());
        }

        let mut meta = self.read_meta(name).await?;
        meta.update_stats(&content);
        meta.modified = meta::now();
        meta.touch(user);
        if let Err(err) = self.write_meta(name, &meta).await {
            warn!("content of {name} committed but sidecar update failed: {err}");
        }
        Ok(meta)
    }

    /// Moves the backup back over the file in one rename.
    pub async fn undo(&self, name: &str) -> StoreResult<FileMeta> {
        let _guard = self.write_lock.lock().await;
        let path = self.require(name).await?;
        let backup = self.backup_path(name);
        if !tokio::fs::try_exists(&backup).await? {
            return Err(StoreError::NoBackup(name.to_string()));
        }
        tokio::fs::rename(&backup, &path).await?;

        let content = tokio::fs::read_to_string(&path).await?;
        let mut meta = self.read_meta(name).await?;
        meta.update_stats(&content);
        meta.modified = meta::now();
        if let Err(err) = self.write_meta(name, &meta).await {
            warn!("undo of {name} done but sidecar update failed: {err}");
        }
        Ok(meta)
    }

    /// Lists stored files, giving any file without a sidecar an ownerless
    /// one.
    pub async fn scan(&self) -> StoreResult<Vec<String>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.base_path).min_depth(1).max_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if names::validate_filename(name).is_err() {
                continue;
            }
            files.push(name.to_string());
        }
        files.sort();

        for name in &files {
            if !tokio::fs::try_exists(self.meta_path(name)).await? {
                warn!("{name} has no sidecar, registering it without an owner");
                let content = tokio::fs::read_to_string(self.base_path.join(name)).await?;
                let mut meta = FileMeta::new("");
                meta.update_stats(&content);
                self.write_meta(name, &meta).await?;
            }
        }
        Ok(files)
    }

    async fn read_meta(&self, name: &str) -> StoreResult<FileMeta> {
        match tokio::fs::read_to_string(self.meta_path(name)).await {
            Ok(text) => Ok(FileMeta::parse(&text)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(FileMeta::new("")),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_meta(&self, name: &str, meta: &FileMeta) -> StoreResult<()> {
        let path = self.meta_path(name);
        let tmp = self.base_path.join(format!(".{name}{META_SUFFIX}.tmp"));
        tokio::fs::write(&tmp, meta.to_sidecar()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
