//! In-memory peer filesystem.
//!
//! Implements the peer side of the handle protocol against a plain map:
//! every successful `create_file` opens an [`OpenFileContext`] keyed by the
//! call's [`OpId`], `delete_file`/`delete_directory` only check and mark, and
//! the actual delete runs when the context is closed. Used by the client
//! demo and by tests. All data is ephemeral.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};
use webfs_types::{
    AsyncFileInfo, CreateFileReply, DiskFreeSpace, FileAccess, FileAttributes, FileInformation,
    FileMode, FileOptions, FileShare, FsResult, OpId,
};

use crate::error::{FsError, FsErrorResult};
use crate::ops::AsyncFsOps;
use crate::path::{file_name, normalize, parent};

#[derive(Debug, Clone, Copy)]
struct Meta {
    attributes: FileAttributes,
    created: SystemTime,
    accessed: SystemTime,
    modified: SystemTime,
}

impl Meta {
    fn new(attributes: FileAttributes) -> Self {
        let now = SystemTime::now();
        Self {
            attributes,
            created: now,
            accessed: now,
            modified: now,
        }
    }
}

#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, meta: Meta },
    Directory { meta: Meta },
}

impl Entry {
    fn file() -> Self {
        Entry::File {
            data: Vec::new(),
            meta: Meta::new(FileAttributes::NORMAL),
        }
    }

    fn directory() -> Self {
        Entry::Directory {
            meta: Meta::new(FileAttributes::DIRECTORY),
        }
    }

    fn is_directory(&self) -> bool {
        matches!(self, Entry::Directory { .. })
    }

    fn meta_mut(&mut self) -> &mut Meta {
        match self {
            Entry::File { meta, .. } | Entry::Directory { meta } => meta,
        }
    }

    fn information(&self, name: &str) -> FileInformation {
        let (meta, length) = match self {
            Entry::File { data, meta } => (meta, data.len() as u64),
            Entry::Directory { meta } => (meta, 0),
        };
        FileInformation {
            file_name: name.to_string(),
            attributes: meta.attributes,
            creation_time: Some(meta.created),
            last_access_time: Some(meta.accessed),
            last_write_time: Some(meta.modified),
            length,
        }
    }
}

/// State for one open handle, alive from a successful create until close.
#[derive(Debug, Clone)]
pub struct OpenFileContext {
    /// Normalized path of the opened entry.
    pub path: String,
    pub access: FileAccess,
    pub share: FileShare,
    pub mode: FileMode,
    pub options: FileOptions,
    pub attributes: FileAttributes,
    /// Flags as last reported by the caller, plus the pending delete mark.
    pub info: AsyncFileInfo,
    pub opened_at: SystemTime,
}

/// In-memory filesystem with handle contexts.
pub struct MemoryFs {
    entries: RwLock<HashMap<String, Entry>>,
    open: Mutex<HashMap<OpId, OpenFileContext>>,
    capacity: u64,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create a new empty filesystem with a 1 GiB volume.
    pub fn new() -> Self {
        Self::with_capacity(DiskFreeSpace::default().total_bytes)
    }

    /// Empty filesystem holding at most `capacity` bytes of file data.
    pub fn with_capacity(capacity: u64) -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(String::new(), Entry::directory());
        Self {
            entries: RwLock::new(entries),
            open: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn read_entries(&self) -> FsErrorResult<RwLockReadGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .read()
            .map_err(|_| FsError::other("lock poisoned"))
    }

    fn write_entries(&self) -> FsErrorResult<RwLockWriteGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .write()
            .map_err(|_| FsError::other("lock poisoned"))
    }

    // ========================================================================
    // Seeding and inspection
    // ========================================================================

    /// Write a whole file, creating parent directories as needed.
    pub fn insert_file(&self, path: &str, data: impl Into<Vec<u8>>) -> FsErrorResult<()> {
        let key = normalize(path);
        if key.is_empty() {
            return Err(FsError::is_a_directory("/"));
        }
        let mut entries = self.write_entries()?;
        Self::ensure_parents(&mut entries, &key)?;
        if entries.get(&key).is_some_and(Entry::is_directory) {
            return Err(FsError::is_a_directory(key));
        }
        entries.insert(
            key,
            Entry::File {
                data: data.into(),
                meta: Meta::new(FileAttributes::NORMAL),
            },
        );
        Ok(())
    }

    /// Create a directory and any missing parents.
    pub fn insert_dir(&self, path: &str) -> FsErrorResult<()> {
        let key = normalize(path);
        let mut entries = self.write_entries()?;
        Self::ensure_parents(&mut entries, &key)?;
        match entries.get(&key) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(Entry::File { .. }) => Err(FsError::already_exists(key)),
            None => {
                entries.insert(key, Entry::directory());
                Ok(())
            }
        }
    }

    /// Whole contents of a file.
    pub fn contents(&self, path: &str) -> FsErrorResult<Vec<u8>> {
        let key = normalize(path);
        match self.read_entries()?.get(&key) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Directory { .. }) => Err(FsError::is_a_directory(key)),
            None => Err(FsError::not_found(key)),
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.read_entries()
            .map(|e| e.contains_key(&normalize(path)))
            .unwrap_or(false)
    }

    /// Snapshot of the currently open contexts.
    pub fn open_files(&self) -> Vec<OpenFileContext> {
        self.open.lock().values().cloned().collect()
    }

    fn ensure_parents(entries: &mut HashMap<String, Entry>, key: &str) -> FsErrorResult<()> {
        let mut current = String::new();
        let parent_path = parent(key);
        if parent_path.is_empty() {
            return Ok(());
        }
        for component in parent_path.split('/') {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(component);
            match entries.get(&current) {
                Some(Entry::Directory { .. }) => {}
                Some(Entry::File { .. }) => return Err(FsError::not_a_directory(current)),
                None => {
                    entries.insert(current.clone(), Entry::directory());
                }
            }
        }
        Ok(())
    }

    /// Parent of `key` must exist and be a directory before creating `key`.
    fn check_parent(entries: &HashMap<String, Entry>, key: &str) -> FsErrorResult<()> {
        match entries.get(parent(key)) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(Entry::File { .. }) => Err(FsError::not_a_directory(parent(key))),
            None => Err(FsError::path_not_found(key)),
        }
    }

    fn has_children(entries: &HashMap<String, Entry>, key: &str) -> bool {
        entries.keys().any(|k| !k.is_empty() && k != key && parent(k) == key)
    }

    fn is_under(candidate: &str, dir: &str) -> bool {
        dir.is_empty()
            || candidate
                .strip_prefix(dir)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    // ========================================================================
    // Context lifecycle
    // ========================================================================

    fn open_context(&self, ctx: OpenFileContext) {
        debug!(op_id = %ctx.info.op_id, path = %ctx.path, "context opened");
        self.open.lock().insert(ctx.info.op_id, ctx);
    }

    fn with_context<R>(
        &self,
        op_id: OpId,
        f: impl FnOnce(&mut OpenFileContext) -> R,
    ) -> FsErrorResult<R> {
        self.open
            .lock()
            .get_mut(&op_id)
            .map(f)
            .ok_or(FsError::NoContext(op_id))
    }

    /// Drop the context for `op_id`, running any pending delete.
    fn close_context(&self, op_id: OpId) -> FsErrorResult<()> {
        let Some(ctx) = self.open.lock().remove(&op_id) else {
            return Ok(());
        };
        debug!(op_id = %op_id, path = %ctx.path, "context closed");
        if !ctx.info.delete_on_close || ctx.path.is_empty() {
            return Ok(());
        }
        let mut entries = self.write_entries()?;
        let doomed: Vec<String> = entries
            .keys()
            .filter(|k| *k == &ctx.path || Self::is_under(k, &ctx.path))
            .cloned()
            .collect();
        for key in doomed {
            entries.remove(&key);
        }
        debug!(path = %ctx.path, "deleted on close");
        Ok(())
    }

    // ========================================================================
    // Operations (error-typed)
    // ========================================================================

    fn create(
        &self,
        key: &str,
        access: FileAccess,
        mode: FileMode,
        info: &AsyncFileInfo,
        ctx: &mut OpenFileContext,
    ) -> FsErrorResult<CreateFileReply> {
        let mut entries = self.write_entries()?;
        let existing = entries.get(key).map(Entry::is_directory);

        if info.is_directory {
            match (mode, existing) {
                (FileMode::CreateNew, Some(_)) => return Err(FsError::already_exists(key)),
                (FileMode::CreateNew, None) => {
                    Self::check_parent(&entries, key)?;
                    entries.insert(key.to_string(), Entry::directory());
                }
                (FileMode::Open | FileMode::OpenOrCreate, Some(false)) => {
                    return Err(FsError::not_a_directory(key));
                }
                (FileMode::Open, Some(true)) | (FileMode::OpenOrCreate, Some(true)) => {}
                (FileMode::Open, None) => return Err(FsError::not_found(key)),
                (FileMode::OpenOrCreate, None) => {
                    Self::check_parent(&entries, key)?;
                    entries.insert(key.to_string(), Entry::directory());
                }
                _ => return Err(FsError::other("unsupported open mode for a directory")),
            }
            return Ok(CreateFileReply { is_directory: true });
        }

        let is_directory = existing == Some(true);
        match mode {
            FileMode::CreateNew => {
                if existing.is_some() {
                    return Err(FsError::already_exists(key));
                }
                Self::check_parent(&entries, key)?;
                entries.insert(key.to_string(), Entry::file());
            }
            FileMode::Open => {
                if existing.is_none() {
                    return Err(FsError::not_found(key));
                }
                if is_directory
                    && access.contains(FileAccess::DELETE)
                    && !access.contains(FileAccess::SYNCHRONIZE)
                {
                    // Delete request aimed at a directory through the file path.
                    return Err(FsError::access_denied(key));
                }
            }
            FileMode::OpenOrCreate => {
                if existing.is_none() {
                    Self::check_parent(&entries, key)?;
                    entries.insert(key.to_string(), Entry::file());
                }
            }
            FileMode::Truncate | FileMode::Create => {
                if is_directory {
                    return Err(FsError::is_a_directory(key));
                }
                if existing.is_none() {
                    if mode == FileMode::Truncate {
                        return Err(FsError::not_found(key));
                    }
                    Self::check_parent(&entries, key)?;
                }
                entries.insert(key.to_string(), Entry::file());
            }
            FileMode::Append => {
                if is_directory {
                    return Err(FsError::is_a_directory(key));
                }
                if existing.is_none() {
                    Self::check_parent(&entries, key)?;
                    entries.insert(key.to_string(), Entry::file());
                }
                ctx.info.write_to_end_of_file = true;
            }
        }
        ctx.info.is_directory = is_directory;
        Ok(CreateFileReply { is_directory })
    }

    fn read(&self, key: &str, offset: u64, max_count: u32, op_id: OpId) -> FsErrorResult<Vec<u8>> {
        self.with_context(op_id, |_| ())?;
        let entries = self.read_entries()?;
        match entries.get(key) {
            Some(Entry::File { data, .. }) => {
                let start = (offset as usize).min(data.len());
                let end = start.saturating_add(max_count as usize).min(data.len());
                Ok(data[start..end].to_vec())
            }
            Some(Entry::Directory { .. }) => Err(FsError::is_a_directory(key)),
            None => Err(FsError::not_found(key)),
        }
    }

    /// Fail unless `key` growing to `new_len` keeps the volume within
    /// capacity. The caller holds the entries lock.
    fn ensure_fits(
        &self,
        entries: &HashMap<String, Entry>,
        key: &str,
        new_len: u64,
    ) -> FsErrorResult<()> {
        let others: u64 = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(_, e)| match e {
                Entry::File { data, .. } => data.len() as u64,
                Entry::Directory { .. } => 0,
            })
            .sum();
        match others.checked_add(new_len) {
            Some(total) if total <= self.capacity => Ok(()),
            _ => Err(FsError::disk_full(key)),
        }
    }

    fn write(&self, key: &str, buf: &[u8], offset: u64, info: &AsyncFileInfo) -> FsErrorResult<u32> {
        let append = self.with_context(info.op_id, |ctx| ctx.info.write_to_end_of_file)?
            || info.write_to_end_of_file;
        let mut entries = self.write_entries()?;
        let current = match entries.get(key) {
            Some(Entry::File { data, .. }) => data.len() as u64,
            Some(Entry::Directory { .. }) => return Err(FsError::is_a_directory(key)),
            None => return Err(FsError::not_found(key)),
        };
        let start = if append { current } else { offset };
        let end = start
            .checked_add(buf.len() as u64)
            .ok_or_else(|| FsError::disk_full(key))?;
        if end > current {
            self.ensure_fits(&entries, key, end)?;
        }
        // Within capacity, so both bounds fit in memory.
        let (start, end) = (start as usize, end as usize);
        match entries.get_mut(key) {
            Some(Entry::File { data, meta }) => {
                if end > data.len() {
                    data.resize(end, 0);
                }
                data[start..end].copy_from_slice(buf);
                meta.modified = SystemTime::now();
                Ok(buf.len() as u32)
            }
            Some(Entry::Directory { .. }) => Err(FsError::is_a_directory(key)),
            None => Err(FsError::not_found(key)),
        }
    }

    fn resize(&self, key: &str, length: u64, shrink_only: bool) -> FsErrorResult<()> {
        let mut entries = self.write_entries()?;
        let current = match entries.get(key) {
            Some(Entry::File { data, .. }) => data.len() as u64,
            Some(Entry::Directory { .. }) => return Err(FsError::is_a_directory(key)),
            None => return Err(FsError::not_found(key)),
        };
        if length > current {
            if shrink_only {
                return Ok(());
            }
            self.ensure_fits(&entries, key, length)?;
        }
        match entries.get_mut(key) {
            Some(Entry::File { data, meta }) => {
                let length = length as usize;
                if length != data.len() {
                    data.resize(length, 0);
                    meta.modified = SystemTime::now();
                }
                Ok(())
            }
            Some(Entry::Directory { .. }) => Err(FsError::is_a_directory(key)),
            None => Err(FsError::not_found(key)),
        }
    }

    fn list(&self, key: &str) -> FsErrorResult<Vec<FileInformation>> {
        let entries = self.read_entries()?;
        match entries.get(key) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(FsError::not_a_directory(key)),
            None => return Err(FsError::not_found(key)),
        }
        let mut result: Vec<FileInformation> = entries
            .iter()
            .filter(|(k, _)| !k.is_empty() && k.as_str() != key && parent(k) == key)
            .map(|(k, e)| e.information(file_name(k)))
            .collect();
        // Sort for consistent ordering
        result.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(result)
    }

    fn mark_delete(&self, key: &str, want_directory: bool, info: &AsyncFileInfo) -> FsErrorResult<()> {
        {
            let entries = self.read_entries()?;
            match entries.get(key) {
                None => return Err(FsError::not_found(key)),
                Some(e) if e.is_directory() != want_directory => {
                    return Err(FsError::access_denied(key));
                }
                Some(_) if key.is_empty() => return Err(FsError::access_denied("/")),
                Some(_) => {}
            }
            if want_directory && info.delete_on_close && Self::has_children(&entries, key) {
                return Err(FsError::directory_not_empty(key));
            }
        }
        self.with_context(info.op_id, |ctx| {
            ctx.info.delete_on_close = info.delete_on_close;
        })
    }

    fn rename(&self, from: &str, to: &str, replace: bool) -> FsErrorResult<()> {
        if from.is_empty() || to.is_empty() {
            return Err(FsError::access_denied("/"));
        }
        if from == to {
            return Ok(());
        }
        if Self::is_under(to, from) {
            return Err(FsError::invalid_path(to));
        }
        let mut entries = self.write_entries()?;
        if !entries.contains_key(from) {
            return Err(FsError::not_found(from));
        }
        match entries.get(to) {
            Some(_) if !replace => return Err(FsError::already_exists(to)),
            Some(Entry::Directory { .. }) => return Err(FsError::access_denied(to)),
            _ => {}
        }
        Self::check_parent(&entries, to)?;

        let moved: Vec<String> = entries
            .keys()
            .filter(|k| k.as_str() == from || Self::is_under(k, from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(entry) = entries.remove(&old) {
                let new_key = format!("{to}{}", &old[from.len()..]);
                entries.insert(new_key, entry);
            }
        }
        drop(entries);

        for ctx in self.open.lock().values_mut() {
            if ctx.path == from || Self::is_under(&ctx.path, from) {
                ctx.path = format!("{to}{}", &ctx.path[from.len()..]);
            }
        }
        Ok(())
    }

    fn used_bytes(&self) -> FsErrorResult<u64> {
        Ok(self
            .read_entries()?
            .values()
            .map(|e| match e {
                Entry::File { data, .. } => data.len() as u64,
                Entry::Directory { .. } => 0,
            })
            .sum())
    }
}

#[async_trait]
impl AsyncFsOps for MemoryFs {
    async fn create_file(
        &self,
        path: &str,
        access: FileAccess,
        share: FileShare,
        mode: FileMode,
        options: FileOptions,
        attributes: FileAttributes,
        info: &AsyncFileInfo,
    ) -> FsResult<CreateFileReply> {
        let key = normalize(path);
        let mut ctx = OpenFileContext {
            path: key.clone(),
            access,
            share,
            mode,
            options,
            attributes,
            info: *info,
            opened_at: SystemTime::now(),
        };
        if options.contains(FileOptions::DELETE_ON_CLOSE) {
            ctx.info.delete_on_close = true;
        }
        trace!(op_id = %info.op_id, path = %key, ?mode, ?access, "create_file");
        // A failed create never reaches cleanup or close, so no context is kept.
        let reply = self.create(&key, access, mode, info, &mut ctx)?;
        self.open_context(ctx);
        Ok(reply)
    }

    async fn cleanup(&self, _path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        if info.delete_on_close {
            let _ = self.with_context(info.op_id, |ctx| ctx.info.delete_on_close = true);
        }
        Ok(self.close_context(info.op_id)?)
    }

    async fn close_file(&self, _path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        Ok(self.close_context(info.op_id)?)
    }

    async fn read_file(
        &self,
        path: &str,
        offset: u64,
        max_count: u32,
        info: &AsyncFileInfo,
    ) -> FsResult<Vec<u8>> {
        Ok(self.read(&normalize(path), offset, max_count, info.op_id)?)
    }

    async fn write_file(
        &self,
        path: &str,
        data: &[u8],
        offset: u64,
        info: &AsyncFileInfo,
    ) -> FsResult<u32> {
        Ok(self.write(&normalize(path), data, offset, info)?)
    }

    async fn flush_file_buffers(&self, _path: &str, _info: &AsyncFileInfo) -> FsResult<()> {
        Ok(())
    }

    async fn set_end_of_file(&self, path: &str, length: u64, _info: &AsyncFileInfo) -> FsResult<()> {
        Ok(self.resize(&normalize(path), length, false)?)
    }

    async fn set_allocation_size(
        &self,
        path: &str,
        length: u64,
        _info: &AsyncFileInfo,
    ) -> FsResult<()> {
        Ok(self.resize(&normalize(path), length, true)?)
    }

    async fn get_file_information(
        &self,
        path: &str,
        _info: &AsyncFileInfo,
    ) -> FsResult<FileInformation> {
        let key = normalize(path);
        let entries = self.read_entries()?;
        let entry = entries.get(&key).ok_or_else(|| FsError::not_found(&key))?;
        Ok(entry.information(path))
    }

    async fn find_files(&self, path: &str, _info: &AsyncFileInfo) -> FsResult<Vec<FileInformation>> {
        Ok(self.list(&normalize(path))?)
    }

    async fn set_file_attributes(
        &self,
        path: &str,
        attributes: FileAttributes,
        _info: &AsyncFileInfo,
    ) -> FsResult<()> {
        let key = normalize(path);
        let mut entries = self.write_entries()?;
        let entry = entries.get_mut(&key).ok_or_else(|| FsError::not_found(&key))?;
        let is_directory = entry.is_directory();
        let meta = entry.meta_mut();
        meta.attributes = attributes;
        if is_directory {
            meta.attributes |= FileAttributes::DIRECTORY;
        } else {
            meta.attributes.remove(FileAttributes::DIRECTORY);
        }
        Ok(())
    }

    async fn set_file_time(
        &self,
        path: &str,
        creation: Option<SystemTime>,
        last_access: Option<SystemTime>,
        last_write: Option<SystemTime>,
        _info: &AsyncFileInfo,
    ) -> FsResult<()> {
        let key = normalize(path);
        let mut entries = self.write_entries()?;
        let meta = entries
            .get_mut(&key)
            .ok_or_else(|| FsError::not_found(&key))?
            .meta_mut();
        if let Some(t) = creation {
            meta.created = t;
        }
        if let Some(t) = last_access {
            meta.accessed = t;
        }
        if let Some(t) = last_write {
            meta.modified = t;
        }
        Ok(())
    }

    async fn delete_file(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        Ok(self.mark_delete(&normalize(path), false, info)?)
    }

    async fn delete_directory(&self, path: &str, info: &AsyncFileInfo) -> FsResult<()> {
        Ok(self.mark_delete(&normalize(path), true, info)?)
    }

    async fn move_file(
        &self,
        old_path: &str,
        new_path: &str,
        replace: bool,
        _info: &AsyncFileInfo,
    ) -> FsResult<()> {
        Ok(self.rename(&normalize(old_path), &normalize(new_path), replace)?)
    }

    async fn get_disk_free_space(&self, _info: &AsyncFileInfo) -> FsResult<DiskFreeSpace> {
        let free = self.capacity.saturating_sub(self.used_bytes()?);
        Ok(DiskFreeSpace {
            free_bytes_available: free,
            total_bytes: self.capacity,
            total_free_bytes: free,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webfs_types::NtStatus;

    fn info(n: u32) -> AsyncFileInfo {
        AsyncFileInfo::new(OpId::new(n, 1))
    }

    async fn open(fs: &MemoryFs, path: &str, mode: FileMode, info: &AsyncFileInfo) -> FsResult<CreateFileReply> {
        fs.create_file(
            path,
            FileAccess::GENERIC_READ | FileAccess::GENERIC_WRITE,
            FileShare::READ,
            mode,
            FileOptions::empty(),
            FileAttributes::NORMAL,
            info,
        )
        .await
    }

    #[tokio::test]
    async fn test_create_write_read() {
        let fs = MemoryFs::new();
        let i = info(1);
        open(&fs, "hello.txt", FileMode::CreateNew, &i).await.unwrap();
        assert_eq!(fs.write_file("hello.txt", b"hello world", 0, &i).await.unwrap(), 11);
        assert_eq!(fs.read_file("hello.txt", 6, 100, &i).await.unwrap(), b"world");
        fs.close_file("hello.txt", &i).await.unwrap();
        assert!(fs.open_files().is_empty());
    }

    #[tokio::test]
    async fn test_create_new_collides() {
        let fs = MemoryFs::new();
        fs.insert_file("a.txt", "x").unwrap();
        let i = info(1);
        assert_eq!(
            open(&fs, "a.txt", FileMode::CreateNew, &i).await,
            Err(NtStatus::ObjectNameCollision)
        );
        // Failed create keeps no context
        assert!(fs.open_files().is_empty());
    }

    #[tokio::test]
    async fn test_open_missing_and_missing_parent() {
        let fs = MemoryFs::new();
        assert_eq!(
            open(&fs, "nope.txt", FileMode::Open, &info(1)).await,
            Err(NtStatus::ObjectNameNotFound)
        );
        assert_eq!(
            open(&fs, "no/dir/file.txt", FileMode::CreateNew, &info(2)).await,
            Err(NtStatus::ObjectPathNotFound)
        );
    }

    #[tokio::test]
    async fn test_open_directory_as_file_reports_directory() {
        let fs = MemoryFs::new();
        fs.insert_dir("docs").unwrap();
        let reply = open(&fs, "docs", FileMode::Open, &info(1)).await.unwrap();
        assert!(reply.is_directory);
    }

    #[tokio::test]
    async fn test_directory_open_on_file_fails() {
        let fs = MemoryFs::new();
        fs.insert_file("f", "").unwrap();
        let mut i = info(1);
        i.is_directory = true;
        assert_eq!(
            open(&fs, "f", FileMode::Open, &i).await,
            Err(NtStatus::NotADirectory)
        );
    }

    #[tokio::test]
    async fn test_truncate_and_append_modes() {
        let fs = MemoryFs::new();
        fs.insert_file("log", "abc").unwrap();

        let i = info(1);
        open(&fs, "log", FileMode::Append, &i).await.unwrap();
        fs.write_file("log", b"def", 0, &i).await.unwrap();
        fs.close_file("log", &i).await.unwrap();
        assert_eq!(fs.contents("log").unwrap(), b"abcdef");

        let i = info(2);
        open(&fs, "log", FileMode::Truncate, &i).await.unwrap();
        fs.close_file("log", &i).await.unwrap();
        assert!(fs.contents("log").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_deferred_to_cleanup() {
        let fs = MemoryFs::new();
        fs.insert_file("doomed.txt", "bye").unwrap();

        let mut i = info(1);
        open(&fs, "doomed.txt", FileMode::Open, &i).await.unwrap();
        i.delete_on_close = true;
        fs.delete_file("doomed.txt", &i).await.unwrap();
        assert!(fs.exists("doomed.txt"), "delete_file must only mark");

        fs.cleanup("doomed.txt", &i).await.unwrap();
        assert!(!fs.exists("doomed.txt"));
    }

    #[tokio::test]
    async fn test_delete_file_on_directory_denied() {
        let fs = MemoryFs::new();
        fs.insert_dir("d").unwrap();
        let mut i = info(1);
        i.is_directory = true;
        open(&fs, "d", FileMode::Open, &i).await.unwrap();
        assert_eq!(fs.delete_file("d", &i).await, Err(NtStatus::AccessDenied));
    }

    #[tokio::test]
    async fn test_delete_non_empty_directory() {
        let fs = MemoryFs::new();
        fs.insert_file("d/inner.txt", "x").unwrap();
        let mut i = info(1);
        i.is_directory = true;
        open(&fs, "d", FileMode::Open, &i).await.unwrap();
        i.delete_on_close = true;
        assert_eq!(
            fs.delete_directory("d", &i).await,
            Err(NtStatus::DirectoryNotEmpty)
        );
    }

    #[tokio::test]
    async fn test_delete_without_context_fails() {
        let fs = MemoryFs::new();
        fs.insert_file("a", "").unwrap();
        assert_eq!(fs.delete_file("a", &info(9)).await, Err(NtStatus::Unsuccessful));
    }

    #[tokio::test]
    async fn test_find_files_lists_children() {
        let fs = MemoryFs::new();
        fs.insert_file("b.txt", "12").unwrap();
        fs.insert_file("sub/c.txt", "").unwrap();
        let listing = fs.find_files("", &info(1)).await.unwrap();
        let names: Vec<_> = listing.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["b.txt", "sub"]);
        assert_eq!(listing[0].length, 2);
        assert!(listing[1].is_directory());
    }

    #[tokio::test]
    async fn test_move_directory_with_children() {
        let fs = MemoryFs::new();
        fs.insert_file("src/a.txt", "a").unwrap();
        fs.insert_dir("dst").unwrap();
        fs.move_file("src", "dst/moved", false, &info(1)).await.unwrap();
        assert!(!fs.exists("src"));
        assert_eq!(fs.contents("dst/moved/a.txt").unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_move_respects_replace() {
        let fs = MemoryFs::new();
        fs.insert_file("a", "1").unwrap();
        fs.insert_file("b", "2").unwrap();
        assert_eq!(
            fs.move_file("a", "b", false, &info(1)).await,
            Err(NtStatus::ObjectNameCollision)
        );
        fs.move_file("a", "b", true, &info(1)).await.unwrap();
        assert_eq!(fs.contents("b").unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_set_end_of_file_and_allocation() {
        let fs = MemoryFs::new();
        fs.insert_file("f", "abcdef").unwrap();
        fs.set_allocation_size("f", 100, &info(1)).await.unwrap();
        assert_eq!(fs.contents("f").unwrap().len(), 6);
        fs.set_allocation_size("f", 3, &info(1)).await.unwrap();
        assert_eq!(fs.contents("f").unwrap(), b"abc");
        fs.set_end_of_file("f", 5, &info(1)).await.unwrap();
        assert_eq!(fs.contents("f").unwrap(), b"abc\0\0");
    }

    #[tokio::test]
    async fn test_huge_end_of_file_is_disk_full() {
        let fs = MemoryFs::new();
        fs.insert_file("a.txt", "abc").unwrap();
        let err = fs.set_end_of_file("a.txt", 1u64 << 62, &info(1)).await.unwrap_err();
        assert_eq!(err, NtStatus::DiskFull);
        assert_eq!(fs.contents("a.txt").unwrap(), b"abc");
        // Growing to a larger allocation is a no-op, not a failure.
        fs.set_allocation_size("a.txt", 1u64 << 62, &info(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_past_capacity_is_disk_full() {
        let fs = MemoryFs::new();
        let i = info(1);
        open(&fs, "a.txt", FileMode::CreateNew, &i).await.unwrap();
        let err = fs.write_file("a.txt", b"xy", u64::MAX - 1, &i).await.unwrap_err();
        assert_eq!(err, NtStatus::DiskFull);
        let err = fs.write_file("a.txt", b"x", 1u64 << 40, &i).await.unwrap_err();
        assert_eq!(err, NtStatus::DiskFull);
        assert!(fs.contents("a.txt").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_capacity_counts_other_files() {
        let fs = MemoryFs::with_capacity(10);
        let i = info(1);
        fs.insert_file("other", "123456").unwrap();
        open(&fs, "a.txt", FileMode::CreateNew, &i).await.unwrap();
        assert_eq!(fs.write_file("a.txt", b"abcd", 0, &i).await.unwrap(), 4);
        // Overwriting in place needs no new space.
        assert_eq!(fs.write_file("a.txt", b"ABCD", 0, &i).await.unwrap(), 4);
        let err = fs.write_file("a.txt", b"e", 4, &i).await.unwrap_err();
        assert_eq!(err, NtStatus::DiskFull);
        let err = fs.set_end_of_file("a.txt", 5, &i).await.unwrap_err();
        assert_eq!(err, NtStatus::DiskFull);
        fs.set_end_of_file("a.txt", 2, &i).await.unwrap();
        assert_eq!(fs.contents("a.txt").unwrap(), b"AB");
    }

    #[tokio::test]
    async fn test_disk_free_space_tracks_usage() {
        let fs = MemoryFs::new();
        let before = fs.get_disk_free_space(&info(1)).await.unwrap();
        fs.insert_file("big", vec![0u8; 1024]).unwrap();
        let after = fs.get_disk_free_space(&info(1)).await.unwrap();
        assert_eq!(before.total_free_bytes - after.total_free_bytes, 1024);
    }
}
