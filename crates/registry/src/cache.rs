//! Spec caches keyed by service identifier.
//!
//! Two backends share the [`SpecCache`] trait: [`MemorySpecCache`] for
//! process-local reuse and [`FileSpecCache`] which persists one JSON file per
//! service so resolved specs survive restarts. Entries are written whole
//! (temp file plus rename), so readers never see a partial entry.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use assembly_types::{ResolvedSpec, ServiceId};
use assembly_util::is_safe_file_stem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CacheError;

/// Bumped whenever [`CacheEntry`] or [`ResolvedSpec`] change shape.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub schema_version: u32,
    pub service_id: ServiceId,
    pub spec: Arc<ResolvedSpec>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub retrieved_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(spec: Arc<ResolvedSpec>) -> Self {
        Self::with_timestamp(spec, Utc::now())
    }

    pub fn with_timestamp(spec: Arc<ResolvedSpec>, retrieved_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            service_id: spec.service_id.clone(),
            spec,
            retrieved_at,
        }
    }

    /// Usable for `service_id`: current schema, matching key, valid spec.
    fn is_usable_for(&self, service_id: &ServiceId) -> bool {
        self.schema_version == CACHE_SCHEMA_VERSION
            && &self.service_id == service_id
            && self.spec.service_id == *service_id
            && self.spec.validate().is_ok()
    }
}

/// Expiry and capacity limits. The default keeps entries forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Option<Duration>,
    pub max_entries: Option<usize>,
}

impl CachePolicy {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries.max(1));
        self
    }

    pub fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| entry.retrieved_at.checked_add_signed(ttl))
            .is_some_and(|deadline| deadline <= now)
    }
}

/// Storage for resolved specs. Implementations must be safe to call from
/// many tasks at once and must never expose a partially written entry.
pub trait SpecCache: Send + Sync {
    fn get(&self, service_id: &ServiceId) -> Result<Option<Arc<ResolvedSpec>>, CacheError>;

    fn put(&self, spec: Arc<ResolvedSpec>) -> Result<(), CacheError>;

    /// Drop one entry, or every entry when `service_id` is `None`.
    fn invalidate(&self, service_id: Option<&ServiceId>) -> Result<(), CacheError>;
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// In-process cache.
#[derive(Debug, Default)]
pub struct MemorySpecCache {
    entries: RwLock<HashMap<ServiceId, CacheEntry>>,
    policy: CachePolicy,
}

impl MemorySpecCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Store a prebuilt entry, keeping its timestamp.
    pub fn insert_entry(&self, entry: CacheEntry) {
        let mut entries = write_lock(&self.entries);
        entries.insert(entry.service_id.clone(), entry);
        evict_oldest(&mut entries, self.policy.max_entries);
    }

    pub fn len(&self) -> usize {
        read_lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn evict_oldest(entries: &mut HashMap<ServiceId, CacheEntry>, max_entries: Option<usize>) {
    let Some(max_entries) = max_entries else {
        return;
    };
    while entries.len() > max_entries {
        let Some(oldest) = entries
            .values()
            .min_by_key(|entry| entry.retrieved_at)
            .map(|entry| entry.service_id.clone())
        else {
            return;
        };
        debug!(service_id = %oldest, "evicting cached spec");
        entries.remove(&oldest);
    }
}

impl SpecCache for MemorySpecCache {
    fn get(&self, service_id: &ServiceId) -> Result<Option<Arc<ResolvedSpec>>, CacheError> {
        {
            let entries = read_lock(&self.entries);
            match entries.get(service_id) {
                None => return Ok(None),
                Some(entry) if !self.policy.is_expired(entry, Utc::now()) => return Ok(Some(Arc::clone(&entry.spec))),
                Some(_) => {}
            }
        }
        let mut entries = write_lock(&self.entries);
        if entries
            .get(service_id)
            .is_some_and(|entry| self.policy.is_expired(entry, Utc::now()))
        {
            debug!(service_id = %service_id, "cached spec expired");
            entries.remove(service_id);
        }
        Ok(None)
    }

    fn put(&self, spec: Arc<ResolvedSpec>) -> Result<(), CacheError> {
        self.insert_entry(CacheEntry::new(spec));
        Ok(())
    }

    fn invalidate(&self, service_id: Option<&ServiceId>) -> Result<(), CacheError> {
        let mut entries = write_lock(&self.entries);
        match service_id {
            Some(service_id) => {
                entries.remove(service_id);
            }
            None => entries.clear(),
        }
        Ok(())
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One `<service_id>.json` file per entry under a cache directory.
#[derive(Debug)]
pub struct FileSpecCache {
    dir: PathBuf,
    policy: CachePolicy,
    /// Serializes writers so capacity enforcement sees a stable directory.
    write_guard: Mutex<()>,
}

impl FileSpecCache {
    pub fn new(dir: impl Into<PathBuf>, policy: CachePolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
            write_guard: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, service_id: &ServiceId) -> Result<PathBuf, CacheError> {
        if !is_safe_file_stem(service_id.as_str()) {
            return Err(CacheError::InvalidKey(service_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.{ENTRY_EXTENSION}", service_id.as_str())))
    }

    /// Every readable entry, expired ones included.
    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let mut entries: Vec<CacheEntry> = self
            .entry_files()?
            .into_iter()
            .filter_map(|path| read_entry(&path))
            .collect();
        entries.sort_by(|left, right| left.service_id.cmp(&right.service_id));
        Ok(entries)
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let listing = match fs::read_dir(&self.dir) {
            Ok(listing) => listing,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };
        let mut files = Vec::new();
        for item in listing {
            let path = item?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn write_atomically(&self, path: &Path, contents: &[u8]) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        let temp_path = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            path.file_stem().and_then(|stem| stem.to_str()).unwrap_or("entry"),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp_path, contents)?;
        if let Err(error) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(error.into());
        }
        Ok(())
    }

    fn enforce_capacity(&self) -> Result<(), CacheError> {
        let Some(max_entries) = self.policy.max_entries else {
            return Ok(());
        };
        let mut entries: Vec<(PathBuf, DateTime<Utc>)> = self
            .entry_files()?
            .into_iter()
            .map(|path| {
                let retrieved_at = read_entry(&path).map(|entry| entry.retrieved_at).unwrap_or_default();
                (path, retrieved_at)
            })
            .collect();
        if entries.len() <= max_entries {
            return Ok(());
        }
        entries.sort_by_key(|(_, retrieved_at)| *retrieved_at);
        let excess = entries.len() - max_entries;
        for (path, _) in entries.into_iter().take(excess) {
            debug!(path = %path.display(), "evicting cached spec file");
            remove_if_present(&path)?;
        }
        Ok(())
    }
}

impl SpecCache for FileSpecCache {
    fn get(&self, service_id: &ServiceId) -> Result<Option<Arc<ResolvedSpec>>, CacheError> {
        let path = self.entry_path(service_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let Some(entry) = read_entry(&path) else {
            return Ok(None);
        };
        if !entry.is_usable_for(service_id) {
            warn!(service_id = %service_id, path = %path.display(), "ignoring stale or mismatched cache entry");
            return Ok(None);
        }
        if self.policy.is_expired(&entry, Utc::now()) {
            debug!(service_id = %service_id, "cached spec expired");
            remove_if_present(&path)?;
            return Ok(None);
        }
        Ok(Some(entry.spec))
    }

    fn put(&self, spec: Arc<ResolvedSpec>) -> Result<(), CacheError> {
        let path = self.entry_path(&spec.service_id)?;
        let entry = CacheEntry::new(spec);
        let contents = serde_json::to_vec_pretty(&entry)?;

        let _guard = self.write_guard.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_atomically(&path, &contents)?;
        debug!(service_id = %entry.service_id, path = %path.display(), "cached spec");
        self.enforce_capacity()
    }

    fn invalidate(&self, service_id: Option<&ServiceId>) -> Result<(), CacheError> {
        let _guard = self.write_guard.lock().unwrap_or_else(PoisonError::into_inner);
        match service_id {
            Some(service_id) => remove_if_present(&self.entry_path(service_id)?),
            None => {
                for path in self.entry_files()? {
                    remove_if_present(&path)?;
                }
                Ok(())
            }
        }
    }
}

/// Parse an entry file; unreadable or corrupt files count as absent.
fn read_entry(path: &Path) -> Option<CacheEntry> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(error) => {
            if error.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), %error, "could not read cache entry");
            }
            return None;
        }
    };
    match serde_json::from_slice(&contents) {
        Ok(entry) => Some(entry),
        Err(error) => {
            warn!(path = %path.display(), %error, "corrupt cache entry treated as a miss");
            None
        }
    }
}

fn remove_if_present(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assembly_types::{ParameterDescriptor, Requirement};

    fn spec(id: &str) -> Arc<ResolvedSpec> {
        Arc::new(ResolvedSpec {
            service_id: ServiceId::parse(id).unwrap(),
            endpoint_path: format!("endpoint{}", id.to_lowercase()),
            endpoint_url: format!("https://open.example.org/portal/openapi/endpoint{}", id.to_lowercase()),
            basic_parameters: vec![ParameterDescriptor::new("KEY", Requirement::Required, "STRING(필수)", "인증키")],
            request_parameters: vec![ParameterDescriptor::new("AGE", Requirement::Required, "STRING(필수)", "대수")],
        })
    }

    fn key(id: &str) -> ServiceId {
        ServiceId::parse(id).unwrap()
    }

    #[test]
    fn memory_cache_get_put_invalidate() {
        let cache = MemorySpecCache::default();
        assert!(cache.get(&key("A1")).unwrap().is_none());
        cache.put(spec("A1")).unwrap();
        cache.put(spec("B2")).unwrap();
        assert_eq!(cache.get(&key("A1")).unwrap().unwrap().endpoint_path, "endpointa1");

        cache.invalidate(Some(&key("A1"))).unwrap();
        assert!(cache.get(&key("A1")).unwrap().is_none());
        assert!(cache.get(&key("B2")).unwrap().is_some());

        cache.invalidate(None).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn memory_cache_expires_by_ttl() {
        let cache = MemorySpecCache::new(CachePolicy::default().with_ttl(Duration::from_secs(60)));
        let stale = Utc::now() - chrono::Duration::seconds(120);
        cache.insert_entry(CacheEntry::with_timestamp(spec("A1"), stale));
        cache.put(spec("B2")).unwrap();
        assert!(cache.get(&key("A1")).unwrap().is_none());
        assert!(cache.get(&key("B2")).unwrap().is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn memory_cache_evicts_oldest_beyond_capacity() {
        let cache = MemorySpecCache::new(CachePolicy::default().with_max_entries(2));
        let now = Utc::now();
        cache.insert_entry(CacheEntry::with_timestamp(spec("A1"), now - chrono::Duration::seconds(30)));
        cache.insert_entry(CacheEntry::with_timestamp(spec("B2"), now - chrono::Duration::seconds(20)));
        cache.insert_entry(CacheEntry::with_timestamp(spec("C3"), now));
        assert!(cache.get(&key("A1")).unwrap().is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn file_cache_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        FileSpecCache::new(dir.path(), CachePolicy::default()).put(spec("A1")).unwrap();

        let reopened = FileSpecCache::new(dir.path(), CachePolicy::default());
        let cached = reopened.get(&key("A1")).unwrap().unwrap();
        assert_eq!(*cached, *spec("A1"));
        assert_eq!(reopened.entries().unwrap().len(), 1);
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|item| item.as_ref().unwrap().path().extension().is_some_and(|ext| ext == "tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn corrupt_or_foreign_files_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileSpecCache::new(dir.path(), CachePolicy::default());
        fs::write(dir.path().join("A1.json"), b"{ not json").unwrap();
        assert!(cache.get(&key("A1")).unwrap().is_none());

        let mut entry = CacheEntry::new(spec("B2"));
        entry.schema_version = CACHE_SCHEMA_VERSION + 1;
        fs::write(dir.path().join("B2.json"), serde_json::to_vec(&entry).unwrap()).unwrap();
        assert!(cache.get(&key("B2")).unwrap().is_none());
    }

    #[test]
    fn file_cache_invalidation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileSpecCache::new(dir.path().join("specs"), CachePolicy::default());
        cache.invalidate(None).unwrap();
        cache.put(spec("A1")).unwrap();
        cache.put(spec("B2")).unwrap();

        cache.invalidate(Some(&key("A1"))).unwrap();
        assert!(cache.get(&key("A1")).unwrap().is_none());
        assert!(cache.get(&key("B2")).unwrap().is_some());

        cache.invalidate(None).unwrap();
        assert!(cache.entries().unwrap().is_empty());
    }

    #[test]
    fn file_cache_capacity_and_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileSpecCache::new(dir.path(), CachePolicy::default().with_max_entries(1));
        let old = CacheEntry::with_timestamp(spec("A1"), Utc::now() - chrono::Duration::seconds(30));
        fs::write(dir.path().join("A1.json"), serde_json::to_vec(&old).unwrap()).unwrap();
        cache.put(spec("B2")).unwrap();
        assert!(!dir.path().join("A1.json").exists());
        assert!(dir.path().join("B2.json").exists());

        let expiring = FileSpecCache::new(dir.path(), CachePolicy::default().with_ttl(Duration::from_secs(10)));
        fs::write(dir.path().join("A1.json"), serde_json::to_vec(&old).unwrap()).unwrap();
        assert!(expiring.get(&key("A1")).unwrap().is_none());
        assert!(!dir.path().join("A1.json").exists());
    }
}
