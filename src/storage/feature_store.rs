use std::{
    collections::HashSet,
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::Utc;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::features::entities::{FeatureEntity, FeatureId, GroupId, NewFeature};

/// Interface for abstracting the persistent feature store.
pub trait FeatureStore: Send + Sync {
    type Transaction: FeatureTransaction;

    /// Opens a transaction scoped to a single group. Nothing staged in it becomes visible until
    /// [FeatureTransaction::commit] succeeds.
    fn begin(&self, group_id: GroupId) -> impl Future<Output = Result<Self::Transaction>> + Send;

    /// Retrieves every committed feature of a group.
    fn features_in(
        &self,
        group_id: GroupId,
    ) -> impl Future<Output = Result<Vec<FeatureEntity>>> + Send;
}

impl<T: Deref + Send + Sync> FeatureStore for T
where
    T::Target: FeatureStore,
{
    type Transaction = <T::Target as FeatureStore>::Transaction;

    fn begin(&self, group_id: GroupId) -> impl Future<Output = Result<Self::Transaction>> + Send {
        self.deref().begin(group_id)
    }

    fn features_in(
        &self,
        group_id: GroupId,
    ) -> impl Future<Output = Result<Vec<FeatureEntity>>> + Send {
        self.deref().features_in(group_id)
    }
}

/// Atomic unit of work against one group. Dropping a transaction without committing it rolls
/// it back.
pub trait FeatureTransaction: Send {
    /// Checks committed features and the ones staged in this transaction.
    fn contains_name(&self, name: &str) -> bool;

    fn insert(&mut self, feature: NewFeature) -> Result<FeatureEntity>;

    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}

/// The main realization of [FeatureStore].
pub struct FileFeatureStore {
    store_dir: PathBuf,
}

impl FileFeatureStore {
    pub fn new(store_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&store_dir)?;

        Ok(Self { store_dir })
    }

    fn group_path(&self, group_id: GroupId) -> PathBuf {
        self.store_dir.join(format!("{group_id}.jsonl"))
    }

    fn lock_path(&self, group_id: GroupId) -> PathBuf {
        self.store_dir.join(format!("{group_id}.lock"))
    }

    async fn read_group(path: &Path) -> Result<Vec<StoredLine>> {
        async fn extract(path: &Path) -> std::result::Result<Vec<StoredLine>, std::io::Error> {
            debug!("Extracting {path:?}");
            let file = File::open(path).await?;
            let mut lines = BufReader::new(file).lines();
            let mut stored = vec![];
            while let Some(v) = lines.next_line().await? {
                if v.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<FeatureEntity>(&v) {
                    Ok(feature)
                        if feature
                            .default_value
                            .map_or(true, |value| value.feature_type() == feature.feature_type) =>
                    {
                        stored.push(StoredLine::Feature(feature))
                    }
                    Ok(feature) => {
                        warn!(
                            "Feature {} in {:?} has a default value of the wrong type",
                            feature.id, path
                        );
                        stored.push(StoredLine::Unreadable(v));
                    }
                    Err(e) => {
                        warn!(
                            "During parsing in path {:?} found illegal json string {}:  {e}",
                            path, &v
                        );
                        stored.push(StoredLine::Unreadable(v));
                    }
                }
            }
            Ok(stored)
        }

        match extract(path).await {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e).with_context(|| format!("Failed to read features from {path:?}")),
        }
    }

    /// Waits until no other transaction holds the group.
    async fn lock_group(path: &Path) -> Result<File> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await?;
        // Locking blocks the thread, so it is moved off the runtime.
        let file =
            tokio::task::spawn_blocking(move || file.lock_exclusive().map(|_| file)).await??;
        Ok(file)
    }
}

impl FeatureStore for FileFeatureStore {
    type Transaction = FileTransaction;

    async fn begin(&self, group_id: GroupId) -> Result<Self::Transaction> {
        let lock = Self::lock_group(&self.lock_path(group_id))
            .await
            .with_context(|| format!("Failed to lock group {group_id}"))?;
        let path = self.group_path(group_id);
        let stored = Self::read_group(&path).await?;
        debug!(
            "Started transaction for group {group_id} with {} stored lines",
            stored.len()
        );
        Ok(FileTransaction::new(group_id, path, lock, stored))
    }

    async fn features_in(&self, group_id: GroupId) -> Result<Vec<FeatureEntity>> {
        let mut features = Self::read_group(&self.group_path(group_id))
            .await?
            .into_iter()
            .filter_map(|v| match v {
                StoredLine::Feature(feature) => Some(feature),
                StoredLine::Unreadable(_) => None,
            })
            .collect::<Vec<_>>();
        features.sort_by_key(|v| v.display_index);
        Ok(features)
    }
}

/// One line of a group record file. Lines that cannot be read back are kept verbatim so a
/// commit never drops them.
enum StoredLine {
    Feature(FeatureEntity),
    Unreadable(String),
}

/// Transaction over a single group record file. Inserts are staged in memory, commit rewrites
/// the file through a temporary sibling and a rename.
pub struct FileTransaction {
    group_id: GroupId,
    path: PathBuf,
    lock: File,
    stored: Vec<StoredLine>,
    staged: Vec<FeatureEntity>,
    names: HashSet<Arc<str>>,
    next_id: FeatureId,
    next_display_index: u32,
}

impl FileTransaction {
    fn new(group_id: GroupId, path: PathBuf, lock: File, stored: Vec<StoredLine>) -> Self {
        let committed = stored.iter().filter_map(|v| match v {
            StoredLine::Feature(feature) => Some(feature),
            StoredLine::Unreadable(_) => None,
        });
        let names = committed.clone().map(|v| v.name.clone()).collect();
        let next_id = committed.clone().map(|v| v.id + 1).max().unwrap_or(1);
        let next_display_index = committed
            .map(|v| v.display_index + 1)
            .max()
            .unwrap_or(0);
        Self {
            group_id,
            path,
            lock,
            stored,
            staged: vec![],
            names,
            next_id,
            next_display_index,
        }
    }

    fn temporary_path(&self) -> PathBuf {
        self.path.with_extension("jsonl.tmp")
    }
}

impl FeatureTransaction for FileTransaction {
    fn contains_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn insert(&mut self, feature: NewFeature) -> Result<FeatureEntity> {
        let entity = FeatureEntity {
            id: self.next_id,
            group_id: self.group_id,
            name: feature.name,
            feature_type: feature.feature_type,
            default_value: feature.default_value,
            default_label: feature.default_label,
            description: feature.description,
            display_index: self.next_display_index,
            created_at: Utc::now(),
        };
        self.next_id += 1;
        self.next_display_index += 1;
        self.names.insert(entity.name.clone());
        self.staged.push(entity.clone());
        Ok(entity)
    }

    async fn commit(self) -> Result<()> {
        if self.staged.is_empty() {
            self.lock.unlock_async().await?;
            return Ok(());
        }

        let mut buffer = Vec::<u8>::new();
        for line in &self.stored {
            match line {
                StoredLine::Feature(feature) => serde_json::to_writer(&mut buffer, feature)?,
                StoredLine::Unreadable(raw) => buffer.extend_from_slice(raw.as_bytes()),
            }
            buffer.push(b'\n');
        }
        for feature in &self.staged {
            serde_json::to_writer(&mut buffer, feature)?;
            buffer.push(b'\n');
        }

        let temporary = self.temporary_path();
        let mut file = File::create(&temporary).await?;
        file.write_all(&buffer).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temporary, &self.path)
            .await
            .with_context(|| format!("Failed to publish {:?}", self.path))?;
        debug!(
            "Committed {} features into group {}",
            self.staged.len(),
            self.group_id
        );

        self.lock.unlock_async().await?;
        Ok(())
    }
}
