use std::sync::Arc;

use tokio::{runtime::Handle, sync::watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    features::{
        entities::GroupId,
        loader::{import_features, ImportSummary},
    },
    storage::feature_store::FeatureStore,
};

use super::{
    error::ImportFeaturesError,
    source::{FileSource, SourceHandle},
};

/// Lifecycle of an import. It only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Waiting,
    Importing,
    Done,
}

/// Everything an observer of an [ImportSession] can see.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportProgress {
    pub selected_source: Option<SourceHandle>,
    pub state: ImportState,
    /// Set right before the state becomes [ImportState::Done] when the import failed.
    pub last_error: Option<ImportFeaturesError>,
    /// Set right before the state becomes [ImportState::Done] when the import succeeded.
    pub summary: Option<ImportSummary>,
}

impl Default for ImportProgress {
    fn default() -> Self {
        Self {
            selected_source: None,
            state: ImportState::Waiting,
            last_error: None,
            summary: None,
        }
    }
}

/// Coordinates one import attempt: remembers the chosen file, runs the import in the
/// background and publishes progress through a [watch] channel.
///
/// Dropping the session abandons an import that is still running. Whatever the store already
/// committed stays committed, an open transaction is rolled back.
pub struct ImportSession<S, F> {
    store: Arc<S>,
    source: Arc<F>,
    progress: Arc<watch::Sender<ImportProgress>>,
    shutdown: CancellationToken,
}

impl<S, F> ImportSession<S, F>
where
    S: FeatureStore + 'static,
    F: FileSource,
{
    pub fn new(store: S, source: F) -> Self {
        Self::with_shared(Arc::new(store), Arc::new(source))
    }

    pub fn with_shared(store: Arc<S>, source: Arc<F>) -> Self {
        let (progress, _) = watch::channel(ImportProgress::default());
        Self {
            store,
            source,
            progress: Arc::new(progress),
            shutdown: CancellationToken::new(),
        }
    }

    /// Remembers the file to import. Nothing else happens until [ImportSession::begin_import].
    pub fn set_source(&self, handle: SourceHandle) {
        debug!("Selected source {handle}");
        self.progress
            .send_modify(|progress| progress.selected_source = Some(handle));
    }

    /// Starts importing the selected file into `group_id` on a background task and returns
    /// `true`. Does nothing and returns `false` when no file was selected, when this session
    /// already started an import or when called outside a tokio runtime.
    pub fn begin_import(&self, group_id: GroupId) -> bool {
        let Ok(runtime) = Handle::try_current() else {
            warn!("Import requested outside of a tokio runtime");
            return false;
        };

        let mut selected = None;
        self.progress.send_if_modified(|progress| {
            match (&progress.selected_source, progress.state) {
                (Some(handle), ImportState::Waiting) => {
                    selected = Some(handle.clone());
                    progress.state = ImportState::Importing;
                    true
                }
                _ => false,
            }
        });

        let Some(handle) = selected else {
            debug!(
                "Ignoring import request in state {:?}",
                self.progress.borrow().state
            );
            return false;
        };

        let store = self.store.clone();
        let source = self.source.clone();
        let progress = self.progress.clone();
        let shutdown = self.shutdown.clone();
        let span = info_span!("import", group_id, %handle);

        runtime.spawn(
            async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        warn!("Import abandoned before completion");
                    }
                    result = run_import(&*store, &*source, &handle, group_id) => {
                        if let Err(e) = &result {
                            error!(message_id = e.message_id(), row = e.row(), "Import failed {e}");
                        }
                        progress.send_modify(|progress| {
                            match result {
                                Ok(summary) => progress.summary = Some(summary),
                                Err(e) => progress.last_error = Some(e),
                            }
                            progress.state = ImportState::Done;
                        });
                    }
                }
            }
            .instrument(span),
        );

        true
    }

    pub fn progress(&self) -> ImportProgress {
        self.progress.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ImportProgress> {
        self.progress.subscribe()
    }

    /// Waits for the import to finish. Returns [None] when no import was started.
    pub async fn wait_until_done(&self) -> Option<Result<ImportSummary, ImportFeaturesError>> {
        let mut receiver = self.subscribe();
        if receiver.borrow().state == ImportState::Waiting {
            return None;
        }
        let progress = receiver
            .wait_for(|progress| progress.state == ImportState::Done)
            .await
            .ok()?
            .clone();
        Some(match progress.last_error {
            Some(e) => Err(e),
            None => Ok(progress.summary.unwrap_or_default()),
        })
    }
}

impl<S, F> Drop for ImportSession<S, F> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_import(
    store: &impl FeatureStore,
    source: &impl FileSource,
    handle: &SourceHandle,
    group_id: GroupId,
) -> Result<ImportSummary, ImportFeaturesError> {
    let stream =
        source
            .open(handle)
            .await
            .map_err(|e| ImportFeaturesError::SourceUnavailable {
                reason: e.to_string(),
            })?;
    info!("Opened source, importing");
    import_features(store, stream, group_id).await
}
