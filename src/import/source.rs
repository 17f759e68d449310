use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{fs::File, io::AsyncRead};

/// Opaque reference to the file picked by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHandle(PathBuf);

impl SourceHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Display for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

pub type SourceStream = Box<dyn AsyncRead + Send + Unpin>;

/// Turns a [SourceHandle] into readable bytes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileSource: Send + Sync + 'static {
    async fn open(&self, handle: &SourceHandle) -> std::io::Result<SourceStream>;
}

/// Opens handles as paths on the local file system.
pub struct FsFileSource;

#[async_trait]
impl FileSource for FsFileSource {
    async fn open(&self, handle: &SourceHandle) -> std::io::Result<SourceStream> {
        let file = File::open(handle.path()).await?;
        Ok(Box::new(file))
    }
}
