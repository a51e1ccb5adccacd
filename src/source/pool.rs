//! Bounded fan-out for resource reads

use super::{FileEntry, ResourceReader, SourceError};
use polars::prelude::DataFrame;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Worker pool shared by every loading step of a process
#[derive(Debug, Clone)]
pub struct FetchPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl FetchPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Read every entry concurrently; results keep the input order
    ///
    /// Reads run on a [`JoinSet`], so dropping the returned future (a timed-out
    /// attempt) aborts every outstanding read and frees its permit.
    pub async fn fetch_all(
        &self,
        reader: Arc<dyn ResourceReader>,
        entries: Vec<FileEntry>,
    ) -> Vec<(FileEntry, Result<DataFrame, SourceError>)> {
        let mut reads = JoinSet::new();
        for (index, entry) in entries.iter().enumerate() {
            let reader = reader.clone();
            let permits = self.permits.clone();
            let path = entry.path.clone();
            let params = entry.params.clone();
            reads.spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => {
                        debug!("Reading {}", path.display());
                        reader.read(&path, &params).await
                    }
                    Err(e) => Err(SourceError::Io {
                        path: path.clone(),
                        message: e.to_string(),
                    }),
                };
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<Result<DataFrame, SourceError>>> = entries.iter().map(|_| None).collect();
        while let Some(joined) = reads.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => warn!("Read task ended abnormally: {}", e),
            }
        }

        entries
            .into_iter()
            .zip(outcomes)
            .map(|(entry, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    Err(SourceError::Io {
                        path: entry.path.clone(),
                        message: "read task ended without a result".to_string(),
                    })
                });
                (entry, outcome)
            })
            .collect()
    }
}
