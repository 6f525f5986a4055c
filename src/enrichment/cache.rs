use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Per-title lookup results shared by every task of an enrichment run.
///
/// Both hits and misses are cached. Concurrent lookups of the same title
/// share one in-flight request: the map lock is held only while the title's
/// cell is found or inserted, and the lookup itself runs outside it. A
/// cancelled lookup leaves its cell empty, so a later caller simply retries.
pub struct TitleCache<V> {
    entries: Mutex<HashMap<String, Arc<OnceCell<Option<V>>>>>,
}

impl<V: Clone> TitleCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached value for `title`, running `lookup` if nobody has yet
    pub async fn get_or_fetch<F, Fut>(&self, title: &str, lookup: F) -> Option<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<V>>,
    {
        let cell = {
            let mut entries = self.entries.lock().await;
            entries
                .entry(title.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        cell.get_or_init(lookup).await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl<V: Clone> Default for TitleCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
