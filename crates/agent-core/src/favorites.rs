use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::storage::{KeyValueStore, StorageChange};
use crate::url_pattern;

pub const FAVORITES_KEY: &str = "code-favorites";

/// A named, reusable script tagged with the pages it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFavorite {
    pub id: u64,
    pub name: String,
    pub code: String,
    pub url_pattern: String,
    pub use_count: u64,
    pub created_at: u64,
}

/// The persisted record. Identifiers are never reused, so `next_id` stays
/// ahead of every id ever handed out, deleted ones included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoritesCollection {
    #[serde(default = "FavoritesCollection::first_id")]
    pub next_id: u64,
    #[serde(default)]
    pub favorites: Vec<CodeFavorite>,
}

impl FavoritesCollection {
    fn first_id() -> u64 {
        1
    }

    /// Repairs a record whose `next_id` fell behind its contents.
    fn normalized(mut self) -> Self {
        let floor = self
            .favorites
            .iter()
            .map(|favorite| favorite.id + 1)
            .max()
            .unwrap_or(1);
        self.next_id = self.next_id.max(floor);
        self
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.favorites.iter().position(|favorite| favorite.id == id)
    }
}

impl Default for FavoritesCollection {
    fn default() -> Self {
        Self {
            next_id: Self::first_id(),
            favorites: Vec::new(),
        }
    }
}

/// Persisted store of code favorites.
///
/// Every mutation is a read-modify-write of the whole collection, serialized
/// through the backend's write lock, so any number of stores may share one
/// backend.
#[derive(Clone)]
pub struct FavoritesStore {
    store: Arc<dyn KeyValueStore>,
}

impl FavoritesStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn add_favorite(
        &self,
        name: &str,
        code: &str,
        url_pattern: &str,
    ) -> Result<CodeFavorite> {
        let favorite = self
            .mutate(|collection| {
                let favorite = CodeFavorite {
                    id: collection.next_id,
                    name: name.to_string(),
                    code: code.to_string(),
                    url_pattern: url_pattern.to_string(),
                    use_count: 0,
                    created_at: current_timestamp_ms(),
                };
                collection.next_id += 1;
                collection.favorites.insert(0, favorite.clone());
                Some(favorite)
            })
            .await?
            .context("new favorite was not stored")?;
        info!(target: "agent_core", favorite_id = favorite.id, "favorite added");
        Ok(favorite)
    }

    pub async fn update_favorite(
        &self,
        id: u64,
        name: &str,
        code: &str,
        url_pattern: &str,
    ) -> Result<Option<CodeFavorite>> {
        self.mutate(|collection| {
            let index = collection.position(id)?;
            let favorite = &mut collection.favorites[index];
            favorite.name = name.to_string();
            favorite.code = code.to_string();
            favorite.url_pattern = url_pattern.to_string();
            Some(favorite.clone())
        })
        .await
    }

    pub async fn remove_favorite(&self, id: u64) -> Result<()> {
        let removed = self
            .mutate(|collection| {
                let index = collection.position(id)?;
                Some(collection.favorites.remove(index))
            })
            .await?;
        if removed.is_some() {
            info!(target: "agent_core", favorite_id = id, "favorite removed");
        }
        Ok(())
    }

    pub async fn increment_use_count(&self, id: u64) -> Result<()> {
        self.mutate(|collection| {
            let index = collection.position(id)?;
            let favorite = &mut collection.favorites[index];
            favorite.use_count += 1;
            Some(())
        })
        .await?;
        Ok(())
    }

    /// All favorites, most recently created first.
    pub async fn get_all_favorites(&self) -> Result<Vec<CodeFavorite>> {
        let mut favorites = self.load().await?.favorites;
        favorites.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(favorites)
    }

    /// Favorites whose pattern applies to `url`, in storage order.
    pub async fn get_favorites_by_url(&self, url: &str) -> Result<Vec<CodeFavorite>> {
        let favorites = self.load().await?.favorites;
        Ok(favorites
            .into_iter()
            .filter(|favorite| url_pattern::matches(url, &favorite.url_pattern))
            .collect())
    }

    pub async fn get_favorite_by_id(&self, id: u64) -> Result<Option<CodeFavorite>> {
        let collection = self.load().await?;
        Ok(collection
            .favorites
            .into_iter()
            .find(|favorite| favorite.id == id))
    }

    /// Change feed for UIs that re-query after another surface writes.
    pub fn watch(&self) -> FavoritesWatcher {
        FavoritesWatcher {
            changes: self.store.subscribe(),
        }
    }

    async fn load(&self) -> Result<FavoritesCollection> {
        let collection = match self.store.get(FAVORITES_KEY).await? {
            Some(value) => serde_json::from_value::<FavoritesCollection>(value)
                .context("persisted favorites do not match the favorites schema")?,
            None => FavoritesCollection::default(),
        };
        Ok(collection.normalized())
    }

    /// Runs `apply` against a fresh copy of the collection and writes it back
    /// when `apply` returns `Some`. `None` means nothing matched and nothing is
    /// written. A failed write leaves the stored record untouched.
    async fn mutate<T, F>(&self, apply: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut FavoritesCollection) -> Option<T>,
    {
        let lock = self.store.write_lock();
        let _guard = lock.lock().await;
        let mut collection = self.load().await?;
        let Some(result) = apply(&mut collection) else {
            debug!(target: "agent_core", "favorites mutation matched nothing");
            return Ok(None);
        };
        self.store
            .set(FAVORITES_KEY, serde_json::to_value(&collection)?)
            .await
            .context("failed to persist favorites")?;
        Ok(Some(result))
    }
}

pub struct FavoritesWatcher {
    changes: broadcast::Receiver<StorageChange>,
}

impl FavoritesWatcher {
    /// Waits for the next change to the favorites record. Returns `false` once
    /// the backing store is gone.
    pub async fn changed(&mut self) -> bool {
        loop {
            match self.changes.recv().await {
                Ok(change) if change.key == FAVORITES_KEY => return true,
                Ok(_) => continue,
                Err(RecvError::Lagged(_)) => return true,
                Err(RecvError::Closed) => return false,
            }
        }
    }
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
