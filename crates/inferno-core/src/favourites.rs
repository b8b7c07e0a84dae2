use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bridge::{BridgeGateway, BridgePort};
use crate::error::{InfernoError, Result};
use crate::kv::{KvBackend, KvKey, KvNamespace, KvStore};
use crate::track::{Playlist, Track};

/// A named, user-curated list of track paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FavouriteList {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
}

fn key_for(id: u64) -> KvKey {
    // Zero padded so prefix scans come back in creation order.
    KvKey::new(KvNamespace::Favourite, format!("{id:020}"))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

pub struct FavouritesBook<B: KvBackend> {
    store: KvStore<B>,
    lists: Vec<FavouriteList>,
}

impl<B: KvBackend> FavouritesBook<B> {
    pub fn new(store: KvStore<B>) -> Self {
        Self {
            store,
            lists: Vec::new(),
        }
    }

    pub async fn load(&mut self) -> Result<&[FavouriteList]> {
        self.lists = self.store.load_all(KvNamespace::Favourite).await?;
        debug!(count = self.lists.len(), "favourites loaded");
        Ok(&self.lists)
    }

    pub fn lists(&self) -> &[FavouriteList] {
        &self.lists
    }

    pub fn get(&self, id: u64) -> Option<&FavouriteList> {
        self.lists.iter().find(|list| list.id == id)
    }

    pub async fn create(&mut self, name: &str, image: Option<String>) -> Result<&FavouriteList> {
        let name = name.trim();
        if name.is_empty() {
            return Err(InfernoError::Input("please enter a name".into()));
        }

        let last = self.lists.iter().map(|list| list.id).max().unwrap_or(0);
        let list = FavouriteList {
            id: now_millis().max(last + 1),
            name: name.to_owned(),
            image: image.filter(|image| !image.is_empty()),
            tracks: Vec::new(),
        };
        self.store.store(&key_for(list.id), &list).await?;

        self.lists.push(list);
        Ok(&self.lists[self.lists.len() - 1])
    }

    /// Appends `path` to the list. Returns `false` when it was already there.
    pub async fn add_track(&mut self, id: u64, path: &str) -> Result<bool> {
        let list = self
            .lists
            .iter_mut()
            .find(|list| list.id == id)
            .ok_or_else(|| InfernoError::Input(format!("no favourite list {id}")))?;

        if list.tracks.iter().any(|known| known == path) {
            return Ok(false);
        }
        list.tracks.push(path.to_owned());
        self.store.store(&key_for(id), &*list).await?;
        Ok(true)
    }

    pub async fn remove(&mut self, id: u64) -> Result<()> {
        self.store.remove(&key_for(id)).await?;
        self.lists.retain(|list| list.id != id);
        Ok(())
    }

    /// Turns the stored paths back into full tracks. Paths the backend can
    /// no longer resolve are left out.
    pub async fn resolve<P: BridgePort>(
        &self,
        id: u64,
        gateway: &BridgeGateway<P>,
    ) -> Result<Playlist> {
        let list = self
            .get(id)
            .ok_or_else(|| InfernoError::Input(format!("no favourite list {id}")))?;

        let mut tracks = Vec::with_capacity(list.tracks.len());
        for path in &list.tracks {
            match gateway.get_metadata(path, false).await {
                Ok(meta) => tracks.push(Track {
                    path: path.clone(),
                    ..meta
                }),
                Err(err) => warn!(%err, path = %path, "skipping unresolvable favourite"),
            }
        }
        Ok(Playlist::new(tracks))
    }
}
