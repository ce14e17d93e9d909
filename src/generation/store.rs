use super::item::{ImageData, ItemStatus};
use crate::archetype::Archetype;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("archetype '{0}' was submitted more than once")]
    Duplicate(Archetype),
    #[error("archetype '{0}' is not part of this run")]
    Unknown(Archetype),
    #[error("archetype '{0}' already has an attempt in flight")]
    AlreadyInFlight(Archetype),
}

/// Shared per-run record of every archetype's lifecycle state.
///
/// The store is the single owner of item state: workers and the serving
/// layer only read and write through it. Each mutation takes the write lock,
/// so a read-modify-write of one key can never interleave with another
/// update to the same key.
#[derive(Debug, Default)]
pub struct GenerationStore {
    items: RwLock<HashMap<Archetype, ItemStatus>>,
}

impl GenerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set every submitted archetype to `Pending`, discarding any previous
    /// result or error. Duplicate submissions are a caller error.
    pub async fn initialize(&self, archetypes: &[Archetype]) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        items.clear();
        for &archetype in archetypes {
            if items.insert(archetype, ItemStatus::Pending).is_some() {
                items.clear();
                return Err(StoreError::Duplicate(archetype));
            }
        }
        Ok(())
    }

    /// Reset one archetype to `Pending` for regeneration. Rejected while an
    /// attempt is in flight, so the same item can never be dispatched twice.
    pub async fn reset(&self, archetype: Archetype) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        match items.get_mut(&archetype) {
            None => Err(StoreError::Unknown(archetype)),
            Some(ItemStatus::InFlight) => Err(StoreError::AlreadyInFlight(archetype)),
            Some(status) => {
                *status = ItemStatus::Pending;
                Ok(())
            }
        }
    }

    /// Claim an archetype for a worker. Signals `AlreadyInFlight` instead of
    /// double-dispatching when another worker holds the item.
    pub async fn mark_in_flight(&self, archetype: Archetype) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        match items.get_mut(&archetype) {
            None => Err(StoreError::Unknown(archetype)),
            Some(ItemStatus::InFlight) => Err(StoreError::AlreadyInFlight(archetype)),
            Some(status) => {
                *status = ItemStatus::InFlight;
                Ok(())
            }
        }
    }

    pub async fn mark_done(&self, archetype: Archetype, image: ImageData) -> Result<(), StoreError> {
        self.set(archetype, ItemStatus::Done(image)).await
    }

    pub async fn mark_error(
        &self,
        archetype: Archetype,
        message: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.set(archetype, ItemStatus::Error(message.into())).await
    }

    async fn set(&self, archetype: Archetype, status: ItemStatus) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        match items.get_mut(&archetype) {
            None => Err(StoreError::Unknown(archetype)),
            Some(slot) => {
                *slot = status;
                Ok(())
            }
        }
    }

    pub async fn get(&self, archetype: Archetype) -> Option<ItemStatus> {
        self.items.read().await.get(&archetype).cloned()
    }

    /// Full current mapping, cloned out for rendering or reporting.
    pub async fn snapshot(&self) -> HashMap<Archetype, ItemStatus> {
        self.items.read().await.clone()
    }

    pub async fn in_flight_count(&self) -> usize {
        self.items
            .read()
            .await
            .values()
            .filter(|s| matches!(s, ItemStatus::InFlight))
            .count()
    }

    /// Every successfully generated image, in `Archetype::ALL` order, or
    /// `None` while any submitted item is not yet `Done`. This is the
    /// completeness gate the composite caller must pass.
    pub async fn done_images(&self) -> Option<Vec<(Archetype, ImageData)>> {
        let items = self.items.read().await;
        let mut out = Vec::with_capacity(items.len());
        for archetype in Archetype::ALL {
            match items.get(&archetype) {
                None => continue,
                Some(ItemStatus::Done(image)) => out.push((archetype, image.clone())),
                Some(_) => return None,
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> ImageData {
        ImageData::new("image/png", vec![7; 16])
    }

    #[tokio::test]
    async fn initialize_sets_pending_and_rejects_duplicates() {
        let store = GenerationStore::new();
        store
            .initialize(&[Archetype::Dreamer, Archetype::Icon])
            .await
            .unwrap();
        assert_eq!(store.get(Archetype::Dreamer).await, Some(ItemStatus::Pending));
        assert_eq!(store.get(Archetype::Scholar).await, None);

        let err = store
            .initialize(&[Archetype::Icon, Archetype::Icon])
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Duplicate(Archetype::Icon));
    }

    #[tokio::test]
    async fn in_flight_guard_rejects_second_claim() {
        let store = GenerationStore::new();
        store.initialize(&[Archetype::Maverick]).await.unwrap();

        store.mark_in_flight(Archetype::Maverick).await.unwrap();
        assert_eq!(
            store.mark_in_flight(Archetype::Maverick).await,
            Err(StoreError::AlreadyInFlight(Archetype::Maverick))
        );
        assert_eq!(
            store.reset(Archetype::Maverick).await,
            Err(StoreError::AlreadyInFlight(Archetype::Maverick))
        );

        store.mark_done(Archetype::Maverick, image()).await.unwrap();
        store.reset(Archetype::Maverick).await.unwrap();
        assert_eq!(
            store.get(Archetype::Maverick).await,
            Some(ItemStatus::Pending)
        );
    }

    #[tokio::test]
    async fn done_images_requires_every_item_terminal_and_successful() {
        let store = GenerationStore::new();
        store
            .initialize(&[Archetype::Dreamer, Archetype::Icon])
            .await
            .unwrap();
        assert_eq!(store.done_images().await, None);

        store.mark_done(Archetype::Dreamer, image()).await.unwrap();
        assert_eq!(store.done_images().await, None);

        store.mark_done(Archetype::Icon, image()).await.unwrap();
        let done = store.done_images().await.unwrap();
        assert_eq!(done.len(), 2);
        assert_eq!(done[0].0, Archetype::Dreamer);

        store
            .mark_error(Archetype::Icon, "backend failed")
            .await
            .unwrap();
        assert_eq!(store.done_images().await, None);
    }

    #[tokio::test]
    async fn unknown_archetype_is_a_store_error() {
        let store = GenerationStore::new();
        store.initialize(&[Archetype::Dreamer]).await.unwrap();
        assert_eq!(
            store.mark_done(Archetype::Icon, image()).await,
            Err(StoreError::Unknown(Archetype::Icon))
        );
    }
}
