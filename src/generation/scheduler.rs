use super::{
    client::GenerationClient,
    item::ImageData,
    retry::RetryPolicy,
    store::{GenerationStore, StoreError},
};
use crate::archetype::Archetype;
use std::{
    collections::VecDeque,
    sync::Arc,
};
use tokio::{sync::Mutex, task::JoinSet};

/// Drain the submitted archetypes with a fixed number of concurrent workers.
///
/// Every worker loops on an atomic take-one queue, claims the item through
/// the store's in-flight guard, runs the retry-wrapped remote call, and
/// records the outcome. Individual item failures never abort the run; the
/// function returns once every submitted item has reached `Done` or `Error`.
pub async fn run_generation(
    store: Arc<GenerationStore>,
    client: Arc<dyn GenerationClient>,
    policy: RetryPolicy,
    source: Arc<ImageData>,
    archetypes: Vec<Archetype>,
    worker_count: usize,
) {
    if archetypes.is_empty() {
        return;
    }
    let worker_count = worker_count.clamp(1, archetypes.len());
    let queue = Arc::new(Mutex::new(VecDeque::from(archetypes)));

    let mut workers = JoinSet::new();
    for worker_id in 0..worker_count {
        let queue = queue.clone();
        let store = store.clone();
        let client = client.clone();
        let source = source.clone();
        workers.spawn(async move {
            loop {
                let next = { queue.lock().await.pop_front() };
                let Some(archetype) = next else {
                    break;
                };
                process_item(&store, client.as_ref(), &policy, &source, archetype, worker_id)
                    .await;
            }
        });
    }
    workers.join_all().await;
}

#[tracing::instrument(skip_all, fields(archetype = %archetype, worker_id))]
async fn process_item(
    store: &GenerationStore,
    client: &dyn GenerationClient,
    policy: &RetryPolicy,
    source: &ImageData,
    archetype: Archetype,
    worker_id: usize,
) {
    match store.mark_in_flight(archetype).await {
        Ok(()) => {}
        Err(StoreError::AlreadyInFlight(_)) => {
            tracing::debug!("skipping, another attempt is in flight");
            return;
        }
        Err(error) => {
            tracing::warn!("cannot claim item: {error}");
            return;
        }
    }

    let outcome = policy
        .execute(|| client.generate(source, archetype.prompt()))
        .await;

    let recorded = match outcome {
        Ok(image) => {
            tracing::info!("generation done");
            store.mark_done(archetype, image).await
        }
        Err(error) => {
            tracing::info!("generation failed: {error}");
            store.mark_error(archetype, error.message()).await
        }
    };
    if let Err(error) = recorded {
        tracing::warn!("cannot record outcome: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{client::GenerationError, item::ItemStatus};
    use async_trait::async_trait;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    struct FakeClient {
        fail_permanently: Vec<Archetype>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl FakeClient {
        fn new(fail_permanently: Vec<Archetype>) -> Self {
            Self {
                fail_permanently,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationClient for FakeClient {
        async fn generate(
            &self,
            _source: &ImageData,
            prompt: &str,
        ) -> Result<ImageData, GenerationError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            let failing = self
                .fail_permanently
                .iter()
                .any(|a| prompt == a.prompt());
            if failing {
                Err(GenerationError::Permanent("policy refusal".into()))
            } else {
                Ok(ImageData::new("image/png", prompt.as_bytes().to_vec()))
            }
        }
    }

    fn source() -> Arc<ImageData> {
        Arc::new(ImageData::new("image/jpeg", vec![1, 2, 3]))
    }

    #[tokio::test(start_paused = true)]
    async fn every_item_reaches_a_terminal_state() {
        let store = Arc::new(GenerationStore::new());
        store.initialize(&Archetype::ALL).await.unwrap();
        let client = Arc::new(FakeClient::new(vec![Archetype::Scholar]));

        run_generation(
            store.clone(),
            client.clone(),
            RetryPolicy::default(),
            source(),
            Archetype::ALL.to_vec(),
            2,
        )
        .await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 5);
        for (archetype, status) in snapshot {
            assert!(status.is_terminal(), "{archetype} left in {status:?}");
            if archetype == Archetype::Scholar {
                assert_eq!(status, ItemStatus::Error("policy refusal".into()));
            } else {
                assert!(matches!(status, ItemStatus::Done(_)));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_never_exceeds_worker_count() {
        let store = Arc::new(GenerationStore::new());
        store.initialize(&Archetype::ALL).await.unwrap();
        let client = Arc::new(FakeClient::new(vec![]));

        run_generation(
            store.clone(),
            client.clone(),
            RetryPolicy::default(),
            source(),
            Archetype::ALL.to_vec(),
            2,
        )
        .await;

        assert!(client.max_active.load(Ordering::SeqCst) <= 2);
        assert_eq!(store.done_images().await.unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_items_are_skipped_not_redispatched() {
        let store = Arc::new(GenerationStore::new());
        store.initialize(&[Archetype::Icon]).await.unwrap();
        store.mark_in_flight(Archetype::Icon).await.unwrap();

        let client = Arc::new(FakeClient::new(vec![]));
        run_generation(
            store.clone(),
            client.clone(),
            RetryPolicy::default(),
            source(),
            vec![Archetype::Icon],
            1,
        )
        .await;

        // The stuck in-flight attempt is left alone; nothing was dispatched.
        assert_eq!(client.max_active.load(Ordering::SeqCst), 0);
        assert_eq!(store.get(Archetype::Icon).await, Some(ItemStatus::InFlight));
    }

    #[tokio::test(start_paused = true)]
    async fn single_item_regeneration_is_a_one_worker_run() {
        let store = Arc::new(GenerationStore::new());
        store.initialize(&[Archetype::Dreamer]).await.unwrap();
        let client = Arc::new(FakeClient::new(vec![]));

        run_generation(
            store.clone(),
            client,
            RetryPolicy::default(),
            source(),
            vec![Archetype::Dreamer],
            1,
        )
        .await;

        assert!(matches!(
            store.get(Archetype::Dreamer).await,
            Some(ItemStatus::Done(_))
        ));
    }
}
