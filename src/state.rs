use crate::{
    archetype::Archetype,
    config::AppConfig,
    generation::{GenerationClient, GenerationStore, HttpGenerationClient, ImageData, RetryPolicy},
};
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// One lookbook run: the uploaded photo plus the state of every archetype.
#[derive(Clone)]
pub struct RunRecord {
    id: Uuid,
    source: Arc<ImageData>,
    store: Arc<GenerationStore>,
    archetypes: Vec<Archetype>,
}

impl RunRecord {
    pub fn new(source: ImageData, store: Arc<GenerationStore>, archetypes: Vec<Archetype>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: Arc::new(source),
            store,
            archetypes,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> Arc<ImageData> {
        self.source.clone()
    }

    pub fn store(&self) -> Arc<GenerationStore> {
        self.store.clone()
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }
}

/// Bounded history of runs; the oldest run is evicted once capacity is hit.
pub struct RunRegistry {
    inner: HashMap<Uuid, RunRecord>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl RunRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn add(&mut self, record: RunRecord) -> Uuid {
        let id = record.id();
        if self.inner.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.inner.remove(&oldest);
            }
        }
        self.inner.insert(id, record);
        self.order.push_back(id);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<&RunRecord> {
        self.inner.get(id)
    }
}

#[derive(Clone)]
pub struct AppState {
    config: AppConfig,
    runs: Arc<RwLock<RunRegistry>>,
    client: Arc<dyn GenerationClient>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let client = Arc::new(HttpGenerationClient::new(
            config.generation_endpoint.clone(),
            config.generation_api_key.clone(),
        ));
        Self::with_client(config, client)
    }

    /// Build state around an explicit client; the seam used by tests.
    pub fn with_client(config: AppConfig, client: Arc<dyn GenerationClient>) -> Self {
        let runs = RunRegistry::new(config.run_history_limit);
        Self {
            config,
            runs: Arc::new(RwLock::new(runs)),
            client,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn runs(&self) -> Arc<RwLock<RunRegistry>> {
        self.runs.clone()
    }

    pub fn client(&self) -> Arc<dyn GenerationClient> {
        self.client.clone()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.config.retry_max_attempts,
            Duration::from_millis(self.config.retry_initial_delay_ms),
        )
    }
}
