pub mod client;
pub mod item;
pub mod retry;
pub mod scheduler;
pub mod store;

pub use client::{GenerationClient, GenerationError, HttpGenerationClient};
pub use item::{ImageData, ItemStatus};
pub use retry::RetryPolicy;
pub use scheduler::run_generation;
pub use store::{GenerationStore, StoreError};
