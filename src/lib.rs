pub mod articles;
pub mod collections;
pub mod config;
pub mod errors;
pub mod keys;
pub mod models;
pub mod notifier;
pub mod state;
pub mod stats;
pub mod storage;
pub mod store;
pub mod subscriber;
pub mod telemetry;
pub mod views;

pub use articles::{ArticleClient, ArticleFeed, FeedSource};
pub use collections::Records;
pub use config::AppConfig;
pub use errors::{AppError, ErrorKind};
pub use notifier::{ChangeBus, Context, StorageEvent};
pub use state::AppState;
pub use storage::{SnapshotWriter, load_snapshot, resolve_data_path, spawn_persister};
pub use store::{KeyValueStore, MemoryStore, SharedStore};
pub use subscriber::{Mounted, Subscriber, SubscriberState, View};
