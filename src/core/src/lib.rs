mod attachment;
mod backend;
mod config;
mod error;
mod parley_config;
mod paths;
mod sync;

pub use attachment::Attachment;
pub use backend::{Backend, BackendFuture, HttpBackend};
pub use config::ClientConfig;
pub use error::{ApiError, SyncError};
pub use parley_config::{BackendConfig, DebugConfig, ParleyConfig, PollingConfig};
pub use paths::{parley_config_path, parley_home_dir};
pub use sync::{
    ConversationStore, Delivery, PollScheduler, SyncController, SyncEvent, SyncSnapshot,
};
