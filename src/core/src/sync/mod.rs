mod controller;
mod feeds;
mod poller;
mod store;

#[cfg(test)]
pub(crate) mod fake;

pub use controller::SyncController;
pub use poller::PollScheduler;
pub use store::{ConversationStore, Delivery, SyncEvent, SyncSnapshot};
