//! Repository ports: traits the infrastructure layer implements against a
//! concrete store, and the application layer depends on only abstractly.

pub mod queue_store;
pub mod state_store;

pub use queue_store::QueueStore;
pub use state_store::StateStore;
