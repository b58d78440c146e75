//! Port traits implemented by adapter crates.

pub mod dedup;
pub mod graph_provider;
pub mod lifecycle_events;
pub mod publisher;
pub mod subscription_store;
pub mod transport;

pub use dedup::DedupFilter;
pub use graph_provider::{DiscoveredUser, GraphProvider, NewSubscription};
pub use lifecycle_events::LifecycleEventSink;
pub use publisher::Publisher;
pub use subscription_store::SubscriptionStore;
pub use transport::AuthenticatedTransport;
