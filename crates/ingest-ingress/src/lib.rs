//! Change-notification and lifecycle webhook ingress

pub mod dispatch;
pub mod error;
pub mod server;
pub mod wire;

pub use dispatch::Dispatcher;
pub use error::IngressError;
pub use server::IngressServer;
