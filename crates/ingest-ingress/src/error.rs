//! Ingress adapter errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("invalid bind address: {0}")]
    InvalidAddr(#[from] std::net::AddrParseError),

    #[error("failed to bind listener: {0}")]
    BindFailed(std::io::Error),
}
