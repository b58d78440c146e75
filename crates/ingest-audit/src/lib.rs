//! Structured audit events for the email ingestion subsystem.

pub mod logger;

pub use logger::AuditLogger;
