//! Ingestion Core - domain logic, ports, and configuration
//!
//! This crate contains the hexagonal architecture core of the email
//! ingestion subsystem:
//! - **Domain entities** - `Tenant`, `MailboxUser`, `SubscriptionRecord`,
//!   `ChangeNotification`, `DeltaPage`, `EmailEnvelope`, `Fingerprint`
//! - **Port definitions** - Traits for adapters: `SubscriptionStore`,
//!   `GraphProvider`, `DedupFilter`, `Publisher`, `AuthenticatedTransport`
//! - **Configuration** - Typed configuration surface loaded from YAML
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external I/O.
//! Ports define trait interfaces that adapter crates implement; orchestration
//! (lifecycle management, notification dispatch, delta sync) lives in
//! separate crates that depend on this one.

pub mod config;
pub mod domain;
pub mod ports;
