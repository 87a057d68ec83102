//! Drydock - service catalog to Kubernetes manifest pipeline
//!
//! Drydock turns a catalog of declarative service descriptions into cluster
//! resource manifests, computes a dependency-respecting deployment order, and
//! applies the result through `kubectl`. It exists so that a multi-service
//! development environment can be stood up on a local or remote cluster from
//! a single catalog file.
//!
//! # Architecture
//!
//! Data flows in one direction:
//! catalog entries -> dependency resolver (apply order) -> manifest compiler
//! (resource documents, per service) -> deployment orchestrator (serialize and
//! apply, one service at a time) -> health checker (post-apply confirmation).
//!
//! Manifest generation is pure and idempotent; the only side effects live in
//! the orchestrator and cluster modules, which drive external processes.
//!
//! # Modules
//!
//! - [`catalog`] - Validated service descriptions (application + infrastructure)
//! - [`graph`] - Dependency resolution, topological ordering, cycle detection
//! - [`workload`] - Typed Kubernetes resource structs
//! - [`manifest`] - Manifest envelope, validation, quantity/label utilities,
//!   canonical multi-document serialization
//! - [`compiler`] - Catalog entry to manifest generators (infra + app paths)
//! - [`deploy`] - Deployment orchestrator and the kubectl process runner
//! - [`health`] - Workload/endpoint health classification and bounded waits
//! - [`cluster`] - Local cluster lifecycle (k3d) and context switching
//! - [`retry`] - Bounded backoff for transient external-tool failures
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod catalog;
pub mod cluster;
pub mod compiler;
pub mod deploy;
pub mod error;
pub mod graph;
pub mod health;
pub mod manifest;
pub mod retry;
pub mod workload;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label applied to every generated resource so drydock-managed state can be
/// listed and selected in one query
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on everything this crate generates
pub const MANAGED_BY: &str = "drydock";

/// Label carrying the service name; the health checker selects pods on it
pub const NAME_LABEL: &str = "app.kubernetes.io/name";

/// Label carrying the service tier
pub const TIER_LABEL: &str = "drydock.dev/tier";

/// First port of the externally-reachable (NodePort) range
pub const NODE_PORT_MIN: u16 = 30000;

/// Last port of the externally-reachable (NodePort) range
pub const NODE_PORT_MAX: u16 = 32767;
