//! Core types for the metac meta-controller engine: the dynamic object model, the child
//! registry, API discovery caching (§4.A) and the atomic dynamic client (§4.B).
//!
//! The raw REST/watch transport itself is treated as an external collaborator (spec §1) and
//! is provided by the [`kube`] crate; this crate only adds the caching and atomicity
//! semantics the engine needs on top of it.

pub mod client;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod resource;
pub mod value;

pub use client::DynamicClient;
pub use discovery::{DiscoveryCache, DiscoveryCacheHandle};
pub use error::{DiscoveryError, Error, Result};
pub use metrics::Metrics;
pub use registry::Registry;
pub use resource::{ApiResource, GroupVersionKind, GroupVersionResource};
pub use value::{Object, OwnerReference};
