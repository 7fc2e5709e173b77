//! Error types shared across the engine (§7), styled after `kube-client`'s `Error` enum:
//! one flat `thiserror` enum per crate boundary, with `#[from]` for upstream conversions
//! and a nested sub-enum for one especially busy concern (here, discovery).
use thiserror::Error;

/// Errors surfaced by `metac-core` (discovery, the dynamic client, the object model).
#[derive(Error, Debug)]
pub enum Error {
    /// The discovery cache was queried before its first refresh completed (§4.A).
    #[error("discovery cache has not completed its first refresh yet")]
    DiscoveryNotSynced,

    /// No discovered resource matches the requested `(apiVersion, kind)`.
    #[error("no discovered resource for {0}")]
    DiscoveryNotFound(String),

    /// Discovery refresh failed against the apiserver; the previous snapshot is retained.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// The object fetched by `AtomicUpdate`'s GET no longer matches the caller's `uid`
    /// (§4.B) — treated the same as a plain not-found by callers.
    #[error("object {0} not found (uid mismatch or deleted)")]
    NotFound(String),

    /// A write lost the optimistic-concurrency race after exhausting the retry budget.
    #[error("conflict updating {0}: retries exhausted")]
    Conflict(String),

    /// Underlying Kubernetes API client error.
    #[error("kube API error: {0}")]
    Kube(#[from] kube::Error),

    /// Failed to (de)serialize an object to/from JSON.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Sub-errors specific to API discovery (§4.A), mirroring `kube-client::DiscoveryError`'s
/// pattern of isolating the "what part of a GVK/GVR was unparseable or missing" cases.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("invalid apiVersion: {0}")]
    InvalidApiVersion(String),
    #[error("apiserver discovery request failed: {0}")]
    Request(#[source] kube::Error),
    #[error("resource name denotes an unparseable subresource: {0}")]
    InvalidSubresourceName(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
