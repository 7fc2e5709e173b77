//! Errors for the informer factory, hook invoker, finalizer manager, applier, watch
//! controllers and meta-supervisor (§7), styled after `kube-runtime::finalizer::Error`'s
//! pattern of wrapping an inner reconcile/IO error per concern.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] metac_core::Error),

    // --- §4.D hook invoker ---
    #[error("hook transport error calling {url}: {source}")]
    HookTransport { url: String, #[source] source: reqwest::Error },
    #[error("hook call to {url} timed out after {timeout_secs}s")]
    HookTimeout { url: String, timeout_secs: u64 },
    #[error("hook at {url} returned non-200 status {status}")]
    HookStatusNot200 { url: String, status: u16 },
    #[error("failed to decode hook response from {url}: {source}")]
    HookDecode { url: String, #[source] source: serde_json::Error },
    #[error("invalid hook configuration: {0}")]
    InvalidHookConfig(String),

    // --- §4.F attachment applier ---
    #[error("unknown update strategy {0:?}")]
    InvalidUpdateStrategy(String),
    #[error("desired child {key} of kind {kind} has labels that don't match the parent selector")]
    ChildLabelsMismatch { kind: String, key: String },

    // --- §4.E finalizer manager / §4.G controller ---
    #[error("object has no name, cannot synchronize finalizer")]
    UnnamedObject,

    // --- §4.G / §4.H configuration errors (fatal for one configuration, per §7) ---
    #[error("invalid configuration {name}: {reason}")]
    InvalidConfiguration { name: String, reason: String },
    #[error("empty spec.selector is not permitted (would select everything)")]
    EmptySelector,

    /// Aggregates per-object errors from a single applier pass (§4.F/§7: "one object's
    /// failure does not halt the pass").
    #[error("{0} object(s) failed during apply: {1}")]
    Aggregate(usize, AggregateDisplay),
}

/// A `Display`-only wrapper so `Aggregate`'s inner errors can be rendered without requiring
/// every contained error to itself implement `std::error::Error` uniformly.
#[derive(Debug)]
pub struct AggregateDisplay(pub Vec<String>);

impl std::fmt::Display for AggregateDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.join("; "))
    }
}

impl Error {
    pub fn aggregate(errors: Vec<(String, Error)>) -> Option<Error> {
        if errors.is_empty() {
            return None;
        }
        let n = errors.len();
        let msgs = errors.into_iter().map(|(k, e)| format!("{k}: {e}")).collect();
        Some(Error::Aggregate(n, AggregateDisplay(msgs)))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
