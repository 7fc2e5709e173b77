//! Shared informer factory (§4.C), hook invoker (§4.D), finalizer manager (§4.E), attachment
//! applier (§4.F), watch controller (§4.G) and meta-supervisor (§4.H): everything the engine
//! needs on top of [`metac_core`]'s object model, discovery cache and dynamic client.
pub mod applier;
pub mod controller;
pub mod error;
pub mod finalizer;
pub mod hook;
pub mod informer;
pub mod merge;
pub mod supervisor;
pub mod workqueue;

pub use applier::{ApplyOptions, AttachmentApplier, UpdateStrategy};
pub use controller::{CompositeSpec, DecoratorSpec, Flavor, GenericSpec, HookSet, Selector, WatchController, WatchControllerConfig};
pub use error::{Error, Result};
pub use finalizer::FinalizerManager;
pub use hook::{HookConfig, HookInvoker, ServiceRef, SyncHookRequest, SyncHookResponse, WebhookInvoker};
pub use informer::{Informer, InformerEvent, SharedInformerFactory};
pub use supervisor::{ConfigBuilder, MetaSupervisor, SupervisorConfig};
pub use workqueue::WorkQueue;
