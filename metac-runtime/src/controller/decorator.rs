//! §4.G "Decorator specifics" — a named decoration of a single parent kind. Children carry no
//! owner reference to the parent (the decorator never wants GC cascade-delete to follow from
//! the decorated object), so provenance is annotation-only.
use super::Selector;
use crate::applier::UpdateStrategy;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct DecoratorSpec {
    /// Stamped into the `<domain>/decorator-controller` annotation on every child this
    /// decorator creates, so multiple decorators of the same parent kind don't collide over
    /// provenance (§3).
    pub name: String,
    pub selector: Selector,
    pub strategies: HashMap<(String, String), UpdateStrategy>,
}
