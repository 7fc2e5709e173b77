//! §4.G "Generic specifics" — the least constrained flavor: an arbitrary watch+attachment
//! kind pair gated behind explicit `readOnly`/`updateAny`/`deleteAny` policy flags rather than
//! composite/decorator's implicit ownership assumptions.
use super::Selector;
use crate::applier::UpdateStrategy;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct GenericSpec {
    pub selector: Selector,
    /// Whether created children get an owner reference back to the watch (§4.G "is_watch_owner
    /// configurable, defaults false" — unlike composite, which defaults true).
    pub is_watch_owner: bool,
    /// Permit updating/deleting children this configuration did not itself create.
    pub update_any: bool,
    pub delete_any: bool,
    /// Never create, update or delete attachments; hook runs for observation/status only.
    pub read_only: bool,
    pub strategies: HashMap<(String, String), UpdateStrategy>,
}
