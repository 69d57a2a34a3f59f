/*! Per-call-site static binding overrides.
 *
 * An override pins one call to direct dispatch (or forces it back to dynamic dispatch) without
 * touching the binding of the callee. Whole-program devirtualization records its decisions here.
 */

use crate::registry::Binding;
use cranelift_entity::{entity_impl, SecondaryMap};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSiteId(u32);
entity_impl!(CallSiteId, "call");

#[derive(Debug, Clone, Default)]
pub struct CallBindingOverrides {
    overrides: SecondaryMap<CallSiteId, Option<bool>>,
}

impl CallBindingOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_statically_bound(&mut self, site: CallSiteId, statically_bound: bool) {
        self.overrides[site] = Some(statically_bound);
    }

    /// `None` when no override was recorded for `site`.
    pub fn statically_bound(&self, site: CallSiteId) -> Option<bool> {
        self.overrides[site]
    }

    pub fn clear_override(&mut self, site: CallSiteId) {
        self.overrides[site] = None;
    }

    pub fn clear(&mut self) {
        self.overrides.clear();
    }

    pub fn len(&self) -> usize {
        self.overrides.values().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Binding used for `site` given the callee's effective binding.
    pub fn resolve(&self, site: CallSiteId, callee_binding: Binding) -> Binding {
        match self.statically_bound(site) {
            Some(true) => Binding::Static,
            Some(false) if callee_binding == Binding::Interface => Binding::Interface,
            Some(false) => Binding::Dynamic,
            None => callee_binding,
        }
    }
}
