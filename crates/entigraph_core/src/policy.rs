//! Mapping policies.

use serde::{Deserialize, Serialize};

/// How eagerly a property's value is resolved from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStrategy {
    /// Let the entity state decide.
    #[default]
    Default,
    /// Resolve the value immediately.
    Eager,
    /// Leave the value unresolved until it is explicitly accessed.
    Lazy,
}

/// Controls how a property or association is loaded and saved.
///
/// A policy is passed down into every per-property copy. A property may
/// declare its own policy; see [`MappingPolicy::resolve`] for how the two
/// combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingPolicy {
    /// Load strategy.
    pub load: LoadStrategy,
    /// If set, the property is never written to the store.
    pub read_only: bool,
}

impl MappingPolicy {
    /// The store decides; writable.
    pub const DEFAULT: Self = Self {
        load: LoadStrategy::Default,
        read_only: false,
    };

    /// Load eagerly; writable.
    pub const EAGER: Self = Self {
        load: LoadStrategy::Eager,
        read_only: false,
    };

    /// Load lazily; writable.
    pub const LAZY: Self = Self {
        load: LoadStrategy::Lazy,
        read_only: false,
    };

    /// The store decides; never written.
    pub const READ_ONLY: Self = Self {
        load: LoadStrategy::Default,
        read_only: true,
    };

    /// Creates a policy with the given load strategy.
    #[must_use]
    pub const fn new(load: LoadStrategy) -> Self {
        Self {
            load,
            read_only: false,
        }
    }

    /// Sets the read-only flag.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Returns true if values should be resolved right away.
    #[must_use]
    pub const fn should_load(&self) -> bool {
        !matches!(self.load, LoadStrategy::Lazy)
    }

    /// Picks the policy that applies to one property copy.
    ///
    /// Most specific wins: a policy declared on the property replaces the
    /// operation-level policy entirely. There is no field-wise merge.
    #[must_use]
    pub fn resolve(operation: &MappingPolicy, property: Option<&MappingPolicy>) -> MappingPolicy {
        property.copied().unwrap_or(*operation)
    }
}
