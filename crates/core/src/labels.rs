//! Recommended `app.kubernetes.io/*` labels and selector triples.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::MANAGED_BY;

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_VERSION: &str = "app.kubernetes.io/version";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";

/// Workload role sharing a namespace with the other roles of the same app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Backend,
    Redis,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Backend => "backend",
            Role::Redis => "redis",
        }
    }
}

/// Ordered label mapping. Insertion order is kept so rendered output is stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    entries: SmallVec<[(String, String); 8]>,
}

impl LabelSet {
    /// Labels shared by every resource of the app (no component key).
    pub fn base(app: &str, version: &str) -> Self {
        let mut entries = SmallVec::new();
        entries.push((LABEL_NAME.to_string(), app.to_string()));
        entries.push((LABEL_INSTANCE.to_string(), app.to_string()));
        entries.push((LABEL_VERSION.to_string(), version.to_string()));
        entries.push((LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()));
        Self { entries }
    }

    /// Base labels plus the component key for `role`.
    pub fn for_role(&self, role: Role) -> Self {
        let mut out = self.clone();
        out.entries.retain(|(k, _)| k != LABEL_COMPONENT);
        out.entries.push((LABEL_COMPONENT.to_string(), role.as_str().to_string()));
        out
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries.iter().cloned().collect()
    }

    /// The (name, instance, component) triple used by workload and service selectors.
    /// Keys missing from the set are skipped.
    pub fn selector(&self) -> BTreeMap<String, String> {
        [LABEL_NAME, LABEL_INSTANCE, LABEL_COMPONENT]
            .iter()
            .filter_map(|k| self.get(k).map(|v| (k.to_string(), v.to_string())))
            .collect()
    }
}
