use std::collections::BTreeSet;

/// The set of scopes that a single binding's grant is materialized into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FanOut {
    /// The grant applies to the whole cluster.
    Cluster,

    /// The grant applies to each of these namespaces.
    Namespaces(BTreeSet<String>),
}

// === impl FanOut ===

impl FanOut {
    /// A project that owns no namespaces yet has an empty fan-out.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Cluster => false,
            Self::Namespaces(namespaces) => namespaces.is_empty(),
        }
    }

    /// Iterates over the fan-out's namespaces; the cluster scope yields a single `None`.
    pub fn scopes(&self) -> Box<dyn Iterator<Item = Option<&str>> + Send + '_> {
        match self {
            Self::Cluster => Box::new(std::iter::once(None)),
            Self::Namespaces(namespaces) => Box::new(namespaces.iter().map(|ns| Some(ns.as_str()))),
        }
    }
}

impl FromIterator<String> for FanOut {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self::Namespaces(iter.into_iter().collect())
    }
}
