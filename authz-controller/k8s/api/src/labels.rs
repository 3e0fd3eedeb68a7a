use std::{collections::BTreeMap, fmt};

pub type Map = BTreeMap<String, String>;

/// Selects objects whose labels carry every one of a set of key/value pairs.
///
/// The reconciler only ever selects on exact label values (owner UIDs, template names, project
/// names), so set-based expressions are not supported.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    match_labels: Map,
}

// === Selector ===

impl Selector {
    pub fn from_map(match_labels: Map) -> Self {
        Self { match_labels }
    }

    /// Selects objects labeled `key=value`.
    pub fn matching(key: impl ToString, value: impl ToString) -> Self {
        Some((key.to_string(), value.to_string()))
            .into_iter()
            .collect()
    }

    pub fn matches(&self, labels: &Map) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

/// Formats the selector in the API server's `labelSelector` query syntax.
impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.match_labels.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}
