use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("{kind} {name} was modified concurrently")]
    Conflict { kind: String, name: String },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("role template cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error(transparent)]
    Api(#[from] kube::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// === impl Error ===

impl Error {
    pub(crate) fn not_found(kind: impl ToString, name: impl ToString) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    /// Whether redelivering the same key may succeed.
    ///
    /// A misconfigured object stays misconfigured until it is edited, which produces a new
    /// notification anyway.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Collects the errors of independent writes so that one failure does not prevent the others
/// from being attempted.
#[derive(Debug, Default)]
pub(crate) struct Errors(Vec<Error>);

impl Errors {
    pub(crate) fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.0.push(error);
                None
            }
        }
    }

    /// Records a failure that redelivery may fix; permanent failures are only logged.
    pub(crate) fn record_retryable(&mut self, result: Result<()>) {
        match result {
            Err(error) if !error.is_retryable() => {
                tracing::warn!(%error, "Skipping");
            }
            result => {
                self.record(result);
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the first recorded error, if any.
    pub(crate) fn into_result(self) -> Result<()> {
        match self.0.into_iter().next() {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_names_path() {
        let error = Error::Cycle(vec!["a".to_string(), "b".to_string(), "a".to_string()]);
        assert_eq!(error.to_string(), "role template cycle: a -> b -> a");
        assert!(error.is_retryable());
    }

    #[test]
    fn configuration_is_permanent() {
        assert!(!Error::Configuration("no subject".to_string()).is_retryable());
        assert!(Error::not_found("RoleTemplate", "readonly").is_retryable());
    }

    #[test]
    fn errors_keep_the_first() {
        let mut errors = Errors::default();
        assert_eq!(errors.record(Ok::<_, Error>(1)), Some(1));
        errors.record::<()>(Err(Error::not_found("Role", "a")));
        errors.record::<()>(Err(Error::Configuration("b".to_string())));
        assert!(!errors.is_empty());
        assert!(matches!(
            errors.into_result(),
            Err(Error::NotFound { name, .. }) if name == "a"
        ));
    }
}
