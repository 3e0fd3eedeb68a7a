use crate::FINALIZER;
use authz_controller_k8s_api::Resource;

/// The lifecycle state of a binding, derived from its deletion marker and our finalizer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BindingState {
    /// The binding exists and is not being deleted; its grant must be ensured.
    Active,

    /// Deletion was requested and our finalizer is still attached; the binding's objects must be
    /// cleaned up before the finalizer is released.
    Terminating,

    /// The binding is absent, or it is being deleted and we have already released it.
    Gone,
}

// === impl BindingState ===

impl BindingState {
    pub fn of<B: Resource>(binding: Option<&B>) -> Self {
        let meta = match binding {
            Some(binding) => binding.meta(),
            None => return Self::Gone,
        };

        if meta.deletion_timestamp.is_none() {
            return Self::Active;
        }

        if has_finalizer(meta.finalizers.as_deref()) {
            Self::Terminating
        } else {
            Self::Gone
        }
    }
}

pub fn has_finalizer(finalizers: Option<&[String]>) -> bool {
    finalizers.into_iter().flatten().any(|f| f == FINALIZER)
}

/// Attaches our finalizer, returning false if it was already present.
pub fn add_finalizer(finalizers: &mut Option<Vec<String>>) -> bool {
    if has_finalizer(finalizers.as_deref()) {
        return false;
    }
    finalizers
        .get_or_insert_with(Vec::new)
        .push(FINALIZER.to_string());
    true
}

/// Releases our finalizer, leaving any other system's finalizers in place. Returns false if it was
/// not present.
pub fn remove_finalizer(finalizers: &mut Option<Vec<String>>) -> bool {
    let Some(list) = finalizers.as_mut() else {
        return false;
    };
    let before = list.len();
    list.retain(|f| f != FINALIZER);
    if list.len() == before {
        return false;
    }
    if list.is_empty() {
        *finalizers = None;
    }
    true
}
