//! Authorization Controller Index
//!
//! Bindings fan out to the namespaces of a project, and namespaces join projects by label. Rather
//! than scanning every namespace (or every binding) with a label selector on each reconciliation,
//! this index maintains the two lookups the reconcilers need:
//!
//! - project → namespaces, from each `Namespace`'s project label;
//! - project → bindings, from each `ProjectRoleTemplateBinding`'s project name.
//!
//! It also tracks every `ClusterRoleTemplateBinding` and `RoleTemplate` so that a template change
//! can be traced back to the bindings that use it.
//!
//! Every applied resource is published as an [`Update`] on a channel. The index is updated
//! synchronously by the watch tasks and never talks to the API server itself; the consumer of the
//! update channel runs the reconcilers.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod index;
mod metrics;


pub use self::{
    index::{Index, ResourceId, SharedIndex, Update},
    metrics::{IndexMetrics, SizedIndex},
};
