//! Authorization Controller Reconcilers
//!
//! Handlers for the four kinds of updates the index publishes:
//!
//! - A binding is ensured while it is live: its template is resolved, the rendered roles and pod
//!   security policies are written once, and a binding object is created for each granted role in
//!   each scope of its fan-out. When the binding is deleted, every object labeled with its UID is
//!   removed before its finalizer is released.
//! - A namespace that joins a project receives the grants of all of that project's bindings. The
//!   bootstrap namespace is assigned to the default project once per cluster.
//! - A template change re-ensures every binding whose resolution reaches it. Templates carry a
//!   finalizer too, and the roles rendered from a deleted template are removed before it is
//!   released.
//!
//! All reads and writes go through a [`Store`], so handlers hold no state between invocations and
//! every pass recomputes what should exist from what does.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod binding;
mod controller;
mod error;
pub mod finalizer;
mod metrics;
mod namespace;
pub mod psp;
mod resolve;
pub mod roles;
pub mod store;
mod template;


pub use self::{
    binding::{Binding, Reconciler},
    controller::{Backoff, Controller},
    error::{Error, Result},
    metrics::ControllerMetrics,
    resolve::Resolver,
    store::{KubeStore, Object, Store},
};

/// Holds cluster-wide configuration used by the reconcilers.
#[derive(Clone, Debug)]
pub struct ClusterInfo {
    /// Names the `Cluster` object whose conditions record bootstrap state.
    pub cluster_name: String,

    /// The namespace assigned to the default project on first sight.
    pub bootstrap_namespace: String,

    pub default_project: String,
}
