#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use authz_controller_k8s_api as k8s;
pub use authz_controller_k8s_index as index;
pub use authz_controller_k8s_reconcile as reconcile;

mod args;

pub use self::args::Args;
