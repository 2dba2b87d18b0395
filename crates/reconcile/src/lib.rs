//! # Reconcile
//!
//! A declarative resource-provisioning core.
//!
//! Callers hand the reconciler a desired-state graph of resource
//! declarations and the stack's last-applied state; it computes the minimal
//! set of create/update/delete operations, orders them by dependency, and
//! executes them against pluggable providers.
//!
//! ## Core concepts
//!
//! - [`ResourceDecl`]: one declared resource - logical name, type tag,
//!   properties, dependencies
//! - [`StackState`]: the persisted last-applied record per resource
//! - [`Plan`]: the diff between the two, as an ordered operation list
//! - [`Provider`]: capability set (create/update/delete/read) per type tag
//! - [`execute`]: dependency-ordered execution over a bounded worker pool
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{
//!     ExecuteOptions, NoProgress, ProviderSet, ResourceDecl, StackState,
//!     execute, plan,
//! };
//! use std::sync::atomic::AtomicBool;
//!
//! let desired = vec![
//!     ResourceDecl::new("assets", "bucket").with_property("label", "assets-prod"),
//!     ResourceDecl::new("images", "repository")
//!         .with_property("mirror_of", "${assets.id}"),
//! ];
//!
//! let mut providers = ProviderSet::new();
//! providers.register("bucket", Box::new(my_bucket_provider));
//! providers.register("repository", Box::new(my_repository_provider));
//!
//! let mut state = StackState::new();
//! let plan = plan(&desired, &state, &providers)?;
//! let report = execute(
//!     plan,
//!     &providers,
//!     &mut state,
//!     &ExecuteOptions::default(),
//!     &mut NoProgress,
//!     &AtomicBool::new(false),
//! )?;
//! assert!(report.is_success());
//! ```
//!
//! Re-running with the same declarations against the resulting state plans
//! only no-ops: reconciliation is idempotent and converges forward, never
//! rolling back.

pub mod drift;
pub mod error;
pub mod executor;
pub mod graph;
pub mod outputs;
pub mod planner;
pub mod provider;
pub mod resource;
pub mod state;
pub mod types;

// Re-export main types at crate root
pub use drift::{DriftFinding, detect as detect_drift};
pub use error::{Cycle, Error, Result};
pub use executor::{NoProgress, ProgressCallback, execute};
pub use outputs::{OutputValue, resolve as resolve_outputs};
pub use planner::{Plan, PlannedOp, content_hash, plan};
pub use provider::{Created, OpContext, Provider, ProviderSet};
pub use resource::{AttrRef, ResourceDecl, resolve_properties};
pub use state::{FileStore, ResourceRecord, StackState, StateStore};
pub use types::{
    ExecuteOptions, OpKind, OpOutcome, OpRecord, RunReport, RunSummary, SkipReason,
};
