//! # tpuff schema
//!
//! Validation, diffing and additive reconciliation of namespace schemas.
//!
//! ## Features
//!
//! - **Typed declarations**: every attribute type is parsed once into [`AttributeType`]
//! - **Order-insensitive comparison** through a canonical normal form
//! - **Additive only**: a deployed attribute's type is never changed
//! - **Batch apply** over a prefix or every namespace, with one confirmation
//!
//! ## Architecture
//!
//! ```text
//! schema.json ──> validate ──> Schema (desired)
//!                                  │
//! NamespaceStore::fetch_schema ──> diff ──> SchemaDiff
//!                                  │          ├─> unchanged
//!                                  │          ├─> additions
//!                                  │          └─> conflicts ──> Blocked
//!                                  │
//!                         Confirm ─┴─> write_schema (+ placeholder row)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use tpuff_schema::{ApplyOptions, ConfirmPrompt, InMemoryStore, Schema, SchemaApplier};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryStore::new();
//! let desired = Schema::load_file("schema.json".as_ref())?;
//! let options = ApplyOptions { auto_confirm: true, ..ApplyOptions::default() };
//!
//! let report = SchemaApplier::new(&store)
//!     .apply("docs", &desired, &options, &|_: &ConfirmPrompt| true)
//!     .await;
//! println!("{:?}", report.outcome);
//! # Ok(())
//! # }
//! ```

mod apply;
mod batch;
mod copy;
mod diff;
mod error;
mod memory;
mod normalize;
mod store;
mod types;
mod validate;

pub use apply::{ApplyOptions, ApplyOutcome, SchemaApplier, SingleApplyReport, SinglePlan};
pub use batch::{
    BatchApplyResult, BatchOptions, BatchOutcome, BatchPlan, BatchReport, SummaryPhase,
    TargetStatus, DEFAULT_PLAN_CONCURRENCY,
};
pub use copy::{CopyOutcome, CopyPlan, CopyRefusal};
pub use diff::{diff, DiffEntry, SchemaDiff};
pub use error::{Result, SchemaError, StoreError};
pub use memory::InMemoryStore;
pub use normalize::{display_form, normalize};
pub use store::{
    resolve_targets, timed, Confirm, ConfirmPrompt, NamespaceStore, TargetSelector,
    DEFAULT_CALL_TIMEOUT, PLACEHOLDER_ROW_ID,
};
pub use types::{AttributeType, BaseType, Precision, Schema, SimpleType, TypeOptions, VectorType};
pub use validate::{validate_attribute, validate_schema};
