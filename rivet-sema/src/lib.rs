#![forbid(unsafe_code)]

pub mod builtins;
mod copy;
pub mod derive;
mod error;
mod registry;
pub mod resolve;
pub mod usage;

pub use copy::CopySet;
pub use derive::{
    DEFAULT_MAX_ITERATIONS, DeriveOutcome, compute_copy_closure, find_value_cycles,
    value_cycle_warnings,
};
pub use error::{SemanticError, Warning};
pub use registry::{FnSig, TypeRegistry};
pub use resolve::{Env, ResolveOptions, infer_type, resolve, resolve_with};
pub use usage::{
    BindingId, ReadPosition, Scopes, Suggestion, SuggestionKind, UsageReport, VarUsage,
    analyze_function, is_text_concat, signature_scopes, suggest,
};
