#![forbid(unsafe_code)]

//! Resolve, derive-close, analyze and emit an IR program in one call.

pub mod config;

use log::{debug, warn};
use miette::Diagnostic;
use rivet_backend_rs::{EmitOptions, RustBackendError, emit_program};
use rivet_ir::{FunctionDecl, Program};
use rivet_sema::{
    CopySet, DEFAULT_MAX_ITERATIONS, DeriveOutcome, ResolveOptions, SemanticError, Suggestion,
    TypeRegistry, Warning, analyze_function, compute_copy_closure, resolve_with, suggest,
    value_cycle_warnings,
};
use serde::Deserialize;
use thiserror::Error;

pub use config::{ConfigError, find_config, load_options};

#[derive(Debug, Error, Diagnostic)]
pub enum TranslateError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Backend(#[from] RustBackendError),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TranslateOptions {
    pub strict: bool,
    #[serde(alias = "max_iterations")]
    pub max_fixpoint_iterations: usize,
    pub header: Option<String>,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_fixpoint_iterations: DEFAULT_MAX_ITERATIONS,
            header: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Translation {
    pub source: String,
    pub warnings: Vec<Warning>,
    /// Clone-removal and pass-by-reference hints, per function.
    pub suggestions: Vec<Suggestion>,
    pub outcome: DeriveOutcome,
}

/// Everything short of emission: the annotated program, its registry and
/// the findings about it.
#[derive(Clone, Debug)]
pub struct Analysis {
    pub program: Program,
    pub registry: TypeRegistry,
    pub warnings: Vec<Warning>,
    pub suggestions: Vec<Suggestion>,
    pub outcome: DeriveOutcome,
}

pub fn analyze(
    mut program: Program,
    options: &TranslateOptions,
) -> Result<Analysis, TranslateError> {
    resolve_with(
        &mut program,
        &ResolveOptions {
            strict: options.strict,
        },
    )?;

    let outcome = compute_copy_closure(&mut program, options.max_fixpoint_iterations);
    debug!(
        "derive closure: {} copyable after {} passes",
        outcome.copyable.len(),
        outcome.iterations
    );

    let mut warnings = Vec::new();
    warnings.extend(outcome.warning());
    warnings.extend(value_cycle_warnings(&program));
    for w in &warnings {
        warn!("{w}");
    }

    // Derive tags changed; the registry handed to emission must see them.
    let registry = TypeRegistry::from_program(&program);
    let copy = CopySet::from_program(&program, &registry);
    let suggestions = all_functions(&program)
        .flat_map(|f| suggest(f, &analyze_function(f, &copy), &copy))
        .collect();

    Ok(Analysis {
        program,
        registry,
        warnings,
        suggestions,
        outcome,
    })
}

pub fn translate(program: Program, options: &TranslateOptions) -> Result<Translation, TranslateError> {
    let analysis = analyze(program, options)?;
    let emit = EmitOptions {
        header: options.header.clone(),
    };
    let source = emit_program(&analysis.program, &analysis.registry, &emit)?;
    Ok(Translation {
        source,
        warnings: analysis.warnings,
        suggestions: analysis.suggestions,
        outcome: analysis.outcome,
    })
}

fn all_functions(program: &Program) -> impl Iterator<Item = &FunctionDecl> {
    program
        .impls()
        .flat_map(|block| block.methods.iter())
        .chain(program.functions())
}
