#![forbid(unsafe_code)]

mod emit;
pub mod naming;

pub use emit::{EmitOptions, RustBackendError, emit_program, format_number};
