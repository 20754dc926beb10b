pub mod captures;
pub mod config;
pub mod decl;
pub mod deps;
pub mod diagnostics;
pub mod emit;
pub mod engine;
pub mod imports;
pub mod keep;
pub mod load;
pub mod merge;
pub mod rename;
pub mod resolve;
pub mod source;
pub mod strip;
pub mod symbols;

mod util;

pub use config::{Config, SourceText};
pub use diagnostics::{render_diagnostics_md, Diagnostic, DiagnosticCode, Phase};
pub use engine::{instantiate, instantiate_to_string};
