use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Load,
    Bind,
    Keep,
    Emit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticCode {
    TG0001UnitNotFound,
    TG0002UnitParse,
    TG0003DuplicateDefinition,
    TG0004ExistingParse,
    TG0101SymbolNotFound,
    TG0102InvalidRename,
    TG0103InvalidParam,
    TG0104ConflictingBinding,
    TG0201InvalidKeepSpec,
    TG0202NotAType,
    TG0203KeepNotFound,
    TG0301RenderFailed,
    TG0302DetectModule,
}

impl DiagnosticCode {
    pub fn code_str(self) -> &'static str {
        match self {
            DiagnosticCode::TG0001UnitNotFound => "TG0001",
            DiagnosticCode::TG0002UnitParse => "TG0002",
            DiagnosticCode::TG0003DuplicateDefinition => "TG0003",
            DiagnosticCode::TG0004ExistingParse => "TG0004",
            DiagnosticCode::TG0101SymbolNotFound => "TG0101",
            DiagnosticCode::TG0102InvalidRename => "TG0102",
            DiagnosticCode::TG0103InvalidParam => "TG0103",
            DiagnosticCode::TG0104ConflictingBinding => "TG0104",
            DiagnosticCode::TG0201InvalidKeepSpec => "TG0201",
            DiagnosticCode::TG0202NotAType => "TG0202",
            DiagnosticCode::TG0203KeepNotFound => "TG0203",
            DiagnosticCode::TG0301RenderFailed => "TG0301",
            DiagnosticCode::TG0302DetectModule => "TG0302",
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            DiagnosticCode::TG0001UnitNotFound
            | DiagnosticCode::TG0002UnitParse
            | DiagnosticCode::TG0003DuplicateDefinition
            | DiagnosticCode::TG0004ExistingParse => Phase::Load,
            DiagnosticCode::TG0101SymbolNotFound
            | DiagnosticCode::TG0102InvalidRename
            | DiagnosticCode::TG0103InvalidParam
            | DiagnosticCode::TG0104ConflictingBinding => Phase::Bind,
            DiagnosticCode::TG0201InvalidKeepSpec
            | DiagnosticCode::TG0202NotAType
            | DiagnosticCode::TG0203KeepNotFound => Phase::Keep,
            DiagnosticCode::TG0301RenderFailed | DiagnosticCode::TG0302DetectModule => Phase::Emit,
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            DiagnosticCode::TG0001UnitNotFound => "template unit not found",
            DiagnosticCode::TG0002UnitParse => "failed to parse template source",
            DiagnosticCode::TG0003DuplicateDefinition => "name defined twice in the template unit",
            DiagnosticCode::TG0004ExistingParse => "failed to parse existing source",
            DiagnosticCode::TG0101SymbolNotFound => "name not found",
            DiagnosticCode::TG0102InvalidRename => "rename target is not an identifier",
            DiagnosticCode::TG0103InvalidParam => "invalid parameter value",
            DiagnosticCode::TG0104ConflictingBinding => "name is both a parameter and a rename",
            DiagnosticCode::TG0201InvalidKeepSpec => "invalid use spec",
            DiagnosticCode::TG0202NotAType => "keep-spec receiver is not a type",
            DiagnosticCode::TG0203KeepNotFound => "keep-spec name not found",
            DiagnosticCode::TG0301RenderFailed => "failed to format output",
            DiagnosticCode::TG0302DetectModule => "failed to detect output module",
        }
    }

    pub fn default_help(self) -> Option<&'static str> {
        match self {
            DiagnosticCode::TG0001UnitNotFound => {
                Some("Pass a `.rs` file or a directory containing `.rs` files.")
            }
            DiagnosticCode::TG0201InvalidKeepSpec => {
                Some("A use spec is `Name` or `Type.Method`, in output spelling.")
            }
            DiagnosticCode::TG0302DetectModule => {
                Some("Create the output directory or pass an explicit module name.")
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub phase: Phase,
    pub message: String,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            phase: code.phase(),
            message: message.into(),
            help: code.default_help().map(|s| s.to_string()),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?}: {}",
            self.code.code_str(),
            self.phase,
            self.message
        )?;
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Shorthand for `Err(Diagnostic::error(..).into())`.
pub(crate) fn fail<T>(code: DiagnosticCode, message: impl Into<String>) -> anyhow::Result<T> {
    Err(Diagnostic::error(code, message).into())
}

pub fn render_diagnostics_md() -> String {
    let mut rows: Vec<(&'static str, Phase, &'static str, &'static str)> = all_codes()
        .iter()
        .map(|code| {
            (
                code.code_str(),
                code.phase(),
                code.default_message(),
                code.default_help().unwrap_or(""),
            )
        })
        .collect();
    rows.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::new();
    out.push_str("# tmplgen diagnostics catalog\n\n");
    out.push_str("This document is generated from `crates/tmplgen-core/src/diagnostics.rs`.\n\n");
    out.push_str("| Code | Phase | Message | Help |\n");
    out.push_str("| ---- | ----- | ------- | ---- |\n");
    for (code, phase, msg, help) in rows {
        out.push_str(&format!("| {code} | {phase:?} | {msg} | {help} |\n"));
    }
    out
}

fn all_codes() -> &'static [DiagnosticCode] {
    &[
        DiagnosticCode::TG0001UnitNotFound,
        DiagnosticCode::TG0002UnitParse,
        DiagnosticCode::TG0003DuplicateDefinition,
        DiagnosticCode::TG0004ExistingParse,
        DiagnosticCode::TG0101SymbolNotFound,
        DiagnosticCode::TG0102InvalidRename,
        DiagnosticCode::TG0103InvalidParam,
        DiagnosticCode::TG0104ConflictingBinding,
        DiagnosticCode::TG0201InvalidKeepSpec,
        DiagnosticCode::TG0202NotAType,
        DiagnosticCode::TG0203KeepNotFound,
        DiagnosticCode::TG0301RenderFailed,
        DiagnosticCode::TG0302DetectModule,
    ]
}
