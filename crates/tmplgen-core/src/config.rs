use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A previously generated (or hand-written) source fed back in for merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceText {
    pub name: String,
    pub text: String,
}

/// One instantiation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Template unit: a `.rs` file or a directory of `.rs` files.
    pub from: PathBuf,
    /// Placeholder name to concrete type or literal spelling.
    pub params: BTreeMap<String, String>,
    /// Template name to new identifier.
    pub renames: BTreeMap<String, String>,
    pub existing: Vec<SourceText>,
    /// Keep-specs (`Name` or `Type.Method`); empty keeps everything.
    pub uses: Vec<String>,
    /// Module name of a complete output unit; `None` or empty emits bare declarations.
    pub module: Option<String>,
    pub output_path: Option<PathBuf>,
}

impl Config {
    pub fn new(from: impl Into<PathBuf>) -> Self {
        Config {
            from: from.into(),
            ..Config::default()
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn rename(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.renames.insert(name.into(), value.into());
        self
    }

    pub fn keep(mut self, spec: impl Into<String>) -> Self {
        self.uses.push(spec.into());
        self
    }

    pub fn module(mut self, name: impl Into<String>) -> Self {
        self.module = Some(name.into());
        self
    }

    pub fn existing(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.existing.push(SourceText {
            name: name.into(),
            text: text.into(),
        });
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub(crate) fn module_name(&self) -> Option<&str> {
        self.module.as_deref().filter(|m| !m.is_empty())
    }
}
