use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use syn::Attribute;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::SourceText;
use crate::decl::{lower_items, Decl};
use crate::diagnostics::{fail, DiagnosticCode};
use crate::resolve::{resolve, Resolution};
use crate::source::{describe_syn_error, FileId, SourceMap};
use crate::symbols::SymbolTable;
use crate::util::sha256_hex_sources;

/// A parsed and resolved template unit.
#[derive(Debug)]
pub struct Unit {
    pub files: Vec<FileId>,
    /// Non-doc inner attributes of every file, in file order.
    pub inner_attrs: Vec<Attribute>,
    pub decls: Vec<Decl>,
    pub symbols: SymbolTable,
    pub resolution: Resolution,
    pub digest: String,
}

/// Previously generated output, lowered but not resolved.
#[derive(Debug, Default)]
pub struct Existing {
    pub inner_attrs: Vec<Attribute>,
    pub decls: Vec<Decl>,
}

pub fn load_unit(from: &Path, sources: &mut SourceMap) -> Result<Unit> {
    let paths = unit_files(from)?;
    let mut files = Vec::new();
    let mut inner_attrs = Vec::new();
    let mut decls = Vec::new();
    for path in &paths {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read template source {}", path.display()))?;
        let name = path.display().to_string();
        let id = sources.add(name.clone(), text);
        let file = match sources.parse(id) {
            Ok(file) => file,
            Err(err) => {
                return fail(
                    DiagnosticCode::TG0002UnitParse,
                    describe_syn_error(&name, &err),
                )
            }
        };
        inner_attrs.extend(file.attrs.into_iter().filter(|a| !a.path().is_ident("doc")));
        decls.extend(lower_items(id, file.items));
        files.push(id);
    }

    let digest = sha256_hex_sources(files.iter().map(|id| {
        let f = sources.get(*id);
        (f.name.as_str(), f.text.as_str())
    }));
    let symbols = SymbolTable::build(&mut decls)?;
    let resolution = resolve(&decls, &symbols);
    debug!(
        files = files.len(),
        decls = decls.len(),
        symbols = symbols.len(),
        occurrences = resolution.len(),
        "loaded template unit"
    );
    Ok(Unit {
        files,
        inner_attrs,
        decls,
        symbols,
        resolution,
        digest,
    })
}

pub fn load_existing(existing: &[SourceText], sources: &mut SourceMap) -> Result<Existing> {
    let mut out = Existing::default();
    for source in existing {
        let id = sources.add(source.name.clone(), source.text.clone());
        let file = match sources.parse(id) {
            Ok(file) => file,
            Err(err) => {
                return fail(
                    DiagnosticCode::TG0004ExistingParse,
                    describe_syn_error(&source.name, &err),
                )
            }
        };
        out.inner_attrs
            .extend(file.attrs.into_iter().filter(|a| !a.path().is_ident("doc")));
        out.decls.extend(lower_items(id, file.items));
    }
    debug!(decls = out.decls.len(), "loaded existing declarations");
    Ok(out)
}

fn unit_files(from: &Path) -> Result<Vec<PathBuf>> {
    if from.is_file() {
        return Ok(vec![from.to_path_buf()]);
    }
    if !from.is_dir() {
        return fail(
            DiagnosticCode::TG0001UnitNotFound,
            format!("template unit not found: {}", from.display()),
        );
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(from).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("list {}", from.display()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "rs") {
            paths.push(path.to_path_buf());
        }
    }
    paths.sort();
    if paths.is_empty() {
        return fail(
            DiagnosticCode::TG0001UnitNotFound,
            format!("no Rust sources in template unit {}", from.display()),
        );
    }
    Ok(paths)
}
