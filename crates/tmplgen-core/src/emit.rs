use std::path::Path;

use anyhow::{Context, Result};
use proc_macro2::Ident;
use syn::{Attribute, Item};
use tracing::debug;

use crate::decl::Decl;
use crate::diagnostics::{fail, DiagnosticCode};
use crate::imports::normalize;

#[derive(Debug, Clone, Copy)]
pub struct EmitOptions<'a> {
    /// Set for a complete unit; `None` emits the bare declaration sequence.
    pub module: Option<&'a str>,
    pub from: &'a str,
    pub digest: &'a str,
    pub inner_attrs: &'a [Attribute],
}

/// Renders the collected slots: imports first, then one chunk per
/// declaration separated by a blank line.
pub fn emit(slots: Vec<Decl>, opts: &EmitOptions<'_>) -> Result<String> {
    let mut imports = Vec::new();
    let mut items = Vec::new();
    for decl in slots {
        match decl {
            Decl::Import(u) => imports.push(u.item),
            other => items.extend(other.into_items()),
        }
    }

    let mut sections = Vec::new();
    if let Some(module) = opts.module {
        imports = normalize(imports, &items)?;
        let mut header = format!(
            "// Code generated by tmplgen from `{}` for module `{module}`.\n// Template digest: sha256:{}\n",
            opts.from, opts.digest
        );
        if !opts.inner_attrs.is_empty() {
            header.push('\n');
            header.push_str(&render(opts.inner_attrs.to_vec(), Vec::new()));
        }
        sections.push(header);
    }
    if !imports.is_empty() {
        sections.push(render(Vec::new(), imports.into_iter().map(Item::Use).collect()));
    }
    let chunks: Vec<String> = items.into_iter().map(|item| render(Vec::new(), vec![item])).collect();
    if !chunks.is_empty() {
        sections.push(chunks.join("\n"));
    }
    let out = sections.join("\n");

    if let Err(err) = syn::parse_file(&out) {
        return fail(
            DiagnosticCode::TG0301RenderFailed,
            format!("generated output does not parse: {err}"),
        );
    }
    debug!(bytes = out.len(), complete = opts.module.is_some(), "emitted output");
    Ok(out)
}

fn render(attrs: Vec<Attribute>, items: Vec<Item>) -> String {
    prettyplease::unparse(&syn::File {
        shebang: None,
        attrs,
        items,
    })
}

/// Module name for an output path: the file stem, the directory for
/// `mod.rs`, and the crate name for `lib.rs` and `main.rs`.
pub fn infer_module_name(path: &Path) -> Result<String> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !dir.is_dir() {
        return fail(
            DiagnosticCode::TG0302DetectModule,
            format!("output directory does not exist: {}", dir.display()),
        );
    }
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return fail(
            DiagnosticCode::TG0302DetectModule,
            format!("cannot derive a module name from {}", path.display()),
        );
    };
    let raw = match stem {
        "mod" => dir_name(dir)?,
        "lib" | "main" => match crate_name(dir)? {
            Some(name) => name,
            None => dir_name(dir)?,
        },
        other => other.to_string(),
    };
    let name = raw.replace('-', "_");
    if syn::parse_str::<Ident>(&name).is_err() {
        return fail(
            DiagnosticCode::TG0302DetectModule,
            format!("`{name}` is not a valid module name"),
        );
    }
    Ok(name)
}

fn dir_name(dir: &Path) -> Result<String> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("canonicalize {}", dir.display()))?;
    match dir.file_name().and_then(|n| n.to_str()) {
        Some(name) => Ok(name.to_string()),
        None => fail(
            DiagnosticCode::TG0302DetectModule,
            format!("cannot derive a module name from {}", dir.display()),
        ),
    }
}

/// `package.name` of the nearest `Cargo.toml` that declares one.
fn crate_name(dir: &Path) -> Result<Option<String>> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("canonicalize {}", dir.display()))?;
    for ancestor in dir.ancestors() {
        let manifest = ancestor.join("Cargo.toml");
        if !manifest.is_file() {
            continue;
        }
        let text = std::fs::read_to_string(&manifest)
            .with_context(|| format!("read {}", manifest.display()))?;
        let table: toml::Table = text
            .parse()
            .with_context(|| format!("parse {}", manifest.display()))?;
        let name = table
            .get("package")
            .and_then(|p| p.get("name"))
            .and_then(|n| n.as_str());
        if let Some(name) = name {
            return Ok(Some(name.to_string()));
        }
    }
    Ok(None)
}
