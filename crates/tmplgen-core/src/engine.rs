use std::collections::BTreeSet;
use std::io::Write;

use anyhow::{Context, Result};
use quote::ToTokens;
use syn::Attribute;
use tracing::{debug, info};

use crate::config::Config;
use crate::deps::DepGraph;
use crate::emit::{emit, infer_module_name, EmitOptions};
use crate::keep::{self, parse_specs, resolve_specs};
use crate::load::{load_existing, load_unit, Unit};
use crate::merge::collect;
use crate::rename::{self, RenameMap};
use crate::source::SourceMap;
use crate::strip::strip_params;

/// Runs one instantiation and writes the result to `out`. Nothing is written
/// when any stage fails.
pub fn instantiate(config: &Config, out: &mut dyn Write) -> Result<()> {
    let text = instantiate_to_string(config)?;
    out.write_all(text.as_bytes()).context("write output")?;
    out.flush().context("flush output")?;
    Ok(())
}

pub fn instantiate_to_string(config: &Config) -> Result<String> {
    let specs = parse_specs(&config.uses)?;

    let mut sources = SourceMap::default();
    let unit = load_unit(&config.from, &mut sources)
        .with_context(|| format!("load template {}", config.from.display()))?;
    let existing = load_existing(&config.existing, &mut sources)?;
    let renames = RenameMap::build(&unit.symbols, &config.params, &config.renames)?;
    let seeds = resolve_specs(&specs, &unit.symbols, &renames)?;

    let Unit {
        files,
        inner_attrs,
        mut decls,
        symbols,
        resolution,
        digest,
    } = unit;
    strip_params(&mut decls, &config.params);
    rename::apply(&mut decls, &resolution, &renames);
    debug!(bindings = renames.len(), "renamed template declarations");

    let mut collected = collect(existing.decls, decls);
    if !specs.is_empty() {
        let graph = DepGraph::build(&collected.slots, &resolution, &symbols);
        let template_files: BTreeSet<_> = files.into_iter().collect();
        keep::filter(&mut collected, &graph, seeds, &template_files);
    }

    let module = match (&config.module, &config.output_path) {
        (Some(_), _) => config.module_name().map(str::to_string),
        (None, Some(path)) => Some(infer_module_name(path)?),
        (None, None) => None,
    };
    let inner_attrs = union_attrs(existing.inner_attrs, inner_attrs);
    let from = config.from.display().to_string();
    let slots = collected.slots.len();
    let text = emit(
        collected.slots,
        &EmitOptions {
            module: module.as_deref(),
            from: &from,
            digest: &digest,
            inner_attrs: &inner_attrs,
        },
    )?;
    info!(
        from = %from,
        module = module.as_deref().unwrap_or(""),
        declarations = slots,
        "instantiated template"
    );
    Ok(text)
}

/// Existing inner attributes first, then template ones not already present.
fn union_attrs(existing: Vec<Attribute>, template: Vec<Attribute>) -> Vec<Attribute> {
    let mut seen = BTreeSet::new();
    existing
        .into_iter()
        .chain(template)
        .filter(|attr| seen.insert(attr.to_token_stream().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_write_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t.rs");
        std::fs::write(&path, "pub struct Ts;\n").expect("write");
        let mut out = Vec::new();
        let err = instantiate(&Config::new(&path).keep("a.b.c"), &mut out).expect_err("bad spec");
        assert!(err.to_string().contains("invalid use spec: a.b.c"), "{err}");
        assert!(out.is_empty());
    }

    #[test]
    fn inner_attributes_are_unioned() {
        let file = syn::parse_file("#![allow(dead_code)]\n#![allow(unused)]\n").expect("parse");
        let other = syn::parse_file("#![allow(unused)]\n#![deny(missing_docs)]\n").expect("parse");
        let attrs = union_attrs(file.attrs, other.attrs);
        let text: Vec<String> = attrs
            .iter()
            .map(|a| a.to_token_stream().to_string())
            .collect();
        assert_eq!(text.len(), 3, "{text:?}");
        assert!(text[0].contains("dead_code"), "{text:?}");
        assert!(text[1].contains("unused"), "{text:?}");
        assert!(text[2].contains("missing_docs"), "{text:?}");
    }
}
