use std::collections::BTreeSet;

use anyhow::Result;
use tracing::debug;

use crate::decl::Decl;
use crate::deps::DepGraph;
use crate::diagnostics::{fail, DiagnosticCode};
use crate::merge::Collected;
use crate::rename::RenameMap;
use crate::source::FileId;
use crate::symbols::{SymbolId, SymbolTable};

/// One entry of the keep-list, in output spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepSpec {
    Name(String),
    Method { ty: String, method: String },
}

impl KeepSpec {
    pub fn parse(spec: &str) -> Result<KeepSpec> {
        let parts: Vec<&str> = spec.split('.').collect();
        match parts.as_slice() {
            [name] if !name.is_empty() => Ok(KeepSpec::Name(name.to_string())),
            [ty, method] if !ty.is_empty() && !method.is_empty() => Ok(KeepSpec::Method {
                ty: ty.to_string(),
                method: method.to_string(),
            }),
            _ => fail(
                DiagnosticCode::TG0201InvalidKeepSpec,
                format!("invalid use spec: {spec}"),
            ),
        }
    }
}

pub fn parse_specs(specs: &[String]) -> Result<Vec<KeepSpec>> {
    specs.iter().map(|s| KeepSpec::parse(s)).collect()
}

/// Maps keep-specs to template symbols. Names given in their renamed
/// spelling are looked up under the original name.
pub fn resolve_specs(
    specs: &[KeepSpec],
    symbols: &SymbolTable,
    renames: &RenameMap,
) -> Result<Vec<SymbolId>> {
    let lookup = |spelled: &str| {
        let name = renames.original_name(symbols, spelled).unwrap_or(spelled);
        symbols.lookup(name)
    };
    let mut out = Vec::new();
    for spec in specs {
        match spec {
            KeepSpec::Name(name) => match lookup(name) {
                Some(id) => out.push(id),
                None => {
                    return fail(
                        DiagnosticCode::TG0203KeepNotFound,
                        format!("name not found: {name}"),
                    )
                }
            },
            KeepSpec::Method { ty, method } => {
                let Some(owner) = lookup(ty).filter(|id| symbols.get(*id).kind.is_type()) else {
                    return fail(DiagnosticCode::TG0202NotAType, format!("{ty} is not a type"));
                };
                let entries = symbols.entries_of(owner, method);
                if entries.is_empty() {
                    return fail(
                        DiagnosticCode::TG0203KeepNotFound,
                        format!("method not found: {ty}.{method}"),
                    );
                }
                out.push(owner);
                out.extend(entries);
            }
        }
    }
    Ok(out)
}

/// Drops every template declaration, group entry and impl entry whose symbol
/// is outside the closure of `seeds`. Declarations without a template symbol
/// are user code and stay, as do imports and unnamed items. Symbol-less impl
/// entries from `template_files` follow their impl's anchor.
pub fn filter(
    collected: &mut Collected,
    graph: &DepGraph,
    seeds: impl IntoIterator<Item = SymbolId>,
    template_files: &BTreeSet<FileId>,
) {
    let keep = graph.closure(seeds);
    let kept = |symbol: Option<SymbolId>| symbol.map_or(true, |s| keep.contains(&s));
    let slots = std::mem::take(&mut collected.slots);
    let before = slots.len();
    let mut existing_len = 0;
    for (slot, mut decl) in slots.into_iter().enumerate() {
        let retain = match &mut decl {
            Decl::Type(d) | Decl::Other(d) => kept(d.tag.symbol),
            Decl::Func(f) => kept(f.tag.symbol),
            Decl::Values(g) => {
                g.entries.retain(|e| kept(e.tag.symbol));
                !g.entries.is_empty()
            }
            Decl::Impl(imp) => {
                let anchor_kept = graph.anchor(slot).map_or(true, |a| keep.contains(&a));
                if imp.entries.is_empty() {
                    anchor_kept
                } else {
                    imp.entries.retain(|e| match e.tag.symbol {
                        Some(s) => keep.contains(&s),
                        None => anchor_kept || !template_files.contains(&e.tag.file),
                    });
                    !imp.entries.is_empty()
                }
            }
            Decl::Import(_) | Decl::Unnamed(_) => true,
        };
        if retain {
            if slot < collected.existing_len {
                existing_len += 1;
            }
            collected.slots.push(decl);
        }
    }
    collected.existing_len = existing_len;
    debug!(
        kept = keep.len(),
        dropped = before - collected.slots.len(),
        "filtered by usage closure"
    );
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use quote::ToTokens;

    use super::*;
    use crate::decl::lower_items;
    use crate::merge::collect;
    use crate::resolve::resolve;
    use crate::Diagnostic;

    fn code_of(err: anyhow::Error) -> DiagnosticCode {
        err.downcast_ref::<Diagnostic>().expect("diagnostic").code
    }

    #[test]
    fn specs_have_one_or_two_parts() {
        assert_eq!(KeepSpec::parse("FOO").expect("name"), KeepSpec::Name("FOO".into()));
        assert_eq!(
            KeepSpec::parse("Strings.Foo").expect("method"),
            KeepSpec::Method {
                ty: "Strings".into(),
                method: "Foo".into()
            }
        );
        for bad in ["foo.bar.baz", "", ".x", "x."] {
            let err = KeepSpec::parse(bad).expect_err(bad);
            assert!(err.to_string().contains(&format!("invalid use spec: {bad}")), "{err}");
            assert_eq!(code_of(err), DiagnosticCode::TG0201InvalidKeepSpec);
        }
    }

    #[test]
    fn specs_resolve_through_renames() {
        let file = syn::parse_file(
            "pub struct Ts;\nimpl Ts { pub fn foo(&self) {} }\npub fn Foo() {}\nfn baz() {}\n",
        )
        .expect("parse");
        let mut decls = lower_items(FileId(0), file.items);
        let symbols = SymbolTable::build(&mut decls).expect("symbols");
        let renames: BTreeMap<String, String> = [("Ts", "Strings"), ("Foo", "FOO")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let map = RenameMap::build(&symbols, &BTreeMap::new(), &renames).expect("renames");

        let specs = parse_specs(&["Strings.foo".into(), "FOO".into(), "baz".into()]).expect("specs");
        let ids = resolve_specs(&specs, &symbols, &map).expect("resolve");
        let names: Vec<&str> = ids.iter().map(|id| symbols.get(*id).name.as_str()).collect();
        assert_eq!(names, ["Ts", "foo", "Foo", "baz"]);

        let specs = parse_specs(&["QWERTY.Foo".into()]).expect("specs");
        let err = resolve_specs(&specs, &symbols, &map).expect_err("not a type");
        assert_eq!(err.to_string(), "TG0202 Keep: QWERTY is not a type");

        let specs = parse_specs(&["baz.x".into()]).expect("specs");
        let err = resolve_specs(&specs, &symbols, &map).expect_err("not a type");
        assert_eq!(code_of(err), DiagnosticCode::TG0202NotAType);

        let specs = parse_specs(&["Strings.nope".into()]).expect("specs");
        let err = resolve_specs(&specs, &symbols, &map).expect_err("missing method");
        assert_eq!(code_of(err), DiagnosticCode::TG0203KeepNotFound);
    }

    #[test]
    fn filter_drops_unreachable_template_declarations() {
        let existing = lower_items(
            FileId(1),
            syn::parse_file("fn mine() {}\n").expect("existing").items,
        );
        let file = syn::parse_file(
            "fn a() { b() }\nfn b() {}\nfn d() {}\n\
             thread_local! { static X: u8 = 0; static Y: u8 = 1; }\n\
             fn uses_y() -> u8 { Y.with(|y| *y) }\n",
        )
        .expect("parse");
        let mut decls = lower_items(FileId(0), file.items);
        let symbols = SymbolTable::build(&mut decls).expect("symbols");
        let resolution = resolve(&decls, &symbols);

        let mut collected = collect(existing, decls);
        let graph = DepGraph::build(&collected.slots, &resolution, &symbols);
        let seeds = [symbols.lookup("a"), symbols.lookup("uses_y")];
        filter(&mut collected, &graph, seeds.into_iter().flatten(), &[FileId(0)].into());

        let names: Vec<String> = collected
            .slots
            .iter()
            .flat_map(|d| match d {
                Decl::Func(f) => vec![f.item.sig.ident.to_string()],
                Decl::Values(g) => g.entries.iter().map(|e| e.ident.to_string()).collect(),
                _ => Vec::new(),
            })
            .collect();
        assert_eq!(names, ["mine", "a", "b", "Y", "uses_y"]);
    }

    #[test]
    fn merged_template_declarations_are_filtered_too() {
        let file = syn::parse_file(
            "struct Ts;\nimpl Ts { fn keep(&self) {} fn drop(&self) {} }\nfn a() { Ts.keep() }\nfn d() {}\n",
        )
        .expect("parse");
        let mut decls = lower_items(FileId(0), file.items);
        let symbols = SymbolTable::build(&mut decls).expect("symbols");
        let resolution = resolve(&decls, &symbols);
        let existing = lower_items(
            FileId(1),
            syn::parse_file(
                "fn d() {}\nimpl Ts { fn mine(&self) {} fn drop(&self) {} }\nfn user() {}\n",
            )
            .expect("existing")
            .items,
        );

        let mut collected = collect(existing, decls);
        let graph = DepGraph::build(&collected.slots, &resolution, &symbols);
        let seeds = symbols.lookup("a");
        filter(&mut collected, &graph, seeds, &[FileId(0)].into());

        let out: Vec<String> = collected
            .slots
            .into_iter()
            .flat_map(Decl::into_items)
            .map(|item| item.to_token_stream().to_string())
            .collect();
        assert_eq!(out.len(), 4, "{out:?}");
        assert!(out[0].starts_with("impl Ts"), "{out:?}");
        assert!(out[0].contains("fn mine"), "{out:?}");
        assert!(out[0].contains("fn keep"), "{out:?}");
        assert!(!out[0].contains("fn drop"), "{out:?}");
        assert!(out[1].contains("fn user"), "{out:?}");
        assert!(out[2].starts_with("struct Ts"), "{out:?}");
        assert!(out[3].contains("fn a"), "{out:?}");
    }
}
