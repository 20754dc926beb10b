use std::collections::BTreeMap;

use anyhow::Result;
use proc_macro2::Ident;
use syn::{Item, Type, UseTree};

use crate::decl::{Decl, ValueKind};
use crate::diagnostics::{fail, DiagnosticCode};
use crate::source::{FileId, Pos};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Struct,
    Enum,
    Union,
    TypeAlias,
    Trait,
    Func,
    Const,
    Static,
    ThreadLocal,
    Macro,
    Module,
    ExternCrate,
    Import,
    ImplEntry {
        owner: Option<SymbolId>,
        trait_name: Option<String>,
    },
}

impl SymbolKind {
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            SymbolKind::Struct
                | SymbolKind::Enum
                | SymbolKind::Union
                | SymbolKind::TypeAlias
                | SymbolKind::Trait
        )
    }

    pub fn is_value(&self) -> bool {
        matches!(
            self,
            SymbolKind::Const | SymbolKind::Static | SymbolKind::ThreadLocal
        )
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub def: Pos,
    /// Declared type of a const/static, used to quote textual parameter values.
    pub value_ty: Option<Type>,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scope: BTreeMap<String, SymbolId>,
    imports: BTreeMap<(FileId, String), SymbolId>,
    entries: BTreeMap<String, Vec<SymbolId>>,
}

impl SymbolTable {
    /// Defines every top-level name of the unit and tags the declarations with
    /// their symbols. Impl entries are defined after all types so owners resolve.
    pub fn build(decls: &mut [Decl]) -> Result<SymbolTable> {
        let mut table = SymbolTable::default();
        for decl in decls.iter_mut() {
            match decl {
                Decl::Type(d) => {
                    let Some(ident) = d.ident().cloned() else {
                        continue;
                    };
                    let kind = match &d.item {
                        Item::Struct(_) => SymbolKind::Struct,
                        Item::Enum(_) => SymbolKind::Enum,
                        Item::Union(_) => SymbolKind::Union,
                        Item::Trait(_) => SymbolKind::Trait,
                        _ => SymbolKind::TypeAlias,
                    };
                    d.tag.symbol = Some(table.define(d.tag.file, &ident, kind, None)?);
                }
                Decl::Values(g) => {
                    let kind = match g.kind {
                        ValueKind::Const => SymbolKind::Const,
                        ValueKind::Static => SymbolKind::Static,
                        ValueKind::ThreadLocal(_) => SymbolKind::ThreadLocal,
                    };
                    for entry in &mut g.entries {
                        let ty = Some((*entry.ty).clone());
                        entry.tag.symbol =
                            Some(table.define(entry.tag.file, &entry.ident, kind.clone(), ty)?);
                    }
                }
                Decl::Func(f) => {
                    let ident = f.item.sig.ident.clone();
                    f.tag.symbol = Some(table.define(f.tag.file, &ident, SymbolKind::Func, None)?);
                }
                Decl::Other(d) => {
                    let Some(ident) = d.ident().cloned() else {
                        continue;
                    };
                    let kind = match &d.item {
                        Item::Macro(_) => SymbolKind::Macro,
                        Item::ExternCrate(_) => SymbolKind::ExternCrate,
                        Item::TraitAlias(_) => SymbolKind::Trait,
                        _ => SymbolKind::Module,
                    };
                    d.tag.symbol = Some(table.define(d.tag.file, &ident, kind, None)?);
                }
                Decl::Import(u) => {
                    let mut bound = Vec::new();
                    import_bindings(&u.item.tree, None, &mut bound);
                    for (name, ident) in bound {
                        table.define_import(u.file, name, ident);
                    }
                }
                Decl::Impl(_) | Decl::Unnamed(_) => {}
            }
        }

        for decl in decls.iter_mut() {
            let Decl::Impl(imp) = decl else {
                continue;
            };
            let owner = imp
                .self_name()
                .and_then(|name| table.lookup(&name))
                .filter(|id| table.get(*id).kind.is_type());
            let trait_name = imp.trait_name();
            for entry in &mut imp.entries {
                let Some(ident) = entry.ident().cloned() else {
                    continue;
                };
                let id = table.push(
                    entry.tag.file,
                    ident.to_string(),
                    &ident,
                    SymbolKind::ImplEntry {
                        owner,
                        trait_name: trait_name.clone(),
                    },
                    None,
                );
                table.entries.entry(ident.to_string()).or_default().push(id);
                entry.tag.symbol = Some(id);
            }
        }
        Ok(table)
    }

    fn push(
        &mut self,
        file: FileId,
        name: String,
        ident: &Ident,
        kind: SymbolKind,
        value_ty: Option<Type>,
    ) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            id,
            name,
            kind,
            def: Pos::of(file, ident),
            value_ty,
        });
        id
    }

    fn define(
        &mut self,
        file: FileId,
        ident: &Ident,
        kind: SymbolKind,
        value_ty: Option<Type>,
    ) -> Result<SymbolId> {
        let name = ident.to_string();
        if self.scope.contains_key(&name) {
            return fail(
                DiagnosticCode::TG0003DuplicateDefinition,
                format!("duplicate definition of `{name}`"),
            );
        }
        let id = self.push(file, name.clone(), ident, kind, value_ty);
        self.scope.insert(name, id);
        Ok(id)
    }

    fn define_import(&mut self, file: FileId, name: String, ident: &Ident) {
        let key = (file, name.clone());
        if self.imports.contains_key(&key) {
            return;
        }
        let id = self.push(file, name, ident, SymbolKind::Import, None);
        self.imports.insert(key, id);
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Unit-scope lookup; imports are file-scoped and not found here.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.scope.get(name).copied()
    }

    /// Lookup as seen from inside `file`: unit scope first, then that file's imports.
    pub fn lookup_in_file(&self, file: FileId, name: &str) -> Option<SymbolId> {
        self.lookup(name)
            .or_else(|| self.imports.get(&(file, name.to_string())).copied())
    }

    /// Every symbol a binding key can address: the unit-scope symbol, or else
    /// each file's import of that name.
    pub fn lookup_all(&self, name: &str) -> Vec<SymbolId> {
        if let Some(id) = self.lookup(name) {
            return vec![id];
        }
        self.imports
            .iter()
            .filter(|((_, n), _)| n == name)
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn entries_named(&self, name: &str) -> &[SymbolId] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entries_of(&self, owner: SymbolId, name: &str) -> Vec<SymbolId> {
        self.entries_named(name)
            .iter()
            .copied()
            .filter(|id| {
                matches!(
                    &self.get(*id).kind,
                    SymbolKind::ImplEntry { owner: Some(o), .. } if *o == owner
                )
            })
            .collect()
    }
}

/// Names a `use` tree binds, with the token that binds each. A `self` leaf
/// binds its parent segment's name.
pub(crate) fn import_bindings<'a>(
    tree: &'a UseTree,
    parent: Option<&'a Ident>,
    out: &mut Vec<(String, &'a Ident)>,
) {
    match tree {
        UseTree::Path(p) => import_bindings(&p.tree, Some(&p.ident), out),
        UseTree::Name(n) if n.ident == "self" => {
            if let Some(parent) = parent {
                out.push((parent.to_string(), &n.ident));
            }
        }
        UseTree::Name(n) => out.push((n.ident.to_string(), &n.ident)),
        UseTree::Rename(r) if r.rename != "_" => out.push((r.rename.to_string(), &r.rename)),
        UseTree::Group(g) => {
            for item in &g.items {
                import_bindings(item, parent, out);
            }
        }
        UseTree::Rename(_) | UseTree::Glob(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::lower_items;

    fn table(src: &str) -> Result<SymbolTable> {
        let file = syn::parse_file(src).expect("parse");
        let mut decls = lower_items(FileId(0), file.items);
        SymbolTable::build(&mut decls)
    }

    #[test]
    fn methods_are_owned_by_template_types() {
        let t = table("struct Ts;\nimpl Ts { fn foo(&self) {} }\nimpl Other { fn foo(&self) {} }\n")
            .expect("table");
        let ts = t.lookup("Ts").expect("Ts");
        assert_eq!(t.entries_named("foo").len(), 2);
        assert_eq!(t.entries_of(ts, "foo").len(), 1);
    }

    #[test]
    fn duplicate_top_level_names_fail() {
        let err = table("struct A;\nfn A() {}\n").expect_err("duplicate");
        let diag = err
            .downcast_ref::<crate::Diagnostic>()
            .expect("diagnostic");
        assert_eq!(diag.code, DiagnosticCode::TG0003DuplicateDefinition);
    }

    #[test]
    fn imports_are_file_scoped() {
        let t = table("use std::fmt::{self, Write as _};\n").expect("table");
        assert_eq!(t.lookup("fmt"), None);
        assert!(t.lookup_in_file(FileId(0), "fmt").is_some());
        assert_eq!(t.lookup_all("fmt").len(), 1);
        assert!(t.lookup_all("_").is_empty());
    }
}
