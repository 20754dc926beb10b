use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use quote::ToTokens;
use syn::Attribute;
use tracing::debug;

use crate::decl::{item_attrs_mut, Decl, ImplDecl, ImplEntry, ImportDecl, ItemDecl};
use crate::imports::{flatten, leaf_key, prune};

/// Stable name of a declaration, or of one entry of a group or impl block.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeclKey {
    Type(String),
    Value(String),
    Func(String),
    Other(String),
    Entry {
        owner: String,
        trait_name: Option<String>,
        name: String,
    },
    /// A whole impl block, by self type and trait.
    Impl {
        owner: String,
        trait_name: Option<String>,
    },
}

impl fmt::Display for DeclKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclKey::Type(n) | DeclKey::Value(n) | DeclKey::Func(n) | DeclKey::Other(n) => {
                f.write_str(n)
            }
            DeclKey::Entry {
                owner,
                trait_name: None,
                name,
            } => write!(f, "{owner}.{name}"),
            DeclKey::Entry {
                owner,
                trait_name: Some(t),
                name,
            } => write!(f, "<{owner} as {t}>.{name}"),
            DeclKey::Impl {
                owner,
                trait_name: None,
            } => write!(f, "impl {owner}"),
            DeclKey::Impl {
                owner,
                trait_name: Some(t),
            } => write!(f, "impl {t} for {owner}"),
        }
    }
}

/// Address of an overwritable slot: a declaration, or one of its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
    pub slot: usize,
    pub entry: Option<usize>,
}

/// Index of existing declarations by key, plus the text-keyed sets used to
/// drop duplicate imports, unnamed items and impl-level macro calls.
#[derive(Debug, Default)]
pub struct Registry {
    keys: BTreeMap<DeclKey, SlotRef>,
    import_leaves: BTreeSet<String>,
    unnamed: BTreeSet<String>,
    impl_macros: BTreeSet<(Option<String>, Option<String>, String)>,
}

impl Registry {
    pub fn index(slots: &[Decl]) -> Registry {
        let mut registry = Registry::default();
        for (slot, decl) in slots.iter().enumerate() {
            registry.add(slot, decl);
        }
        registry
    }

    fn insert(&mut self, key: DeclKey, slot: usize, entry: Option<usize>) {
        self.keys.entry(key).or_insert(SlotRef { slot, entry });
    }

    fn add(&mut self, slot: usize, decl: &Decl) {
        match decl {
            Decl::Type(d) => {
                if let Some(name) = d.name() {
                    self.insert(DeclKey::Type(name), slot, None);
                }
            }
            Decl::Other(d) => {
                if let Some(name) = d.name() {
                    self.insert(DeclKey::Other(name), slot, None);
                }
            }
            Decl::Func(f) => self.insert(DeclKey::Func(f.item.sig.ident.to_string()), slot, None),
            Decl::Values(g) => {
                for (idx, entry) in g.entries.iter().enumerate() {
                    self.insert(DeclKey::Value(entry.ident.to_string()), slot, Some(idx));
                }
            }
            Decl::Impl(imp) => {
                let owner = imp.self_name();
                let trait_name = imp.trait_name();
                if let Some(owner) = &owner {
                    self.insert(
                        DeclKey::Impl {
                            owner: owner.clone(),
                            trait_name: trait_name.clone(),
                        },
                        slot,
                        None,
                    );
                }
                for (idx, entry) in imp.entries.iter().enumerate() {
                    match (&owner, entry.ident()) {
                        (Some(owner), Some(name)) => self.insert(
                            DeclKey::Entry {
                                owner: owner.clone(),
                                trait_name: trait_name.clone(),
                                name: name.to_string(),
                            },
                            slot,
                            Some(idx),
                        ),
                        (_, None) => {
                            self.impl_macros.insert((
                                owner.clone(),
                                trait_name.clone(),
                                entry_text(entry),
                            ));
                        }
                        (None, Some(_)) => {}
                    }
                }
            }
            Decl::Import(u) => {
                for leaf in flatten(&u.item) {
                    self.import_leaves.insert(leaf_key(&u.item.vis, &leaf));
                }
            }
            Decl::Unnamed(u) => {
                self.unnamed.insert(u.text());
            }
        }
    }

    pub fn lookup(&self, key: &DeclKey) -> Option<SlotRef> {
        self.keys.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Output slots: the existing declarations in their original order, followed
/// by the appended template declarations.
#[derive(Debug)]
pub struct Collected {
    pub slots: Vec<Decl>,
    pub existing_len: usize,
}

/// Folds template declarations into the existing ones: a matching key
/// overwrites its slot in place, anything else is appended.
pub fn collect(existing: Vec<Decl>, template: Vec<Decl>) -> Collected {
    let mut registry = Registry::index(&existing);
    let existing_len = existing.len();
    let mut slots = existing;
    let mut merged = 0usize;

    for decl in template {
        match decl {
            Decl::Type(d) => match d.name().and_then(|n| registry.lookup(&DeclKey::Type(n))) {
                Some(at) => {
                    overwrite_item(&mut slots[at.slot], d, Decl::Type);
                    merged += 1;
                }
                None => slots.push(Decl::Type(d)),
            },
            Decl::Other(d) => match d.name().and_then(|n| registry.lookup(&DeclKey::Other(n))) {
                Some(at) => {
                    overwrite_item(&mut slots[at.slot], d, Decl::Other);
                    merged += 1;
                }
                None => slots.push(Decl::Other(d)),
            },
            Decl::Func(mut f) => {
                match registry.lookup(&DeclKey::Func(f.item.sig.ident.to_string())) {
                    Some(at) => {
                        if let Decl::Func(old) = &slots[at.slot] {
                            adopt_docs(docs_of(&old.item.attrs), &mut f.item.attrs);
                        }
                        slots[at.slot] = Decl::Func(f);
                        merged += 1;
                    }
                    None => slots.push(Decl::Func(f)),
                }
            }
            Decl::Values(mut g) => {
                let mut fresh = Vec::new();
                for mut entry in std::mem::take(&mut g.entries) {
                    let at = registry.lookup(&DeclKey::Value(entry.ident.to_string()));
                    let target = at.and_then(|at| match &mut slots[at.slot] {
                        Decl::Values(old) => at.entry.and_then(|i| old.entries.get_mut(i)),
                        _ => None,
                    });
                    match target {
                        Some(old) => {
                            adopt_docs(docs_of(&old.attrs), &mut entry.attrs);
                            *old = entry;
                            merged += 1;
                        }
                        None => fresh.push(entry),
                    }
                }
                if !fresh.is_empty() {
                    g.entries = fresh;
                    slots.push(Decl::Values(g));
                }
            }
            Decl::Impl(mut imp) => {
                let owner = imp.self_name();
                let trait_name = imp.trait_name();
                let was_empty = imp.entries.is_empty();
                let block = owner.clone().and_then(|owner| {
                    registry.lookup(&DeclKey::Impl {
                        owner,
                        trait_name: trait_name.clone(),
                    })
                });
                let mut touched: BTreeSet<usize> = block.iter().map(|at| at.slot).collect();
                let mut fresh = Vec::new();
                for mut entry in std::mem::take(&mut imp.entries) {
                    let Some(name) = entry.ident().map(|i| i.to_string()) else {
                        let key = (owner.clone(), trait_name.clone(), entry_text(&entry));
                        if registry.impl_macros.insert(key) {
                            fresh.push(entry);
                        }
                        continue;
                    };
                    let at = owner.clone().and_then(|owner| {
                        registry.lookup(&DeclKey::Entry {
                            owner,
                            trait_name: trait_name.clone(),
                            name,
                        })
                    });
                    let target = at.and_then(|at| match &mut slots[at.slot] {
                        Decl::Impl(old) => at.entry.and_then(|i| old.entries.get_mut(i)),
                        _ => None,
                    });
                    match target {
                        Some(old) => {
                            let docs = old.attrs_mut().map(|a| docs_of(a)).unwrap_or_default();
                            if let Some(attrs) = entry.attrs_mut() {
                                adopt_docs(docs, attrs);
                            }
                            *old = entry;
                            touched.extend(at.map(|at| at.slot));
                            merged += 1;
                        }
                        None => fresh.push(entry),
                    }
                }
                for slot in touched {
                    adopt_header(&mut slots[slot], &imp);
                }
                match block {
                    Some(at) => {
                        if let Decl::Impl(old) = &mut slots[at.slot] {
                            old.entries.extend(fresh);
                        }
                        if was_empty {
                            merged += 1;
                        }
                    }
                    None if was_empty || !fresh.is_empty() => {
                        imp.entries = fresh;
                        slots.push(Decl::Impl(imp));
                    }
                    None => {}
                }
            }
            Decl::Import(u) => {
                let vis = u.item.vis.clone();
                let mut fresh_keys = Vec::new();
                let pruned = prune(u.item, &mut |leaf| {
                    let key = leaf_key(&vis, leaf);
                    if registry.import_leaves.contains(&key) {
                        return false;
                    }
                    fresh_keys.push(key);
                    true
                });
                registry.import_leaves.extend(fresh_keys);
                if let Some(item) = pruned {
                    slots.push(Decl::Import(ImportDecl { item, file: u.file }));
                }
            }
            Decl::Unnamed(u) => {
                if registry.unnamed.insert(u.text()) {
                    slots.push(Decl::Unnamed(u));
                } else {
                    debug!("dropped duplicate unnamed declaration");
                }
            }
        }
    }

    debug!(
        existing = existing_len,
        merged,
        appended = slots.len() - existing_len,
        "collected declarations"
    );
    Collected {
        slots,
        existing_len,
    }
}

fn overwrite_item(slot: &mut Decl, mut incoming: ItemDecl, wrap: fn(ItemDecl) -> Decl) {
    if let Decl::Type(old) | Decl::Other(old) = slot {
        let docs = item_attrs_mut(&mut old.item)
            .map(|a| docs_of(a))
            .unwrap_or_default();
        if let Some(attrs) = item_attrs_mut(&mut incoming.item) {
            adopt_docs(docs, attrs);
        }
    }
    *slot = wrap(incoming);
}

/// A template impl landing in an existing block brings its header along.
fn adopt_header(slot: &mut Decl, incoming: &ImplDecl) {
    if let Decl::Impl(old) = slot {
        let mut header = incoming.header.clone();
        adopt_docs(docs_of(&old.header.attrs), &mut header.attrs);
        old.header = header;
        old.file = incoming.file;
    }
}

fn entry_text(entry: &ImplEntry) -> String {
    entry.item.to_token_stream().to_string()
}

fn is_doc(attr: &Attribute) -> bool {
    attr.path().is_ident("doc")
}

fn docs_of(attrs: &[Attribute]) -> Vec<Attribute> {
    attrs.iter().filter(|a| is_doc(a)).cloned().collect()
}

/// Existing documentation wins; without any, the template's stays.
fn adopt_docs(existing_docs: Vec<Attribute>, attrs: &mut Vec<Attribute>) {
    if existing_docs.is_empty() {
        return;
    }
    attrs.retain(|a| !is_doc(a));
    attrs.splice(0..0, existing_docs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::lower_items;
    use crate::source::FileId;

    fn decls(file: u32, src: &str) -> Vec<Decl> {
        let parsed = syn::parse_file(src).expect("parse");
        lower_items(FileId(file), parsed.items)
    }

    fn render(slots: Vec<Decl>) -> String {
        let items = slots.into_iter().flat_map(Decl::into_items).collect();
        prettyplease::unparse(&syn::File {
            shebang: None,
            attrs: Vec::new(),
            items,
        })
    }

    #[test]
    fn matched_keys_overwrite_in_place() {
        let existing = decls(
            0,
            "fn user() {}\n/// Kept docs.\npub fn foo() -> u8 { 1 }\nstruct Ts;\nimpl Ts { fn a(&self) -> u8 { 0 } }\n",
        );
        let template = decls(
            1,
            "/// Template docs.\npub fn foo() -> u8 { 2 }\nimpl Ts { fn a(&self) -> u8 { 9 } fn b(&self) {} }\nfn bar() {}\n",
        );
        let collected = collect(existing, template);
        assert_eq!(collected.existing_len, 4);
        assert_eq!(collected.slots.len(), 5);
        let out = render(collected.slots);
        assert_eq!(out.matches("impl Ts").count(), 1, "{out}");
        assert!(out.contains("fn b(&self)"), "{out}");
        assert!(out.contains("/// Kept docs."), "{out}");
        assert!(!out.contains("Template docs"), "{out}");
        assert!(out.contains("-> u8 {\n    2\n}"), "{out}");
        assert!(out.contains("fn a(&self) -> u8 {\n        9\n    }"), "{out}");
        let user = out.find("fn user").expect("user");
        let foo = out.find("pub fn foo").expect("foo");
        let bar = out.find("fn bar").expect("bar");
        assert!(user < foo && foo < bar, "{out}");
    }

    #[test]
    fn new_impl_entries_join_the_matching_block() {
        let existing = decls(
            0,
            "struct Ts;\n/// Kept.\nimpl Ts {\n    fn mine(&self) {}\n}\nimpl Clone for Ts {\n    fn clone(&self) -> Self { Ts }\n}\n",
        );
        let template = decls(
            1,
            "#[allow(dead_code)]\nimpl Ts {\n    fn new() -> Self { Ts }\n}\nimpl Default for Ts {\n    fn default() -> Self { Ts }\n}\n",
        );
        let collected = collect(existing, template);
        assert_eq!(collected.slots.len(), 4);
        let Decl::Impl(block) = &collected.slots[1] else {
            panic!("expected impl");
        };
        assert_eq!(block.file, FileId(1));
        let names: Vec<String> = block
            .entries
            .iter()
            .filter_map(|e| e.ident().map(|i| i.to_string()))
            .collect();
        assert_eq!(names, ["mine", "new"]);
        let out = render(collected.slots);
        assert!(out.contains("/// Kept.\n#[allow(dead_code)]\nimpl Ts {"), "{out}");
        assert!(out.contains("impl Default for Ts"), "{out}");
    }

    #[test]
    fn grouped_values_merge_per_entry() {
        let existing = decls(0, "thread_local! { static X: u8 = 1; static Y: u8 = 2; }\n");
        let template = decls(1, "thread_local! { static Y: u8 = 20; static Z: u8 = 30; }\n");
        let collected = collect(existing, template);
        assert_eq!(collected.slots.len(), 2);
        let Decl::Values(first) = &collected.slots[0] else {
            panic!("expected group");
        };
        let init = first.entries[1].init.to_token_stream().to_string();
        assert_eq!(init, "20");
        let Decl::Values(second) = &collected.slots[1] else {
            panic!("expected group");
        };
        assert_eq!(second.entries.len(), 1);
        assert_eq!(second.entries[0].ident, "Z");
    }

    #[test]
    fn unnamed_and_imports_are_deduplicated() {
        let existing = decls(0, "use std::fmt;\nconst _: () = { let _ = 42; };\n");
        let template = decls(
            1,
            "use std::{fmt, mem};\nconst _: () = { let _ = 42; };\nconst _: () = { let _ = 43; };\nconst _: () = { let _ = 43; };\n",
        );
        let collected = collect(existing, template);
        let out = render(collected.slots);
        assert_eq!(out.matches("42").count(), 1, "{out}");
        assert_eq!(out.matches("43").count(), 1, "{out}");
        assert_eq!(out.matches("fmt").count(), 1, "{out}");
        assert!(out.contains("mem"), "{out}");
    }

    #[test]
    fn keys_render_like_keep_specs() {
        let key = DeclKey::Entry {
            owner: "Ints".to_string(),
            trait_name: None,
            name: "push".to_string(),
        };
        assert_eq!(key.to_string(), "Ints.push");
        let key = DeclKey::Entry {
            owner: "Ints".to_string(),
            trait_name: Some("Debug".to_string()),
            name: "fmt".to_string(),
        };
        assert_eq!(key.to_string(), "<Ints as Debug>.fmt");
    }
}
