use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use proc_macro2::{Ident, Spacing, TokenStream, TokenTree};
use quote::ToTokens;
use syn::punctuated::Punctuated;
use syn::visit::{self, Visit};
use syn::{Item, ItemUse, Macro, MetaList, Path, UsePath, UseTree, Visibility};

use crate::decl::item_ident;
use crate::diagnostics::{fail, DiagnosticCode};

/// Names resolved through `use` when a module references them bare.
const WELL_KNOWN: &[(&str, &str)] = &[
    ("Arc", "std::sync::Arc"),
    ("BTreeMap", "std::collections::BTreeMap"),
    ("BTreeSet", "std::collections::BTreeSet"),
    ("BinaryHeap", "std::collections::BinaryHeap"),
    ("Cell", "std::cell::Cell"),
    ("Duration", "std::time::Duration"),
    ("HashMap", "std::collections::HashMap"),
    ("HashSet", "std::collections::HashSet"),
    ("Instant", "std::time::Instant"),
    ("Mutex", "std::sync::Mutex"),
    ("Ordering", "std::cmp::Ordering"),
    ("Path", "std::path::Path"),
    ("PathBuf", "std::path::PathBuf"),
    ("PhantomData", "std::marker::PhantomData"),
    ("Rc", "std::rc::Rc"),
    ("RefCell", "std::cell::RefCell"),
    ("RwLock", "std::sync::RwLock"),
    ("VecDeque", "std::collections::VecDeque"),
    ("fmt", "std::fmt"),
    ("mem", "std::mem"),
];

/// Traits imported only for their methods; their names never appear in code.
const METHOD_TRAITS: &[&str] = &[
    "borrow::Borrow",
    "borrow::BorrowMut",
    "fmt::Write",
    "hash::Hash",
    "hash::Hasher",
    "io::BufRead",
    "io::Read",
    "io::Seek",
    "io::Write",
    "iter::FromIterator",
    "ops::Deref",
    "ops::DerefMut",
    "str::FromStr",
];

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Binding {
    Name,
    Rename(String),
    Glob,
}

/// One flattened `use` path. A leading `::` is kept as an empty first segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Leaf {
    pub path: Vec<String>,
    pub binding: Binding,
}

impl Leaf {
    pub fn bound_name(&self) -> Option<&str> {
        match &self.binding {
            Binding::Name => self.path.last().map(String::as_str),
            Binding::Rename(r) if r != "_" => Some(r.as_str()),
            Binding::Rename(_) | Binding::Glob => None,
        }
    }

    pub fn render(&self) -> String {
        let path = self.path.join("::");
        match &self.binding {
            Binding::Name => path,
            Binding::Rename(r) => format!("{path} as {r}"),
            Binding::Glob if path.is_empty() => "*".to_string(),
            Binding::Glob => format!("{path}::*"),
        }
    }

    fn split(&self) -> (&[String], String) {
        match &self.binding {
            Binding::Glob => (self.path.as_slice(), "*".to_string()),
            Binding::Name | Binding::Rename(_) => {
                let (last, parent) = match self.path.split_last() {
                    Some((last, parent)) => (last.as_str(), parent),
                    None => ("self", &[][..]),
                };
                match &self.binding {
                    Binding::Rename(r) => (parent, format!("{last} as {r}")),
                    _ => (parent, last.to_string()),
                }
            }
        }
    }

    fn is_method_trait(&self) -> bool {
        let tail = match self.path.first().map(String::as_str) {
            Some("std" | "core" | "alloc") => self.path[1..].join("::"),
            _ => return false,
        };
        METHOD_TRAITS.contains(&tail.as_str())
    }
}

pub(crate) fn flatten(item: &ItemUse) -> Vec<Leaf> {
    let mut prefix = Vec::new();
    if item.leading_colon.is_some() {
        prefix.push(String::new());
    }
    let mut out = Vec::new();
    flatten_tree(&item.tree, &mut prefix, &mut out);
    out
}

fn flatten_tree(tree: &UseTree, prefix: &mut Vec<String>, out: &mut Vec<Leaf>) {
    match tree {
        UseTree::Path(p) => {
            prefix.push(p.ident.to_string());
            flatten_tree(&p.tree, prefix, out);
            prefix.pop();
        }
        UseTree::Name(n) => out.push(Leaf {
            path: joined(prefix, &n.ident),
            binding: Binding::Name,
        }),
        UseTree::Rename(r) => out.push(Leaf {
            path: joined(prefix, &r.ident),
            binding: Binding::Rename(r.rename.to_string()),
        }),
        UseTree::Glob(_) => out.push(Leaf {
            path: prefix.clone(),
            binding: Binding::Glob,
        }),
        UseTree::Group(g) => {
            for item in &g.items {
                flatten_tree(item, prefix, out);
            }
        }
    }
}

fn joined(prefix: &[String], ident: &Ident) -> Vec<String> {
    let mut path = prefix.to_vec();
    if ident != "self" {
        path.push(ident.to_string());
    }
    path
}

/// Drops the leaves `keep` rejects; `None` when nothing is left.
pub(crate) fn prune(mut item: ItemUse, keep: &mut dyn FnMut(&Leaf) -> bool) -> Option<ItemUse> {
    let mut prefix = Vec::new();
    if item.leading_colon.is_some() {
        prefix.push(String::new());
    }
    item.tree = prune_tree(item.tree, &mut prefix, keep)?;
    Some(item)
}

fn prune_tree(
    tree: UseTree,
    prefix: &mut Vec<String>,
    keep: &mut dyn FnMut(&Leaf) -> bool,
) -> Option<UseTree> {
    match tree {
        UseTree::Path(UsePath {
            ident,
            colon2_token,
            tree,
        }) => {
            prefix.push(ident.to_string());
            let inner = prune_tree(*tree, prefix, keep);
            prefix.pop();
            inner.map(|tree| {
                UseTree::Path(UsePath {
                    ident,
                    colon2_token,
                    tree: Box::new(tree),
                })
            })
        }
        UseTree::Group(mut g) => {
            let items: Punctuated<UseTree, syn::Token![,]> = std::mem::take(&mut g.items)
                .into_iter()
                .filter_map(|t| prune_tree(t, prefix, keep))
                .collect();
            if items.is_empty() {
                return None;
            }
            g.items = items;
            Some(UseTree::Group(g))
        }
        leaf => {
            let mut leaves = Vec::new();
            flatten_tree(&leaf, prefix, &mut leaves);
            leaves.iter().all(|l| keep(l)).then_some(leaf)
        }
    }
}

/// Key of a leaf for duplicate detection; visibility is part of it.
pub(crate) fn leaf_key(vis: &Visibility, leaf: &Leaf) -> String {
    format!("{} {}", vis.to_token_stream(), leaf.render())
}

/// Flattens private, unattributed imports, drops unreferenced or duplicate
/// leaves, adds well-known std names used bare, and regroups by parent path.
pub fn normalize(imports: Vec<ItemUse>, items: &[Item]) -> Result<Vec<ItemUse>> {
    let mut refs = References::default();
    for item in items {
        refs.visit_item(item);
    }

    let mut verbatim = Vec::new();
    let mut seen = BTreeSet::new();
    let mut leaves = BTreeSet::new();
    for item in imports {
        if matches!(item.vis, Visibility::Inherited) && item.attrs.is_empty() {
            leaves.extend(flatten(&item));
        } else if seen.insert(item.to_token_stream().to_string()) {
            verbatim.push(item);
        }
    }

    leaves.retain(|leaf: &Leaf| match &leaf.binding {
        Binding::Glob => true,
        Binding::Rename(r) if r == "_" => true,
        _ => {
            leaf.is_method_trait() || leaf.bound_name().is_some_and(|n| refs.idents.contains(n))
        }
    });

    let mut defined: BTreeSet<String> = items
        .iter()
        .filter_map(item_ident)
        .map(|i| i.to_string())
        .collect();
    let verbatim_leaves: Vec<Leaf> = verbatim.iter().flat_map(flatten).collect();
    for leaf in leaves.iter().chain(&verbatim_leaves) {
        if let Some(name) = leaf.bound_name() {
            defined.insert(name.to_string());
        }
    }
    for (name, path) in WELL_KNOWN {
        if refs.path_heads.contains(*name) && !defined.contains(*name) {
            leaves.insert(Leaf {
                path: path.split("::").map(str::to_string).collect(),
                binding: Binding::Name,
            });
        }
    }

    let mut out = group_leaves(&leaves)?;
    out.extend(verbatim);
    Ok(out)
}

fn group_leaves(leaves: &BTreeSet<Leaf>) -> Result<Vec<ItemUse>> {
    let mut groups: BTreeMap<&[String], BTreeSet<String>> = BTreeMap::new();
    for leaf in leaves {
        let (parent, tail) = leaf.split();
        groups.entry(parent).or_default().insert(tail);
    }
    let mut texts = Vec::new();
    for (parent, tails) in groups {
        let parent = parent.join("::");
        if parent.is_empty() {
            texts.extend(tails);
        } else if tails.len() == 1 {
            texts.extend(tails.into_iter().map(|t| format!("{parent}::{t}")));
        } else {
            let tails: Vec<String> = tails.into_iter().collect();
            texts.push(format!("{parent}::{{{}}}", tails.join(", ")));
        }
    }
    let mut out = Vec::new();
    for text in texts {
        match syn::parse_str::<ItemUse>(&format!("use {text};")) {
            Ok(item) => out.push(item),
            Err(err) => {
                return fail(
                    DiagnosticCode::TG0301RenderFailed,
                    format!("format imports: use {text}: {err}"),
                )
            }
        }
    }
    Ok(out)
}

#[derive(Default)]
struct References {
    idents: BTreeSet<String>,
    path_heads: BTreeSet<String>,
}

impl References {
    fn tokens(&mut self, tokens: TokenStream) {
        let trees: Vec<TokenTree> = tokens.into_iter().collect();
        for (idx, tt) in trees.iter().enumerate() {
            match tt {
                TokenTree::Group(g) => self.tokens(g.stream()),
                TokenTree::Ident(ident) => {
                    let name = ident.to_string();
                    let head = matches!(
                        &trees[idx + 1..],
                        [TokenTree::Punct(a), TokenTree::Punct(b), ..]
                            if a.as_char() == ':' && a.spacing() == Spacing::Joint && b.as_char() == ':'
                    );
                    if head {
                        self.path_heads.insert(name.clone());
                    }
                    self.idents.insert(name);
                }
                TokenTree::Punct(_) | TokenTree::Literal(_) => {}
            }
        }
    }
}

impl<'ast> Visit<'ast> for References {
    fn visit_ident(&mut self, i: &'ast Ident) {
        self.idents.insert(i.to_string());
    }

    fn visit_path(&mut self, p: &'ast Path) {
        if p.leading_colon.is_none() {
            if let Some(first) = p.segments.first() {
                self.path_heads.insert(first.ident.to_string());
            }
        }
        visit::visit_path(self, p);
    }

    fn visit_macro(&mut self, m: &'ast Macro) {
        visit::visit_macro(self, m);
        self.tokens(m.tokens.clone());
    }

    fn visit_meta_list(&mut self, m: &'ast MetaList) {
        visit::visit_meta_list(self, m);
        self.tokens(m.tokens.clone());
    }
}
