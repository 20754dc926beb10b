use std::collections::{BTreeMap, BTreeSet, VecDeque};

use proc_macro2::{Ident, TokenStream, TokenTree};
use syn::visit::Visit;
use syn::{Attribute, Item, Macro};

use crate::captures::FormatArgs;
use crate::decl::{type_ident, Decl, ImplDecl};
use crate::resolve::Resolution;
use crate::source::FileId;
use crate::symbols::{SymbolId, SymbolTable};

/// Symbol-level reference graph over the collected declarations.
#[derive(Debug, Default)]
pub struct DepGraph {
    edges: BTreeMap<SymbolId, BTreeSet<SymbolId>>,
    /// Symbols referenced by content that is always emitted: unnamed items
    /// and impl blocks without a template anchor.
    roots: BTreeSet<SymbolId>,
    /// Template type an impl slot hangs off, by slot index.
    anchors: BTreeMap<usize, SymbolId>,
}

impl DepGraph {
    pub fn build(slots: &[Decl], resolution: &Resolution, symbols: &SymbolTable) -> DepGraph {
        let mut graph = DepGraph::default();
        for (slot, decl) in slots.iter().enumerate() {
            match decl {
                Decl::Type(d) | Decl::Other(d) => {
                    if let Some(sym) = d.tag.symbol {
                        graph.add(sym, references(&d.item, d.tag.file, resolution));
                    }
                }
                Decl::Func(f) => {
                    if let Some(sym) = f.tag.symbol {
                        let refs = collect_refs(resolution, f.tag.file, |c| c.visit_item_fn(&f.item));
                        graph.add(sym, refs);
                    }
                }
                Decl::Values(g) => {
                    for entry in &g.entries {
                        if let Some(sym) = entry.tag.symbol {
                            let refs = collect_refs(resolution, entry.tag.file, |c| {
                                c.visit_type(&entry.ty);
                                c.visit_expr(&entry.init);
                            });
                            graph.add(sym, refs);
                        }
                    }
                }
                Decl::Impl(imp) => graph.add_impl(slot, imp, resolution, symbols),
                Decl::Unnamed(u) => graph
                    .roots
                    .extend(references(&u.item, u.file, resolution)),
                Decl::Import(_) => {}
            }
        }
        graph
    }

    fn add(&mut self, from: SymbolId, to: impl IntoIterator<Item = SymbolId>) {
        self.edges
            .entry(from)
            .or_default()
            .extend(to.into_iter().filter(|t| *t != from));
    }

    fn add_impl(&mut self, slot: usize, imp: &ImplDecl, resolution: &Resolution, symbols: &SymbolTable) {
        let header = collect_refs(resolution, imp.file, |c| {
            c.visit_generics(&imp.header.generics);
            if let Some((_, path, _)) = &imp.header.trait_ {
                c.visit_path(path);
            }
            c.visit_type(&imp.header.self_ty);
        });
        let Some(anchor) = impl_anchor(imp, &header, resolution, symbols) else {
            self.roots.extend(header);
            for entry in &imp.entries {
                self.roots.extend(entry.tag.symbol);
                self.roots.extend(collect_refs(resolution, entry.tag.file, |c| {
                    c.visit_impl_item(&entry.item)
                }));
            }
            return;
        };
        self.anchors.insert(slot, anchor);
        let is_trait_impl = imp.header.trait_.is_some();
        for entry in &imp.entries {
            let refs = collect_refs(resolution, entry.tag.file, |c| c.visit_impl_item(&entry.item));
            match entry.tag.symbol {
                Some(sym) => {
                    self.add(sym, refs);
                    self.add(sym, header.iter().copied().chain([anchor]));
                    if is_trait_impl {
                        self.add(anchor, [sym]);
                    }
                }
                None => self.add(anchor, refs),
            }
        }
        if is_trait_impl {
            self.add(anchor, header);
        }
    }

    pub fn anchor(&self, slot: usize) -> Option<SymbolId> {
        self.anchors.get(&slot).copied()
    }

    pub fn roots(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.roots.iter().copied()
    }

    pub fn edges_from(&self, symbol: SymbolId) -> impl Iterator<Item = SymbolId> + '_ {
        self.edges.get(&symbol).into_iter().flatten().copied()
    }

    /// Seeds plus roots, closed under the edge relation.
    pub fn closure(&self, seeds: impl IntoIterator<Item = SymbolId>) -> BTreeSet<SymbolId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        for seed in seeds.into_iter().chain(self.roots()) {
            if seen.insert(seed) {
                queue.push_back(seed);
            }
        }
        while let Some(symbol) = queue.pop_front() {
            for next in self.edges_from(symbol) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }
}

/// The template type (or trait) an impl block belongs to: its self type, then
/// its trait, then the first template type named in the header.
fn impl_anchor(
    imp: &ImplDecl,
    header: &BTreeSet<SymbolId>,
    resolution: &Resolution,
    symbols: &SymbolTable,
) -> Option<SymbolId> {
    let trait_ident = imp
        .header
        .trait_
        .as_ref()
        .and_then(|(_, path, _)| path.segments.last())
        .map(|seg| &seg.ident);
    type_ident(&imp.header.self_ty)
        .into_iter()
        .chain(trait_ident)
        .flat_map(|ident| resolution.symbols_of(imp.file, ident))
        .chain(header)
        .copied()
        .find(|id| symbols.get(*id).kind.is_type())
}

/// Template symbols referenced anywhere inside `item`.
pub fn references(item: &Item, file: FileId, resolution: &Resolution) -> BTreeSet<SymbolId> {
    collect_refs(resolution, file, |c| c.visit_item(item))
}

fn collect_refs(
    resolution: &Resolution,
    file: FileId,
    walk: impl FnOnce(&mut RefCollector<'_>),
) -> BTreeSet<SymbolId> {
    let mut collector = RefCollector {
        resolution,
        file,
        out: BTreeSet::new(),
    };
    walk(&mut collector);
    collector.out
}

struct RefCollector<'a> {
    resolution: &'a Resolution,
    file: FileId,
    out: BTreeSet<SymbolId>,
}

impl RefCollector<'_> {
    fn tokens(&mut self, tokens: TokenStream) {
        for tt in tokens {
            match tt {
                TokenTree::Ident(ident) => self.visit_ident(&ident),
                TokenTree::Group(g) => self.tokens(g.stream()),
                TokenTree::Punct(_) | TokenTree::Literal(_) => {}
            }
        }
    }
}

impl<'ast> Visit<'ast> for RefCollector<'_> {
    fn visit_attribute(&mut self, _: &'ast Attribute) {}

    fn visit_ident(&mut self, ident: &'ast Ident) {
        self.out
            .extend(self.resolution.symbols_of(self.file, ident).iter().copied());
    }

    fn visit_macro(&mut self, m: &'ast Macro) {
        self.visit_path(&m.path);
        self.tokens(m.tokens.clone());
        if let Some(args) = FormatArgs::parse(&m.path, &m.tokens) {
            for capture in args.captures(self.file) {
                self.out
                    .extend(self.resolution.symbols_at(capture.pos).iter().copied());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::lower_items;
    use crate::resolve::resolve;

    struct Fixture {
        decls: Vec<Decl>,
        symbols: SymbolTable,
        resolution: Resolution,
    }

    impl Fixture {
        fn new(src: &str) -> Fixture {
            let file = syn::parse_file(src).expect("parse");
            let mut decls = lower_items(FileId(0), file.items);
            let symbols = SymbolTable::build(&mut decls).expect("symbols");
            let resolution = resolve(&decls, &symbols);
            Fixture {
                decls,
                symbols,
                resolution,
            }
        }

        fn graph(&self) -> DepGraph {
            DepGraph::build(&self.decls, &self.resolution, &self.symbols)
        }

        fn id(&self, name: &str) -> SymbolId {
            self.symbols.lookup(name).expect(name)
        }

        fn names(&self, set: &BTreeSet<SymbolId>) -> Vec<String> {
            set.iter().map(|id| self.symbols.get(*id).name.clone()).collect()
        }
    }

    #[test]
    fn closure_follows_calls_and_initializers() {
        let f = Fixture::new(
            "fn a() -> u8 { b() }\nfn b() -> u8 { C }\nconst C: u8 = 1;\nfn d() {}\n",
        );
        let kept = f.graph().closure([f.id("a")]);
        assert_eq!(f.names(&kept), ["a", "b", "C"]);
    }

    #[test]
    fn trait_impls_travel_with_their_type() {
        let f = Fixture::new(
            "struct Ts(u8);\n\
             impl std::fmt::Debug for Ts {\n\
                 fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { helper(); Ok(()) }\n\
             }\n\
             impl Ts { fn unused(&self) {} }\n\
             fn helper() {}\n",
        );
        let graph = f.graph();
        assert_eq!(graph.anchor(1), Some(f.id("Ts")));
        assert_eq!(graph.anchor(2), Some(f.id("Ts")));
        let names = f.names(&graph.closure([f.id("Ts")]));
        assert!(names.contains(&"fmt".to_string()), "{names:?}");
        assert!(names.contains(&"helper".to_string()), "{names:?}");
        assert!(!names.contains(&"unused".to_string()), "{names:?}");
    }

    #[test]
    fn unnamed_items_root_their_references() {
        let f = Fixture::new("fn d() {}\nfn e() {}\nconst _: () = { d(); };\n");
        let kept = f.graph().closure([]);
        assert_eq!(f.names(&kept), ["d"]);
    }

    #[test]
    fn macro_bodies_count_as_references() {
        let f = Fixture::new("fn a() { println!(\"{}\", b()); }\nfn b() -> u8 { 0 }\n");
        let kept = f.graph().closure([f.id("a")]);
        assert_eq!(f.names(&kept), ["a", "b"]);
    }

    #[test]
    fn format_captures_count_as_references() {
        let f = Fixture::new(
            "const LIMIT: u8 = 3;\nconst OTHER: u8 = 4;\nfn a() -> String { format!(\"{LIMIT:?}\") }\n",
        );
        let kept = f.graph().closure([f.id("a")]);
        assert_eq!(f.names(&kept), ["LIMIT", "a"]);
    }
}
