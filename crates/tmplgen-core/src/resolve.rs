use std::collections::{BTreeMap, BTreeSet};

use proc_macro2::{Ident, TokenStream, TokenTree};
use syn::visit::{self, Visit};
use syn::{
    Arm, Attribute, Block, Expr, ExprClosure, ExprForLoop, ExprIf, ExprLet, ExprMethodCall,
    ExprPath, ExprWhile, FnArg, GenericParam, Generics, ImplItemFn, ItemEnum, ItemFn, ItemImpl,
    ItemStruct, ItemTrait, ItemType, ItemUnion, ItemUse, Local, Macro, Path, PatIdent, Signature,
    TraitItemFn,
};

use crate::captures::FormatArgs;
use crate::decl::Decl;
use crate::source::{FileId, Pos};
use crate::symbols::{import_bindings, SymbolId, SymbolKind, SymbolTable};

/// Identifier positions mapped to the symbols they denote.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    occurrences: BTreeMap<Pos, Vec<SymbolId>>,
}

impl Resolution {
    pub fn record(&mut self, pos: Pos, symbol: SymbolId) {
        let slot = self.occurrences.entry(pos).or_default();
        if !slot.contains(&symbol) {
            slot.push(symbol);
        }
    }

    pub fn symbols_at(&self, pos: Pos) -> &[SymbolId] {
        self.occurrences.get(&pos).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn symbols_of(&self, file: FileId, ident: &Ident) -> &[SymbolId] {
        self.symbols_at(Pos::of(file, ident))
    }

    pub fn len(&self) -> usize {
        self.occurrences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }
}

pub fn resolve(decls: &[Decl], symbols: &SymbolTable) -> Resolution {
    let mut resolution = Resolution::default();
    for decl in decls {
        let mut r = Resolver {
            symbols,
            resolution: &mut resolution,
            file: decl.file(),
            scopes: Vec::new(),
            owner: None,
            value_path: false,
        };
        r.resolve_decl(decl);
    }
    resolution
}

#[derive(Default)]
struct Scope {
    values: BTreeSet<String>,
    types: BTreeSet<String>,
}

struct Resolver<'a> {
    symbols: &'a SymbolTable,
    resolution: &'a mut Resolution,
    file: FileId,
    scopes: Vec<Scope>,
    owner: Option<SymbolId>,
    value_path: bool,
}

impl Resolver<'_> {
    fn resolve_decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Type(d) | Decl::Other(d) => {
                if let (Some(ident), Some(sym)) = (d.ident(), d.tag.symbol) {
                    self.record(ident, sym);
                }
                self.visit_item(&d.item);
            }
            Decl::Values(g) => {
                for entry in &g.entries {
                    if let Some(sym) = entry.tag.symbol {
                        self.record(&entry.ident, sym);
                    }
                    self.visit_type(&entry.ty);
                    self.visit_expr(&entry.init);
                }
            }
            Decl::Func(f) => {
                if let Some(sym) = f.tag.symbol {
                    self.record(&f.item.sig.ident, sym);
                }
                self.visit_item_fn(&f.item);
            }
            Decl::Impl(imp) => {
                self.owner = imp
                    .self_name()
                    .and_then(|name| self.symbols.lookup(&name))
                    .filter(|id| self.symbols.get(*id).kind.is_type());
                self.push_scope();
                self.bind_generics(&imp.header.generics);
                self.visit_generics(&imp.header.generics);
                if let Some((_, path, _)) = &imp.header.trait_ {
                    self.visit_path(path);
                }
                self.visit_type(&imp.header.self_ty);
                for entry in &imp.entries {
                    if let (Some(ident), Some(sym)) = (entry.ident(), entry.tag.symbol) {
                        self.record(ident, sym);
                    }
                    self.visit_impl_item(&entry.item);
                }
                self.pop_scope();
                self.owner = None;
            }
            Decl::Import(u) => {
                let mut bound = Vec::new();
                import_bindings(&u.item.tree, None, &mut bound);
                for (name, ident) in bound {
                    if let Some(sym) = self.symbols.lookup_in_file(self.file, &name) {
                        if self.symbols.get(sym).kind == SymbolKind::Import {
                            self.record(ident, sym);
                        }
                    }
                }
            }
            Decl::Unnamed(u) => self.visit_item(&u.item),
        }
    }

    fn record(&mut self, ident: &Ident, symbol: SymbolId) {
        self.resolution.record(Pos::of(self.file, ident), symbol);
    }

    fn record_entries(&mut self, owner: SymbolId, ident: &Ident) {
        for entry in self.symbols.entries_of(owner, &ident.to_string()) {
            self.record(ident, entry);
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind_value(&mut self, name: String) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.values.insert(name);
        }
    }

    fn bind_generics(&mut self, generics: &Generics) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        for param in &generics.params {
            match param {
                GenericParam::Type(t) => {
                    scope.types.insert(t.ident.to_string());
                }
                GenericParam::Const(c) => {
                    scope.values.insert(c.ident.to_string());
                }
                GenericParam::Lifetime(_) => {}
            }
        }
    }

    fn is_local_value(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.values.contains(name))
    }

    fn is_local_type(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.types.contains(name))
    }

    fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.symbols.lookup_in_file(self.file, name)
    }

    fn resolve_path(&mut self, path: &Path, value: bool) {
        if path.leading_colon.is_some() {
            return;
        }
        let mut segs = path.segments.iter();
        let Some(mut first) = segs.next() else {
            return;
        };
        if first.ident == "Self" {
            if let (Some(owner), Some(next)) = (self.owner, segs.next()) {
                self.record_entries(owner, &next.ident);
            }
            return;
        }
        if first.ident == "self" && path.segments.len() > 1 {
            match segs.next() {
                Some(seg) => first = seg,
                None => return,
            }
        }
        let name = first.ident.to_string();
        let shadowed = if value && segs.len() == 0 {
            self.is_local_value(&name)
        } else {
            self.is_local_type(&name)
        };
        if shadowed {
            return;
        }
        let Some(sym) = self.lookup(&name) else {
            return;
        };
        self.record(&first.ident, sym);
        if let Some(next) = segs.next() {
            if self.symbols.get(sym).kind.is_type() {
                self.record_entries(sym, &next.ident);
            }
        }
    }

    fn walk_fn(&mut self, sig: &Signature, body: Option<&Block>) {
        self.push_scope();
        self.bind_generics(&sig.generics);
        self.visit_generics(&sig.generics);
        for input in &sig.inputs {
            match input {
                FnArg::Receiver(r) => self.visit_type(&r.ty),
                FnArg::Typed(t) => {
                    self.visit_type(&t.ty);
                    self.visit_pat(&t.pat);
                }
            }
        }
        self.visit_return_type(&sig.output);
        if let Some(body) = body {
            self.visit_block(body);
        }
        self.pop_scope();
    }

    /// Macro bodies are unparsed: any identifier spelled like a visible template
    /// symbol is taken as a use, except after `.` (fields, methods) or `$`.
    fn walk_tokens(&mut self, tokens: TokenStream) {
        let mut dots = 0usize;
        let mut dollar = false;
        let mut colons = 0usize;
        let mut path_owner: Option<SymbolId> = None;
        for tt in tokens {
            match tt {
                TokenTree::Group(g) => {
                    self.walk_tokens(g.stream());
                    (dots, dollar, colons, path_owner) = (0, false, 0, None);
                }
                TokenTree::Ident(ident) => {
                    let skip = dots == 1 || dollar;
                    let owner = if colons == 2 { path_owner } else { None };
                    (dots, dollar, colons, path_owner) = (0, false, 0, None);
                    if skip {
                        continue;
                    }
                    if let Some(owner) = owner {
                        self.record_entries(owner, &ident);
                        continue;
                    }
                    let name = ident.to_string();
                    if self.is_local_value(&name) || self.is_local_type(&name) {
                        continue;
                    }
                    if let Some(sym) = self.lookup(&name) {
                        self.record(&ident, sym);
                        if self.symbols.get(sym).kind.is_type() {
                            path_owner = Some(sym);
                        }
                    }
                }
                TokenTree::Punct(p) => match p.as_char() {
                    ':' => {
                        colons += 1;
                        (dots, dollar) = (0, false);
                    }
                    '.' => {
                        dots += 1;
                        (dollar, colons, path_owner) = (false, 0, None);
                    }
                    '$' => {
                        dollar = true;
                        (dots, colons, path_owner) = (0, 0, None);
                    }
                    _ => (dots, dollar, colons, path_owner) = (0, false, 0, None),
                },
                TokenTree::Literal(_) => (dots, dollar, colons, path_owner) = (0, false, 0, None),
            }
        }
    }
}

impl<'ast> Visit<'ast> for Resolver<'_> {
    fn visit_attribute(&mut self, _: &'ast Attribute) {}

    fn visit_item_use(&mut self, _: &'ast ItemUse) {}

    fn visit_item_fn(&mut self, f: &'ast ItemFn) {
        self.walk_fn(&f.sig, Some(&f.block));
    }

    fn visit_impl_item_fn(&mut self, f: &'ast ImplItemFn) {
        self.walk_fn(&f.sig, Some(&f.block));
    }

    fn visit_trait_item_fn(&mut self, f: &'ast TraitItemFn) {
        self.walk_fn(&f.sig, f.default.as_ref());
    }

    fn visit_item_struct(&mut self, i: &'ast ItemStruct) {
        self.push_scope();
        self.bind_generics(&i.generics);
        visit::visit_item_struct(self, i);
        self.pop_scope();
    }

    fn visit_item_enum(&mut self, i: &'ast ItemEnum) {
        self.push_scope();
        self.bind_generics(&i.generics);
        visit::visit_item_enum(self, i);
        self.pop_scope();
    }

    fn visit_item_union(&mut self, i: &'ast ItemUnion) {
        self.push_scope();
        self.bind_generics(&i.generics);
        visit::visit_item_union(self, i);
        self.pop_scope();
    }

    fn visit_item_type(&mut self, i: &'ast ItemType) {
        self.push_scope();
        self.bind_generics(&i.generics);
        visit::visit_item_type(self, i);
        self.pop_scope();
    }

    fn visit_item_trait(&mut self, i: &'ast ItemTrait) {
        self.push_scope();
        self.bind_generics(&i.generics);
        visit::visit_item_trait(self, i);
        self.pop_scope();
    }

    fn visit_item_impl(&mut self, i: &'ast ItemImpl) {
        self.push_scope();
        self.bind_generics(&i.generics);
        visit::visit_item_impl(self, i);
        self.pop_scope();
    }

    fn visit_block(&mut self, b: &'ast Block) {
        self.push_scope();
        visit::visit_block(self, b);
        self.pop_scope();
    }

    fn visit_local(&mut self, l: &'ast Local) {
        if let Some(init) = &l.init {
            self.visit_expr(&init.expr);
            if let Some((_, diverge)) = &init.diverge {
                self.visit_expr(diverge);
            }
        }
        self.visit_pat(&l.pat);
    }

    fn visit_expr_closure(&mut self, c: &'ast ExprClosure) {
        self.push_scope();
        for input in &c.inputs {
            self.visit_pat(input);
        }
        self.visit_return_type(&c.output);
        self.visit_expr(&c.body);
        self.pop_scope();
    }

    fn visit_arm(&mut self, arm: &'ast Arm) {
        self.push_scope();
        self.visit_pat(&arm.pat);
        if let Some((_, guard)) = &arm.guard {
            self.visit_expr(guard);
        }
        self.visit_expr(&arm.body);
        self.pop_scope();
    }

    fn visit_expr_for_loop(&mut self, f: &'ast ExprForLoop) {
        self.visit_expr(&f.expr);
        self.push_scope();
        self.visit_pat(&f.pat);
        self.visit_block(&f.body);
        self.pop_scope();
    }

    fn visit_expr_if(&mut self, i: &'ast ExprIf) {
        self.push_scope();
        self.visit_expr(&i.cond);
        self.visit_block(&i.then_branch);
        self.pop_scope();
        if let Some((_, else_branch)) = &i.else_branch {
            self.visit_expr(else_branch);
        }
    }

    fn visit_expr_while(&mut self, w: &'ast ExprWhile) {
        self.push_scope();
        self.visit_expr(&w.cond);
        self.visit_block(&w.body);
        self.pop_scope();
    }

    fn visit_expr_let(&mut self, l: &'ast ExprLet) {
        self.visit_expr(&l.expr);
        self.visit_pat(&l.pat);
    }

    fn visit_pat_ident(&mut self, p: &'ast PatIdent) {
        let name = p.ident.to_string();
        let plain = p.by_ref.is_none() && p.mutability.is_none() && p.subpat.is_none();
        let constant = if plain && !self.is_local_value(&name) {
            self.lookup(&name).filter(|id| {
                matches!(
                    self.symbols.get(*id).kind,
                    SymbolKind::Const | SymbolKind::Static | SymbolKind::Struct
                )
            })
        } else {
            None
        };
        match constant {
            Some(sym) => self.record(&p.ident, sym),
            None => self.bind_value(name),
        }
        if let Some((_, sub)) = &p.subpat {
            self.visit_pat(sub);
        }
    }

    fn visit_expr_path(&mut self, e: &'ast ExprPath) {
        if let Some(qself) = &e.qself {
            self.visit_qself(qself);
        }
        self.value_path = true;
        self.visit_path(&e.path);
    }

    fn visit_path(&mut self, path: &'ast Path) {
        let value = std::mem::take(&mut self.value_path);
        self.resolve_path(path, value);
        for seg in &path.segments {
            self.visit_path_arguments(&seg.arguments);
        }
    }

    fn visit_expr_method_call(&mut self, m: &'ast ExprMethodCall) {
        self.visit_expr(&m.receiver);
        let name = m.method.to_string();
        let on_self = matches!(&*m.receiver, Expr::Path(p) if p.path.is_ident("self"));
        let candidates = match self.owner {
            Some(owner) if on_self => self.symbols.entries_of(owner, &name),
            _ => self.symbols.entries_named(&name).to_vec(),
        };
        for sym in candidates {
            self.record(&m.method, sym);
        }
        if let Some(turbofish) = &m.turbofish {
            self.visit_angle_bracketed_generic_arguments(turbofish);
        }
        for arg in &m.args {
            self.visit_expr(arg);
        }
    }

    fn visit_macro(&mut self, m: &'ast Macro) {
        if let Some(ident) = m.path.get_ident() {
            let name = ident.to_string();
            if let Some(sym) = self.lookup(&name) {
                if self.symbols.get(sym).kind == SymbolKind::Macro {
                    self.record(ident, sym);
                }
            }
        }
        self.walk_tokens(m.tokens.clone());
        if let Some(args) = FormatArgs::parse(&m.path, &m.tokens) {
            for capture in args.captures(self.file) {
                if self.is_local_value(&capture.name) {
                    continue;
                }
                let sym = self
                    .lookup(&capture.name)
                    .filter(|id| self.symbols.get(*id).kind.is_value());
                if let Some(sym) = sym {
                    self.resolution.record(capture.pos, sym);
                }
            }
        }
    }
}
