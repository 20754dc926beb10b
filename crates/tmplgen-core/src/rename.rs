use std::collections::BTreeMap;

use anyhow::Result;
use proc_macro2::{Group, Ident, Span, Spacing, TokenStream, TokenTree};
use quote::{quote, ToTokens};
use syn::parse::Parse;
use syn::visit_mut::{self, VisitMut};
use syn::{
    Attribute, Expr, ExprLit, ExprParen, ExprPath, ExprStruct, FieldValue, Lit, LitChar, LitStr,
    Macro, Pat, PatStruct, PatTupleStruct, Path, PathArguments, PathSegment, QSelf, Type,
    TypePath, UseRename, UseTree,
};
use tracing::debug;

use crate::captures::FormatArgs;
use crate::decl::Decl;
use crate::diagnostics::{fail, DiagnosticCode};
use crate::resolve::Resolution;
use crate::source::FileId;
use crate::symbols::{Symbol, SymbolId, SymbolTable};

#[derive(Debug, Clone)]
pub enum Replacement {
    Ident(Ident),
    Type(Box<Type>),
    Expr(Box<Expr>),
}

/// Symbol to replacement, built from parameter bindings and explicit renames.
#[derive(Debug, Clone, Default)]
pub struct RenameMap {
    map: BTreeMap<SymbolId, Replacement>,
}

impl RenameMap {
    pub fn build(
        symbols: &SymbolTable,
        params: &BTreeMap<String, String>,
        renames: &BTreeMap<String, String>,
    ) -> Result<RenameMap> {
        if let Some(name) = renames.keys().find(|k| params.contains_key(*k)) {
            return fail(
                DiagnosticCode::TG0104ConflictingBinding,
                format!("{name} is bound by both params and renames"),
            );
        }
        let mut out = RenameMap::default();
        for (name, value) in params {
            for id in lookup_key(symbols, name)? {
                let repl = param_replacement(symbols.get(id), value)?;
                out.map.insert(id, repl);
            }
        }
        for (name, value) in renames {
            let ident = match syn::parse_str::<Ident>(value) {
                Ok(ident) => ident,
                Err(_) => {
                    return fail(
                        DiagnosticCode::TG0102InvalidRename,
                        format!("invalid rename target for {name}: {value:?}"),
                    )
                }
            };
            for id in lookup_key(symbols, name)? {
                out.map.insert(id, Replacement::Ident(ident.clone()));
            }
        }
        Ok(out)
    }

    pub fn get(&self, id: SymbolId) -> Option<&Replacement> {
        self.map.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Original name of the symbol renamed to `spelled`, if any.
    pub fn original_name<'s>(&self, symbols: &'s SymbolTable, spelled: &str) -> Option<&'s str> {
        self.map.iter().find_map(|(id, repl)| match repl {
            Replacement::Ident(ident) if ident == spelled => Some(symbols.get(*id).name.as_str()),
            _ => None,
        })
    }
}

fn lookup_key(symbols: &SymbolTable, name: &str) -> Result<Vec<SymbolId>> {
    let ids = symbols.lookup_all(name);
    if ids.is_empty() {
        return fail(
            DiagnosticCode::TG0101SymbolNotFound,
            format!("name not found: {name}"),
        );
    }
    Ok(ids)
}

fn param_replacement(symbol: &Symbol, value: &str) -> Result<Replacement> {
    let invalid = |err: &dyn std::fmt::Display| {
        fail::<Replacement>(
            DiagnosticCode::TG0103InvalidParam,
            format!("invalid value for parameter {}: {value:?}: {err}", symbol.name),
        )
    };
    if symbol.kind.is_type() {
        return match syn::parse_str::<Type>(value) {
            Ok(ty) => Ok(Replacement::Type(Box::new(ty))),
            Err(err) => invalid(&err),
        };
    }
    if symbol.kind.is_value() {
        return match literal_for(symbol.value_ty.as_ref(), value) {
            Ok(expr) => Ok(Replacement::Expr(Box::new(expr))),
            Err(err) => invalid(&err),
        };
    }
    match syn::parse_str::<Ident>(value) {
        Ok(ident) => Ok(Replacement::Ident(ident)),
        Err(err) => invalid(&err),
    }
}

/// Textual values bound to a `&str` or `char` placeholder are quoted.
fn literal_for(ty: Option<&Type>, value: &str) -> syn::Result<Expr> {
    let span = Span::call_site();
    let lit = match ty {
        Some(Type::Reference(r)) if is_named(&r.elem, "str") && !is_quoted(value) => {
            Some(Lit::Str(LitStr::new(value, span)))
        }
        Some(ty) if is_named(ty, "char") && !value.starts_with('\'') => {
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(Lit::Char(LitChar::new(c, span))),
                _ => None,
            }
        }
        _ => None,
    };
    match lit {
        Some(lit) => Ok(Expr::Lit(ExprLit {
            attrs: Vec::new(),
            lit,
        })),
        None => syn::parse_str::<Expr>(value),
    }
}

fn is_named(ty: &Type, name: &str) -> bool {
    matches!(ty, Type::Path(p) if p.qself.is_none() && p.path.is_ident(name))
}

fn is_quoted(value: &str) -> bool {
    value.starts_with('"') || value.starts_with("r\"") || value.starts_with("r#")
}

pub fn apply(decls: &mut [Decl], resolution: &Resolution, map: &RenameMap) {
    if map.is_empty() {
        return;
    }
    for decl in decls.iter_mut() {
        let mut r = Renamer {
            resolution,
            map,
            file: decl.file(),
        };
        match decl {
            Decl::Type(d) | Decl::Other(d) => r.visit_item_mut(&mut d.item),
            Decl::Values(g) => {
                for entry in &mut g.entries {
                    r.file = entry.tag.file;
                    r.visit_ident_mut(&mut entry.ident);
                    r.visit_type_mut(&mut entry.ty);
                    r.visit_expr_mut(&mut entry.init);
                }
            }
            Decl::Func(f) => r.visit_item_fn_mut(&mut f.item),
            Decl::Impl(imp) => {
                r.visit_item_impl_mut(&mut imp.header);
                for entry in &mut imp.entries {
                    r.file = entry.tag.file;
                    r.visit_impl_item_mut(&mut entry.item);
                }
            }
            Decl::Import(u) => r.visit_item_use_mut(&mut u.item),
            Decl::Unnamed(u) => r.visit_item_mut(&mut u.item),
        }
    }
    debug!(bindings = map.len(), "renamed template symbols");
}

struct Renamer<'a> {
    resolution: &'a Resolution,
    map: &'a RenameMap,
    file: FileId,
}

impl<'a> Renamer<'a> {
    fn replacement(&self, ident: &Ident) -> Option<&'a Replacement> {
        let map = self.map;
        self.resolution
            .symbols_of(self.file, ident)
            .iter()
            .find_map(|id| map.get(*id))
    }

    /// Respanned replacement type for a path whose first segment is a bare
    /// type placeholder.
    fn leading_type(&self, path: &Path) -> Option<Type> {
        if path.leading_colon.is_some() {
            return None;
        }
        let first = path.segments.first()?;
        if !first.arguments.is_none() {
            return None;
        }
        match self.replacement(&first.ident)? {
            Replacement::Type(ty) => Some(respan(&**ty, first.ident.span())),
            _ => None,
        }
    }

    /// Replaces the first segment of `path` with `with`, visiting only the kept tail.
    fn splice_path(&mut self, path: &mut Path, with: Path, turbofish: bool) {
        let rest: Vec<PathSegment> = path.segments.iter().skip(1).cloned().collect();
        let mut segments = with.segments;
        if turbofish {
            for seg in segments.iter_mut() {
                if let PathArguments::AngleBracketed(args) = &mut seg.arguments {
                    args.colon2_token = Some(Default::default());
                }
            }
        }
        let spliced = segments.len();
        segments.extend(rest);
        path.leading_colon = with.leading_colon;
        path.segments = segments;
        for seg in path.segments.iter_mut().skip(spliced) {
            self.visit_path_arguments_mut(&mut seg.arguments);
        }
    }

    /// Rewrites a qualifiable path led by a type placeholder: plain paths are
    /// spliced, other types use the `<Ty>::rest` form.
    fn splice_qualified(&mut self, qself: &mut Option<QSelf>, path: &mut Path, turbofish: bool) -> bool {
        if qself.is_some() {
            return false;
        }
        let Some(repl) = self.leading_type(path) else {
            return false;
        };
        let rest_empty = path.segments.len() == 1;
        match repl {
            Type::Path(tp) if tp.qself.is_none() && (rest_empty || is_plain_path(&tp.path)) => {
                self.splice_path(path, tp.path, turbofish && rest_empty);
            }
            _ if rest_empty => return false,
            other => {
                *qself = Some(QSelf {
                    lt_token: Default::default(),
                    ty: Box::new(other),
                    position: 0,
                    as_token: None,
                    gt_token: Default::default(),
                });
                path.leading_colon = Some(Default::default());
                path.segments = path.segments.iter().skip(1).cloned().collect();
                for seg in path.segments.iter_mut() {
                    self.visit_path_arguments_mut(&mut seg.arguments);
                }
            }
        }
        true
    }

    /// Format-string captures: renamed values keep the capture form, bound
    /// values turn into trailing positional arguments referenced by index.
    fn rename_captures(&self, path: &Path, tokens: TokenStream) -> TokenStream {
        let Some(mut args) = FormatArgs::parse(path, &tokens) else {
            return tokens;
        };
        let map = self.map;
        let base = args.positional_len();
        let span = args.literal.span();
        let mut bound: Vec<String> = Vec::new();
        let mut edits = Vec::new();
        for capture in args.captures(self.file) {
            let repl = self
                .resolution
                .symbols_at(capture.pos)
                .iter()
                .find_map(|id| map.get(*id));
            match repl {
                Some(Replacement::Ident(new)) => edits.push((capture.range, new.to_string())),
                Some(Replacement::Expr(expr)) => {
                    let idx = match bound.iter().position(|name| *name == capture.name) {
                        Some(idx) => idx,
                        None => {
                            bound.push(capture.name.clone());
                            args.push_positional(parenthesize(respan(&**expr, span)).to_token_stream());
                            bound.len() - 1
                        }
                    };
                    edits.push((capture.range, (base + idx).to_string()));
                }
                Some(Replacement::Type(_)) | None => {}
            }
        }
        if edits.is_empty() || !args.edit_literal(&edits) {
            return tokens;
        }
        args.into_tokens()
    }

    fn rename_tokens(&self, tokens: TokenStream) -> TokenStream {
        let trees: Vec<TokenTree> = tokens.into_iter().collect();
        let mut out = TokenStream::new();
        for (idx, tt) in trees.iter().enumerate() {
            match tt {
                TokenTree::Group(g) => {
                    let mut group = Group::new(g.delimiter(), self.rename_tokens(g.stream()));
                    group.set_span(g.span());
                    out.extend([TokenTree::Group(group)]);
                }
                TokenTree::Ident(ident) => match self.replacement(ident) {
                    Some(Replacement::Ident(new)) => {
                        let mut new = new.clone();
                        new.set_span(ident.span());
                        out.extend([TokenTree::Ident(new)]);
                    }
                    Some(Replacement::Type(ty)) => {
                        let tokens = respan_tokens(ty.to_token_stream(), ident.span());
                        let plain = matches!(&**ty, Type::Path(p) if p.qself.is_none() && is_plain_path(&p.path));
                        if !plain && starts_with_path_sep(&trees[idx + 1..]) {
                            out.extend(quote! { < #tokens > });
                        } else {
                            out.extend(tokens);
                        }
                    }
                    Some(Replacement::Expr(expr)) => {
                        out.extend(parenthesize(respan(&**expr, ident.span())).to_token_stream());
                    }
                    None => out.extend([tt.clone()]),
                },
                _ => out.extend([tt.clone()]),
            }
        }
        out
    }
}

impl VisitMut for Renamer<'_> {
    fn visit_attribute_mut(&mut self, _: &mut Attribute) {}

    fn visit_ident_mut(&mut self, ident: &mut Ident) {
        if let Some(Replacement::Ident(new)) = self.replacement(ident) {
            let mut new = new.clone();
            new.set_span(ident.span());
            *ident = new;
        }
    }

    fn visit_type_mut(&mut self, ty: &mut Type) {
        if let Type::Path(tp) = ty {
            if tp.qself.is_none() && tp.path.segments.len() == 1 {
                if let Some(repl) = self.leading_type(&tp.path) {
                    *ty = repl;
                    return;
                }
            }
        }
        visit_mut::visit_type_mut(self, ty);
    }

    fn visit_type_path_mut(&mut self, tp: &mut TypePath) {
        if !self.splice_qualified(&mut tp.qself, &mut tp.path, false) {
            visit_mut::visit_type_path_mut(self, tp);
        }
    }

    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if let Expr::Path(ep) = expr {
            if let Some(repl) = self.expr_replacement(ep) {
                *expr = repl;
                return;
            }
        }
        visit_mut::visit_expr_mut(self, expr);
    }

    fn visit_expr_path_mut(&mut self, ep: &mut ExprPath) {
        if !self.splice_qualified(&mut ep.qself, &mut ep.path, true) {
            visit_mut::visit_expr_path_mut(self, ep);
        }
    }

    fn visit_expr_struct_mut(&mut self, es: &mut ExprStruct) {
        if self.splice_qualified(&mut es.qself, &mut es.path, true) {
            for field in es.fields.iter_mut() {
                self.visit_field_value_mut(field);
            }
            if let Some(rest) = &mut es.rest {
                self.visit_expr_mut(rest);
            }
            return;
        }
        visit_mut::visit_expr_struct_mut(self, es);
    }

    fn visit_pat_mut(&mut self, pat: &mut Pat) {
        let target = match pat {
            Pat::Ident(p) if p.subpat.is_none() && p.by_ref.is_none() => {
                Some(ExprPath {
                    attrs: Vec::new(),
                    qself: None,
                    path: Path::from(p.ident.clone()),
                })
            }
            Pat::Path(p) => Some(p.clone()),
            _ => None,
        };
        if let Some(repl) = target.and_then(|ep| self.expr_replacement(&ep)) {
            *pat = match repl {
                Expr::Lit(lit) => Pat::Lit(lit),
                other => Pat::Verbatim(other.to_token_stream()),
            };
            return;
        }
        visit_mut::visit_pat_mut(self, pat);
    }

    fn visit_pat_struct_mut(&mut self, ps: &mut PatStruct) {
        if self.splice_qualified(&mut ps.qself, &mut ps.path, true) {
            for field in ps.fields.iter_mut() {
                self.visit_pat_mut(&mut field.pat);
            }
            return;
        }
        visit_mut::visit_pat_struct_mut(self, ps);
    }

    fn visit_pat_tuple_struct_mut(&mut self, ps: &mut PatTupleStruct) {
        if self.splice_qualified(&mut ps.qself, &mut ps.path, true) {
            for elem in ps.elems.iter_mut() {
                self.visit_pat_mut(elem);
            }
            return;
        }
        visit_mut::visit_pat_tuple_struct_mut(self, ps);
    }

    fn visit_path_mut(&mut self, path: &mut Path) {
        if let Some(Type::Path(tp)) = self.leading_type(path) {
            if tp.qself.is_none() {
                self.splice_path(path, tp.path, false);
                return;
            }
        }
        visit_mut::visit_path_mut(self, path);
    }

    fn visit_field_value_mut(&mut self, fv: &mut FieldValue) {
        if fv.colon_token.is_none() {
            let replaced = match &fv.expr {
                Expr::Path(p) => p
                    .path
                    .get_ident()
                    .is_some_and(|i| self.replacement(i).is_some()),
                _ => false,
            };
            if replaced {
                fv.colon_token = Some(Default::default());
            }
            self.visit_expr_mut(&mut fv.expr);
            return;
        }
        visit_mut::visit_field_value_mut(self, fv);
    }

    fn visit_use_tree_mut(&mut self, tree: &mut UseTree) {
        match tree {
            UseTree::Name(name) => {
                if let Some(Replacement::Ident(new)) = self.replacement(&name.ident) {
                    let mut rename = new.clone();
                    rename.set_span(name.ident.span());
                    *tree = UseTree::Rename(UseRename {
                        ident: name.ident.clone(),
                        as_token: Default::default(),
                        rename,
                    });
                }
            }
            UseTree::Rename(r) => {
                if let Some(Replacement::Ident(new)) = self.replacement(&r.rename) {
                    let mut new = new.clone();
                    new.set_span(r.rename.span());
                    r.rename = new;
                }
            }
            UseTree::Path(p) => self.visit_use_tree_mut(&mut p.tree),
            UseTree::Group(g) => {
                for item in g.items.iter_mut() {
                    self.visit_use_tree_mut(item);
                }
            }
            UseTree::Glob(_) => {}
        }
    }

    fn visit_macro_mut(&mut self, m: &mut Macro) {
        self.visit_path_mut(&mut m.path);
        let tokens = self.rename_captures(&m.path, std::mem::take(&mut m.tokens));
        m.tokens = self.rename_tokens(tokens);
    }
}

impl Renamer<'_> {
    /// Literal (or path) standing in for a single-segment value path.
    fn expr_replacement(&self, ep: &ExprPath) -> Option<Expr> {
        if ep.qself.is_some() || ep.path.leading_colon.is_some() || ep.path.segments.len() != 1 {
            return None;
        }
        let seg = &ep.path.segments[0];
        if !seg.arguments.is_none() {
            return None;
        }
        match self.replacement(&seg.ident)? {
            Replacement::Expr(expr) => Some(parenthesize(respan(&**expr, seg.ident.span()))),
            _ => None,
        }
    }
}

fn is_plain_path(path: &Path) -> bool {
    path.segments.iter().all(|s| s.arguments.is_none())
}

fn starts_with_path_sep(trees: &[TokenTree]) -> bool {
    matches!(
        trees,
        [TokenTree::Punct(a), TokenTree::Punct(b), ..]
            if a.as_char() == ':' && a.spacing() == Spacing::Joint && b.as_char() == ':'
    )
}

fn parenthesize(expr: Expr) -> Expr {
    match expr {
        Expr::Lit(_)
        | Expr::Path(_)
        | Expr::Paren(_)
        | Expr::Call(_)
        | Expr::MethodCall(_)
        | Expr::Field(_)
        | Expr::Index(_)
        | Expr::Macro(_)
        | Expr::Tuple(_)
        | Expr::Array(_)
        | Expr::Block(_)
        | Expr::Struct(_) => expr,
        other => Expr::Paren(ExprParen {
            attrs: Vec::new(),
            paren_token: Default::default(),
            expr: Box::new(other),
        }),
    }
}

/// Gives every token of a spliced replacement the placeholder's span, so the
/// result reads as one occurrence at the placeholder's position.
fn respan<T: ToTokens + Parse + Clone>(node: &T, span: Span) -> T {
    syn::parse2(respan_tokens(node.to_token_stream(), span)).unwrap_or_else(|_| node.clone())
}

fn respan_tokens(tokens: TokenStream, span: Span) -> TokenStream {
    tokens
        .into_iter()
        .map(|tt| match tt {
            TokenTree::Group(g) => {
                let mut group = Group::new(g.delimiter(), respan_tokens(g.stream(), span));
                group.set_span(span);
                TokenTree::Group(group)
            }
            mut other => {
                other.set_span(span);
                other
            }
        })
        .collect()
}
