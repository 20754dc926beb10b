use proc_macro2::Ident;
use quote::{quote, ToTokens};
use syn::parse::{Parse, ParseStream};
use syn::{Attribute, Expr, ImplItem, Item, ItemImpl, ItemMacro, ItemUse, StaticMutability, Token, Type, Visibility};

use crate::source::FileId;
use crate::symbols::SymbolId;

/// Where a declaration's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub file: FileId,
    pub symbol: Option<SymbolId>,
}

impl Tag {
    pub fn new(file: FileId) -> Self {
        Tag { file, symbol: None }
    }
}

#[derive(Debug, Clone)]
pub enum Decl {
    Type(ItemDecl),
    Values(ValueGroup),
    Func(FuncDecl),
    Impl(ImplDecl),
    Import(ImportDecl),
    Unnamed(UnnamedDecl),
    Other(ItemDecl),
}

/// A struct, enum, union, type alias, trait, or (for `Decl::Other`) a named module,
/// `macro_rules!` macro, or `extern crate`.
#[derive(Debug, Clone)]
pub struct ItemDecl {
    pub item: Item,
    pub tag: Tag,
}

impl ItemDecl {
    pub fn ident(&self) -> Option<&Ident> {
        item_ident(&self.item)
    }

    pub fn name(&self) -> Option<String> {
        self.ident().map(|i| i.to_string())
    }
}

#[derive(Debug, Clone)]
pub enum ValueKind {
    Const,
    Static,
    /// Keeps the original `thread_local!` invocation, minus its body.
    ThreadLocal(Box<ItemMacro>),
}

#[derive(Debug, Clone)]
pub struct ValueGroup {
    pub kind: ValueKind,
    pub file: FileId,
    pub entries: Vec<ValueEntry>,
}

#[derive(Debug, Clone)]
pub struct ValueEntry {
    pub attrs: Vec<Attribute>,
    pub vis: Visibility,
    pub mutability: StaticMutability,
    pub ident: Ident,
    pub ty: Box<Type>,
    pub init: Box<Expr>,
    pub tag: Tag,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub item: syn::ItemFn,
    pub tag: Tag,
}

#[derive(Debug, Clone)]
pub struct ImplDecl {
    /// The impl block with `items` emptied; entries live in `entries`.
    pub header: ItemImpl,
    pub file: FileId,
    pub entries: Vec<ImplEntry>,
}

impl ImplDecl {
    pub fn self_name(&self) -> Option<String> {
        type_name(&self.header.self_ty)
    }

    pub fn trait_name(&self) -> Option<String> {
        self.header
            .trait_
            .as_ref()
            .and_then(|(_, path, _)| path.segments.last())
            .map(|seg| seg.ident.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ImplEntry {
    pub item: ImplItem,
    pub tag: Tag,
}

impl ImplEntry {
    pub fn ident(&self) -> Option<&Ident> {
        match &self.item {
            ImplItem::Const(c) => Some(&c.ident),
            ImplItem::Fn(f) => Some(&f.sig.ident),
            ImplItem::Type(t) => Some(&t.ident),
            _ => None,
        }
    }

    pub fn attrs_mut(&mut self) -> Option<&mut Vec<Attribute>> {
        match &mut self.item {
            ImplItem::Const(c) => Some(&mut c.attrs),
            ImplItem::Fn(f) => Some(&mut f.attrs),
            ImplItem::Type(t) => Some(&mut t.attrs),
            ImplItem::Macro(m) => Some(&mut m.attrs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub item: ItemUse,
    pub file: FileId,
}

#[derive(Debug, Clone)]
pub struct UnnamedDecl {
    pub item: Item,
    pub file: FileId,
}

impl UnnamedDecl {
    /// Token text used for duplicate detection.
    pub fn text(&self) -> String {
        self.item.to_token_stream().to_string()
    }
}

impl Decl {
    pub fn file(&self) -> FileId {
        match self {
            Decl::Type(d) | Decl::Other(d) => d.tag.file,
            Decl::Values(g) => g.file,
            Decl::Func(f) => f.tag.file,
            Decl::Impl(i) => i.file,
            Decl::Import(u) => u.file,
            Decl::Unnamed(u) => u.file,
        }
    }

    pub fn into_items(self) -> Vec<Item> {
        match self {
            Decl::Type(d) | Decl::Other(d) => vec![d.item],
            Decl::Func(f) => vec![Item::Fn(f.item)],
            Decl::Import(u) => vec![Item::Use(u.item)],
            Decl::Unnamed(u) => vec![u.item],
            Decl::Impl(i) => {
                let mut item = i.header;
                item.items = i.entries.into_iter().map(|e| e.item).collect();
                vec![Item::Impl(item)]
            }
            Decl::Values(g) => raise_values(g),
        }
    }
}

pub fn lower_items(file: FileId, items: Vec<Item>) -> Vec<Decl> {
    items.into_iter().map(|item| lower_item(file, item)).collect()
}

fn lower_item(file: FileId, item: Item) -> Decl {
    let tag = Tag::new(file);
    match item {
        Item::Struct(_) | Item::Enum(_) | Item::Union(_) | Item::Type(_) | Item::Trait(_) => {
            Decl::Type(ItemDecl { item, tag })
        }
        Item::Const(c) if c.ident == "_" => Decl::Unnamed(UnnamedDecl {
            item: Item::Const(c),
            file,
        }),
        Item::Const(c) => Decl::Values(ValueGroup {
            kind: ValueKind::Const,
            file,
            entries: vec![ValueEntry {
                attrs: c.attrs,
                vis: c.vis,
                mutability: StaticMutability::None,
                ident: c.ident,
                ty: c.ty,
                init: c.expr,
                tag,
            }],
        }),
        Item::Static(s) => Decl::Values(ValueGroup {
            kind: ValueKind::Static,
            file,
            entries: vec![ValueEntry {
                attrs: s.attrs,
                vis: s.vis,
                mutability: s.mutability,
                ident: s.ident,
                ty: s.ty,
                init: s.expr,
                tag,
            }],
        }),
        Item::Fn(item) => Decl::Func(FuncDecl { item, tag }),
        Item::Impl(mut header) => {
            let entries = std::mem::take(&mut header.items)
                .into_iter()
                .map(|item| ImplEntry { item, tag })
                .collect();
            Decl::Impl(ImplDecl {
                header,
                file,
                entries,
            })
        }
        Item::Use(item) => Decl::Import(ImportDecl { item, file }),
        Item::Macro(m) if m.ident.is_some() => Decl::Other(ItemDecl {
            item: Item::Macro(m),
            tag,
        }),
        Item::Macro(m) => lower_macro(file, m),
        Item::Mod(_) | Item::ExternCrate(_) | Item::TraitAlias(_) => {
            Decl::Other(ItemDecl { item, tag })
        }
        other => Decl::Unnamed(UnnamedDecl { item: other, file }),
    }
}

fn lower_macro(file: FileId, m: ItemMacro) -> Decl {
    let is_thread_local = m
        .mac
        .path
        .segments
        .last()
        .is_some_and(|seg| seg.ident == "thread_local");
    if is_thread_local {
        if let Ok(parsed) = m.mac.parse_body::<ThreadLocalEntries>() {
            let mut header = m;
            header.mac.tokens = Default::default();
            return Decl::Values(ValueGroup {
                kind: ValueKind::ThreadLocal(Box::new(header)),
                file,
                entries: parsed
                    .0
                    .into_iter()
                    .map(|e| ValueEntry {
                        attrs: e.attrs,
                        vis: e.vis,
                        mutability: StaticMutability::None,
                        ident: e.ident,
                        ty: Box::new(e.ty),
                        init: Box::new(e.init),
                        tag: Tag::new(file),
                    })
                    .collect(),
            });
        }
    }
    Decl::Unnamed(UnnamedDecl {
        item: Item::Macro(m),
        file,
    })
}

fn raise_values(group: ValueGroup) -> Vec<Item> {
    match group.kind {
        ValueKind::Const => group
            .entries
            .into_iter()
            .map(|e| {
                Item::Const(syn::ItemConst {
                    attrs: e.attrs,
                    vis: e.vis,
                    const_token: Default::default(),
                    ident: e.ident,
                    generics: Default::default(),
                    colon_token: Default::default(),
                    ty: e.ty,
                    eq_token: Default::default(),
                    expr: e.init,
                    semi_token: Default::default(),
                })
            })
            .collect(),
        ValueKind::Static => group
            .entries
            .into_iter()
            .map(|e| {
                Item::Static(syn::ItemStatic {
                    attrs: e.attrs,
                    vis: e.vis,
                    static_token: Default::default(),
                    mutability: e.mutability,
                    ident: e.ident,
                    colon_token: Default::default(),
                    ty: e.ty,
                    eq_token: Default::default(),
                    expr: e.init,
                    semi_token: Default::default(),
                })
            })
            .collect(),
        ValueKind::ThreadLocal(header) => {
            let entries = group.entries.iter().map(|e| {
                let ValueEntry {
                    attrs,
                    vis,
                    ident,
                    ty,
                    init,
                    ..
                } = e;
                quote! { #(#attrs)* #vis static #ident: #ty = #init; }
            });
            let mut item = *header;
            item.mac.tokens = quote! { #(#entries)* };
            vec![Item::Macro(item)]
        }
    }
}

struct ThreadLocalEntries(Vec<ThreadLocalEntry>);

struct ThreadLocalEntry {
    attrs: Vec<Attribute>,
    vis: Visibility,
    ident: Ident,
    ty: Type,
    init: Expr,
}

impl Parse for ThreadLocalEntries {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut entries = Vec::new();
        while !input.is_empty() {
            let attrs = input.call(Attribute::parse_outer)?;
            let vis: Visibility = input.parse()?;
            input.parse::<Token![static]>()?;
            let ident: Ident = input.parse()?;
            input.parse::<Token![:]>()?;
            let ty: Type = input.parse()?;
            input.parse::<Token![=]>()?;
            let init: Expr = input.parse()?;
            entries.push(ThreadLocalEntry {
                attrs,
                vis,
                ident,
                ty,
                init,
            });
            if input.is_empty() {
                break;
            }
            input.parse::<Token![;]>()?;
        }
        Ok(ThreadLocalEntries(entries))
    }
}

pub fn item_ident(item: &Item) -> Option<&Ident> {
    match item {
        Item::Struct(i) => Some(&i.ident),
        Item::Enum(i) => Some(&i.ident),
        Item::Union(i) => Some(&i.ident),
        Item::Type(i) => Some(&i.ident),
        Item::Trait(i) => Some(&i.ident),
        Item::TraitAlias(i) => Some(&i.ident),
        Item::Mod(i) => Some(&i.ident),
        Item::Macro(i) => i.ident.as_ref(),
        Item::ExternCrate(i) => Some(i.rename.as_ref().map_or(&i.ident, |(_, r)| r)),
        Item::Fn(i) => Some(&i.sig.ident),
        Item::Const(i) => Some(&i.ident),
        Item::Static(i) => Some(&i.ident),
        _ => None,
    }
}

pub fn item_attrs_mut(item: &mut Item) -> Option<&mut Vec<Attribute>> {
    match item {
        Item::Struct(i) => Some(&mut i.attrs),
        Item::Enum(i) => Some(&mut i.attrs),
        Item::Union(i) => Some(&mut i.attrs),
        Item::Type(i) => Some(&mut i.attrs),
        Item::Trait(i) => Some(&mut i.attrs),
        Item::TraitAlias(i) => Some(&mut i.attrs),
        Item::Mod(i) => Some(&mut i.attrs),
        Item::Macro(i) => Some(&mut i.attrs),
        Item::ExternCrate(i) => Some(&mut i.attrs),
        Item::Fn(i) => Some(&mut i.attrs),
        _ => None,
    }
}

/// Last path segment of a type, looking through references and parentheses.
pub fn type_ident(ty: &Type) -> Option<&Ident> {
    match ty {
        Type::Path(p) => p.path.segments.last().map(|s| &s.ident),
        Type::Reference(r) => type_ident(&r.elem),
        Type::Paren(p) => type_ident(&p.elem),
        Type::Group(g) => type_ident(&g.elem),
        _ => None,
    }
}

pub fn type_name(ty: &Type) -> Option<String> {
    type_ident(ty).map(|i| i.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(src: &str) -> Vec<Decl> {
        let file = syn::parse_file(src).expect("parse");
        lower_items(FileId(0), file.items)
    }

    #[test]
    fn thread_local_block_becomes_one_group() {
        let decls = lower(
            "thread_local! {\n    static X: u32 = 1;\n    pub static Y: std::cell::Cell<u8> = std::cell::Cell::new(0)\n}\n",
        );
        assert_eq!(decls.len(), 1);
        let Decl::Values(group) = &decls[0] else {
            panic!("expected a value group");
        };
        assert!(matches!(group.kind, ValueKind::ThreadLocal(_)));
        let names: Vec<String> = group.entries.iter().map(|e| e.ident.to_string()).collect();
        assert_eq!(names, ["X", "Y"]);
    }

    #[test]
    fn unnamed_and_named_items_are_classified() {
        let decls = lower(
            "const _: () = ();\nconst N: usize = 3;\nmacro_rules! m { () => {} }\nm!();\nmod inner {}\n",
        );
        assert!(matches!(decls[0], Decl::Unnamed(_)));
        assert!(matches!(decls[1], Decl::Values(_)));
        assert!(matches!(decls[2], Decl::Other(_)));
        assert!(matches!(decls[3], Decl::Unnamed(_)));
        assert!(matches!(decls[4], Decl::Other(_)));
    }

    #[test]
    fn impl_names_come_from_header() {
        let decls = lower("impl<T> std::fmt::Debug for &Wrapper<T> { fn fmt(&self) {} }\n");
        let Decl::Impl(imp) = &decls[0] else {
            panic!("expected impl");
        };
        assert_eq!(imp.self_name().as_deref(), Some("Wrapper"));
        assert_eq!(imp.trait_name().as_deref(), Some("Debug"));
        assert_eq!(imp.entries[0].ident().map(|i| i.to_string()).as_deref(), Some("fmt"));
    }

    #[test]
    fn raising_a_group_keeps_every_entry() {
        let decls = lower("thread_local! { static X: u32 = 1; static Y: u32 = 2; }\n");
        let items = decls.into_iter().next().expect("decl").into_items();
        let text = items[0].to_token_stream().to_string();
        assert!(text.contains("static X"), "{text}");
        assert!(text.contains("static Y"), "{text}");
    }
}
