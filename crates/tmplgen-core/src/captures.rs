use std::ops::Range;

use proc_macro2::{Literal, Punct, Spacing, TokenStream, TokenTree};
use syn::{LitStr, Path};

use crate::source::{FileId, Pos};

/// Format-style macros and the number of arguments before their format string.
const FORMAT_MACROS: &[(&str, usize)] = &[
    ("format", 0),
    ("format_args", 0),
    ("print", 0),
    ("println", 0),
    ("eprint", 0),
    ("eprintln", 0),
    ("panic", 0),
    ("unreachable", 0),
    ("todo", 0),
    ("unimplemented", 0),
    ("write", 1),
    ("writeln", 1),
    ("assert", 1),
    ("debug_assert", 1),
    ("assert_eq", 2),
    ("assert_ne", 2),
    ("debug_assert_eq", 2),
    ("debug_assert_ne", 2),
];

/// An identifier captured implicitly by a format string (`{name}`, `{:name$}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub name: String,
    /// Byte range of the name inside the literal's source text.
    pub range: Range<usize>,
    pub pos: Pos,
}

/// Arguments of a format-style macro call, split at top-level commas.
#[derive(Debug, Clone)]
pub struct FormatArgs {
    leading: Vec<Vec<TokenTree>>,
    pub literal: Literal,
    positional: Vec<Vec<TokenTree>>,
    named: Vec<Vec<TokenTree>>,
}

impl FormatArgs {
    pub fn parse(path: &Path, tokens: &TokenStream) -> Option<FormatArgs> {
        let name = path.segments.last()?.ident.to_string();
        let &(_, leading) = FORMAT_MACROS.iter().find(|(m, _)| *m == name)?;
        let mut args = split_args(tokens.clone());
        if args.len() <= leading {
            return None;
        }
        let rest = args.split_off(leading + 1);
        let literal = match args.pop()?.as_slice() {
            [TokenTree::Literal(lit)] if is_str_literal(lit) => lit.clone(),
            _ => return None,
        };
        let first_named = rest.iter().position(|arg| is_named(arg)).unwrap_or(rest.len());
        let mut positional = rest;
        let named = positional.split_off(first_named);
        Some(FormatArgs {
            leading: args,
            literal,
            positional,
            named,
        })
    }

    /// Implicit captures, minus names bound by an explicit `name = value` argument.
    pub fn captures(&self, file: FileId) -> Vec<Capture> {
        let named: Vec<String> = self
            .named
            .iter()
            .filter_map(|arg| match arg.first() {
                Some(TokenTree::Ident(ident)) => Some(ident.to_string()),
                _ => None,
            })
            .collect();
        scan(file, &self.literal)
            .into_iter()
            .filter(|c| !named.contains(&c.name))
            .collect()
    }

    pub fn positional_len(&self) -> usize {
        self.positional.len()
    }

    pub fn push_positional(&mut self, tokens: TokenStream) {
        self.positional.push(tokens.into_iter().collect());
    }

    /// Replaces ascending byte ranges of the format string's source text.
    /// Returns false, leaving the literal alone, if the result is not a string.
    pub fn edit_literal(&mut self, edits: &[(Range<usize>, String)]) -> bool {
        let mut repr = self.literal.to_string();
        for (range, text) in edits.iter().rev() {
            repr.replace_range(range.clone(), text);
        }
        match syn::parse_str::<LitStr>(&repr) {
            Ok(lit) => {
                let mut literal = lit.token();
                literal.set_span(self.literal.span());
                self.literal = literal;
                true
            }
            Err(_) => false,
        }
    }

    pub fn into_tokens(self) -> TokenStream {
        let args = self
            .leading
            .into_iter()
            .chain([vec![TokenTree::Literal(self.literal)]])
            .chain(self.positional)
            .chain(self.named);
        let mut out = TokenStream::new();
        for (idx, arg) in args.enumerate() {
            if idx > 0 {
                out.extend([TokenTree::Punct(Punct::new(',', Spacing::Alone))]);
            }
            out.extend(arg);
        }
        out
    }
}

fn split_args(tokens: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for tt in tokens {
        if matches!(&tt, TokenTree::Punct(p) if p.as_char() == ',') {
            out.push(std::mem::take(&mut current));
        } else {
            current.push(tt);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn is_named(arg: &[TokenTree]) -> bool {
    matches!(
        arg,
        [TokenTree::Ident(_), TokenTree::Punct(eq), ..]
            if eq.as_char() == '=' && eq.spacing() == Spacing::Alone
    )
}

fn is_str_literal(lit: &Literal) -> bool {
    let repr = lit.to_string();
    repr.starts_with('"') || repr.starts_with("r\"") || repr.starts_with("r#")
}

/// Finds `{name…}` arguments and `name$` counts in the literal's source text.
/// Positions are those of the name characters themselves.
fn scan(file: FileId, literal: &Literal) -> Vec<Capture> {
    let repr = literal.to_string();
    let chars: Vec<(usize, char)> = repr.char_indices().collect();
    let start = literal.span().start();
    let mut at = Vec::with_capacity(chars.len());
    let (mut line, mut column) = (start.line, start.column);
    for &(_, c) in &chars {
        at.push((line, column));
        if c == '\n' {
            line += 1;
            column = 0;
        } else {
            column += 1;
        }
    }
    let ch = |j: usize| chars.get(j).map(|&(_, c)| c);
    let offset = |j: usize| chars.get(j).map_or(repr.len(), |&(o, _)| o);
    let is_start = |c: char| c == '_' || c.is_alphabetic();
    let is_continue = |c: char| c == '_' || c.is_alphanumeric();

    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if ch(i) != Some('{') {
            i += 1;
            continue;
        }
        if ch(i + 1) == Some('{') {
            i += 2;
            continue;
        }
        let Some(close) = (i + 1..chars.len()).find(|&j| ch(j) == Some('}')) else {
            break;
        };
        // `\u{…}` escapes
        let escape = i >= 2 && ch(i - 1) == Some('u') && ch(i - 2) == Some('\\');
        let mut j = i + 1;
        while !escape && j < close {
            if !ch(j).is_some_and(is_start) {
                j += 1;
                continue;
            }
            let begin = j;
            while j < close && ch(j).is_some_and(is_continue) {
                j += 1;
            }
            let next = ch(j);
            let argument = begin == i + 1 && matches!(next, Some('}' | ':'));
            if argument || next == Some('$') {
                let (line, column) = at[begin];
                out.push(Capture {
                    name: repr[offset(begin)..offset(j)].to_string(),
                    range: offset(begin)..offset(j),
                    pos: Pos { file, line, column },
                });
            }
        }
        i = close + 1;
    }
    out
}
