use proc_macro2::Ident;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u32);

/// Location of an identifier token. Line is 1-based, column 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    pub file: FileId,
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub fn of(file: FileId, ident: &Ident) -> Pos {
        let start = ident.span().start();
        Pos {
            file,
            line: start.line,
            column: start.column,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn add(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile {
            name: name.into(),
            text: text.into(),
        });
        id
    }

    pub fn get(&self, id: FileId) -> &SourceFile {
        &self.files[id.0 as usize]
    }

    pub fn name(&self, id: FileId) -> &str {
        &self.get(id).name
    }

    /// Parses a registered file. Spans of the result carry real line/column info.
    pub fn parse(&self, id: FileId) -> syn::Result<syn::File> {
        syn::parse_file(&self.get(id).text)
    }
}

pub(crate) fn describe_syn_error(name: &str, err: &syn::Error) -> String {
    let start = err.span().start();
    format!("{name}:{}:{}: {err}", start.line, start.column + 1)
}
