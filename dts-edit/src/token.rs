//! Token kinds produced by the [`crate::tokenizer`] (spec.md §3, "Token").

use std::fmt;

/// A directive keyword recognized by the tokenizer (spec.md §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive {
    DtsV1,
    Plugin,
    MemReserve,
    Bits,
    DeleteNode,
    DeleteProperty,
    Include,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Directive::DtsV1 => "/dts-v1/",
            Directive::Plugin => "/plugin/",
            Directive::MemReserve => "/memreserve/",
            Directive::Bits => "/bits/",
            Directive::DeleteNode => "/delete-node/",
            Directive::DeleteProperty => "/delete-property/",
            Directive::Include => "#include",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// An identifier, number literal, node/property name fragment, etc. —
    /// the `[A-Za-z0-9,._+#@-]+` name class from spec.md §4.1.
    Ident(String),
    /// `&ident`, a whole-value label reference.
    Ref(String),
    /// `ident:`, a label declaration.
    Label(String),
    /// A double- or single-quoted string (escapes already resolved).
    Str(String),
    /// A quoted include path carrying whether it used `<...>` or `"..."`.
    IncludePath { path: String, angled: bool },
    /// A parenthesized negative integer literal, `(-N)`.
    NegInt(i128),
    Directive(Directive),
    /// Punctuation: one of `{ } ; = < > , [ ] /`.
    Punct(char),
    /// Marks a (re-)entry into a source file, for diagnostics and for the
    /// `-i` include-hierarchy report.
    FileMarker(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub file: String,
    pub line: usize,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "{s}"),
            TokenKind::Ref(s) => write!(f, "&{s}"),
            TokenKind::Label(s) => write!(f, "{s}:"),
            TokenKind::Str(s) => write!(f, "\"{s}\""),
            TokenKind::IncludePath { path, angled } => {
                if *angled {
                    write!(f, "<{path}>")
                } else {
                    write!(f, "\"{path}\"")
                }
            }
            TokenKind::NegInt(n) => write!(f, "({n})"),
            TokenKind::Directive(d) => write!(f, "{d}"),
            TokenKind::Punct(c) => write!(f, "{c}"),
            TokenKind::FileMarker(s) => write!(f, "<file {s}>"),
        }
    }
}
