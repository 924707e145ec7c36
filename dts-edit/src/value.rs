//! Property value chunks (spec.md §3, "Value Chunk").
//!
//! A closed sum type, per spec.md §9's design note: implementations should
//! model the four chunk kinds as a tagged enum so the Parameter Engine can
//! pattern-match on the tag rather than sniffing heterogeneous data.

use std::fmt;

/// One term inside a `<...>` cell vector: either an integer literal (kept
/// in both parsed and original textual form, so re-emission is exact) or a
/// `&label` reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CellTerm {
    Int { value: i128, text: String },
    LabelRef(String),
}

impl CellTerm {
    pub fn int(value: i128) -> Self {
        CellTerm::Int {
            value,
            text: format!("{value:#x}"),
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            CellTerm::Int { value, .. } => Some(*value),
            CellTerm::LabelRef(_) => None,
        }
    }
}

impl fmt::Display for CellTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellTerm::Int { text, .. } => f.write_str(text),
            CellTerm::LabelRef(l) => write!(f, "&{l}"),
        }
    }
}

/// One chunk of a property's right-hand side (spec.md §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Chunk {
    /// A quoted string value.
    Str(String),
    /// A `&label` occurring as a whole value (not inside `<...>`).
    LabelRef(String),
    /// A `<...>` vector of integer-or-labelref terms. `elem_size` is in
    /// bytes and is one of 1, 2, 4, 8 (default 4, set by `/bits/ N`).
    Cells { elem_size: u8, items: Vec<CellTerm> },
    /// A `[...]` vector of hex byte tokens.
    Bytes(Vec<u8>),
}

impl Chunk {
    pub fn cells(items: Vec<CellTerm>) -> Self {
        Chunk::Cells {
            elem_size: 4,
            items,
        }
    }

    /// True if this chunk is a single-cell `<&label>`, i.e. the "target"
    /// shape used throughout the override grammar (spec.md §4.3).
    pub fn as_single_labelref_cell(&self) -> Option<&str> {
        match self {
            Chunk::Cells { elem_size: 4, items } if items.len() == 1 => match &items[0] {
                CellTerm::LabelRef(l) => Some(l.as_str()),
                CellTerm::Int { .. } => None,
            },
            _ => None,
        }
    }

    /// True if this chunk is `<0>`, the fragment-enable "no node" target.
    pub fn is_zero_cell(&self) -> bool {
        matches!(
            self,
            Chunk::Cells { elem_size: 4, items } if items.len() == 1
                && matches!(items[0], CellTerm::Int { value: 0, .. })
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Chunk::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chunk::Str(s) => write!(f, "\"{}\"", escape(s)),
            Chunk::LabelRef(l) => write!(f, "&{l}"),
            Chunk::Cells { items, .. } => {
                write!(f, "<")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ">")
            }
            Chunk::Bytes(bytes) => {
                write!(f, "[")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{b:02x}")?;
                }
                write!(f, "]")
            }
        }
    }
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
