//! Error and warning types shared by every stage of the pipeline.
//!
//! Every fallible operation in this crate returns a [`DtsError`]. Warnings
//! (spec.md §7's "only with `-w`" taxonomy) are not errors: they are
//! collected into a [`Warnings`] sink that callers can choose to print.

use std::fmt;

pub type DtsResult<T> = Result<T, DtsError>;

/// A fatal diagnostic. The taxonomy mirrors spec.md §7: IO, lexical, syntax,
/// and semantic errors all abort the run that produced them.
#[derive(thiserror::Error, Debug, Clone)]
pub enum DtsError {
    #[error("{path}: {source}")]
    Io { path: String, source: IoErrorMsg },

    #[error("{file}: cannot find include {path:?}")]
    IncludeNotFound { file: String, path: String },

    #[error("{file}: unrecognized directive {directive:?}")]
    UnknownDirective { file: String, directive: String },

    #[error("{file}: unsupported include target {path:?} (expected a header or .dts/.dtsi file)")]
    UnsupportedInclude { file: String, path: String },

    #[error("{file}: unrecognized token residue {residue:?}")]
    BadResidue { file: String, residue: String },

    #[error("{file}: unterminated string literal")]
    UnterminatedString { file: String },

    #[error("unexpected end of token stream, expected {expected:?}")]
    UnexpectedEof { expected: String },

    #[error("{file}: expected {expected:?}, found {found:?}")]
    UnexpectedToken {
        file: String,
        expected: String,
        found: String,
    },

    #[error("missing /dts-v1/; header")]
    MissingDtsVersion,

    #[error("{file}: unknown label `{label}`")]
    UnknownLabel { file: String, label: String },

    #[error("{file}: duplicated label `{label}` on distinct nodes")]
    DuplicateLabel { file: String, label: String },

    #[error("invalid /bits/ size {0} (must be one of 8, 16, 32, 64)")]
    InvalidBitsSize(u32),

    #[error("missing fragment `{0}` referenced by fragment-enable override")]
    MissingFragment(u32),

    #[error("missing __overrides__ node; dtparam `{0}` cannot be applied")]
    MissingOverrides(String),

    #[error("unknown dtparam `{0}`")]
    UnknownParam(String),

    #[error("duplicate override parameter `{0}` while merging plugins")]
    DuplicateOverrideParam(String),

    #[error("invalid override declaration `{0}`")]
    InvalidOverrideDeclaration(String),

    #[error("override offset {offset} is not a multiple of element size {elem_size}")]
    UnalignedOffset { offset: usize, elem_size: usize },

    #[error("no target or target-path resolves for fragment `{0}`")]
    MissingTarget(String),

    #[error("invalid boolean value {0:?}")]
    BadBoolean(String),

    #[error("invalid integer value {0:?}")]
    BadInteger(String),

    #[error("invalid path `{0}`")]
    InvalidPath(String),

    #[error("{0}")]
    Other(String),
}

/// A cloneable stand-in for `std::io::Error`, since `DtsError` derives
/// `Clone` (trees are cloned freely during composition) but `io::Error`
/// is not `Clone`.
#[derive(Debug, Clone)]
pub struct IoErrorMsg(pub String);

impl fmt::Display for IoErrorMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for IoErrorMsg {}

impl From<std::io::Error> for IoErrorMsg {
    fn from(e: std::io::Error) -> Self {
        IoErrorMsg(e.to_string())
    }
}

/// A single non-fatal diagnostic, only surfaced with `-w`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    LabelOnProperty { file: String, label: String },
    DuplicateLabelSameNode { file: String, label: String },
    MultipleLabelsSameNode { file: String, labels: Vec<String> },
    JunkAfterTopLevel { file: String, text: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::LabelOnProperty { file, label } => {
                write!(f, "{file}: warning: label `{label}` on a property is ignored")
            }
            Warning::DuplicateLabelSameNode { file, label } => {
                write!(f, "{file}: warning: duplicate label `{label}` on the same node")
            }
            Warning::MultipleLabelsSameNode { file, labels } => {
                write!(f, "{file}: warning: multiple labels ({}) on the same node", labels.join(", "))
            }
            Warning::JunkAfterTopLevel { file, text } => {
                write!(f, "{file}: warning: junk after top level: {text:?}")
            }
        }
    }
}

/// Accumulates [`Warning`]s produced during a run.
#[derive(Debug, Clone, Default)]
pub struct Warnings(pub Vec<Warning>);

impl Warnings {
    pub fn push(&mut self, w: Warning) {
        self.0.push(w);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
