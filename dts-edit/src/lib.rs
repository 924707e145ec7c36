//! Parses, merges, and emits Device Tree Source (DTS) overlays.
//!
//! Six cooperating pieces, leaves-first: [`tokenizer`] turns source text
//! into a token stream (following `#include`/`/include/` and `#if*` skip
//! regions through a pluggable [`fileio::FileOpener`]); [`tree`] is the
//! in-memory device tree the [`parser`] builds from that stream;
//! [`params`] applies a single `dtparam` against a tree's `__overrides__`
//! node; [`compose`] renumbers, merges, and applies plugin overlays onto a
//! base; [`emit`] serializes a tree back to DTS text.

pub mod compose;
pub mod emit;
pub mod error;
pub mod fileio;
pub mod node;
pub mod params;
pub mod parser;
pub mod property;
pub mod token;
pub mod tokenizer;
pub mod tree;
pub mod value;
pub mod valueinterp;

pub use error::{DtsError, DtsResult, Warning, Warnings};
pub use node::{NodeData, NodeId};
pub use property::Property;
pub use tree::Tree;
pub use value::{CellTerm, Chunk};

use fileio::FileOpener;

/// Tokenizes and parses `path` through `opener`, the way the `ovmerge`
/// binary turns a CLI ovspec's base filename into a [`Tree`].
pub fn load(opener: &dyn FileOpener, path: &str) -> DtsResult<(Tree, Warnings)> {
    let tokens = tokenizer::Tokenizer::new(opener).tokenize(path)?;
    parser::parse(&tokens)
}
