//! DTS grammar (spec.md §4.2): consumes a token stream and builds a
//! [`Tree`].

use crate::error::{DtsError, Warning, Warnings};
use crate::node::IncludeRef;
use crate::property::Property;
use crate::token::{Directive, Token, TokenKind};
use crate::tokenizer::parse_int_literal;
use crate::tree::Tree;
use crate::value::{CellTerm, Chunk};

struct Cursor<'t> {
    tokens: &'t [Token],
    idx: usize,
    file: String,
}

impl<'t> Cursor<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        let file = tokens
            .first()
            .map(|t| t.file.clone())
            .unwrap_or_default();
        Self {
            tokens,
            idx: 0,
            file,
        }
    }

    /// File-marker tokens are transparent: skip them, updating
    /// `current_file` for diagnostics (spec.md §4.2).
    fn skip_markers(&mut self) {
        while let Some(tok) = self.tokens.get(self.idx) {
            if let TokenKind::FileMarker(f) = &tok.kind {
                self.file = f.clone();
                self.idx += 1;
            } else {
                break;
            }
        }
    }

    fn peek_kind(&mut self) -> Option<TokenKind> {
        self.skip_markers();
        self.tokens.get(self.idx).map(|t| t.kind.clone())
    }

    fn bump(&mut self) -> Option<TokenKind> {
        self.skip_markers();
        let t = self.tokens.get(self.idx).map(|t| t.kind.clone());
        if t.is_some() {
            self.idx += 1;
        }
        t
    }

    fn expect_punct(&mut self, c: char) -> Result<(), DtsError> {
        match self.bump() {
            Some(TokenKind::Punct(p)) if p == c => Ok(()),
            other => Err(self.unexpected(&c.to_string(), other)),
        }
    }

    fn expect_ident(&mut self) -> Result<String, DtsError> {
        match self.bump() {
            Some(TokenKind::Ident(s)) => Ok(s),
            other => Err(self.unexpected("identifier", other)),
        }
    }

    fn expect_ref(&mut self) -> Result<String, DtsError> {
        match self.bump() {
            Some(TokenKind::Ref(s)) => Ok(s),
            other => Err(self.unexpected("&label", other)),
        }
    }

    fn expect_int(&mut self) -> Result<u64, DtsError> {
        match self.bump() {
            Some(TokenKind::Ident(s)) => parse_int_literal(&s)
                .map(|v| v as u64)
                .ok_or_else(|| DtsError::BadInteger(s)),
            other => Err(self.unexpected("integer literal", other)),
        }
    }

    fn expect_include_path(&mut self) -> Result<IncludeRef, DtsError> {
        match self.bump() {
            Some(TokenKind::IncludePath { path, angled }) => Ok(IncludeRef { path, angled }),
            other => Err(self.unexpected("include path", other)),
        }
    }

    fn unexpected(&self, expected: &str, found: Option<TokenKind>) -> DtsError {
        match found {
            Some(k) => DtsError::UnexpectedToken {
                file: self.file.clone(),
                expected: expected.to_string(),
                found: k.to_string(),
            },
            None => DtsError::UnexpectedEof {
                expected: expected.to_string(),
            },
        }
    }
}

/// Parses a token stream into a [`Tree`] (spec.md §4.2).
pub fn parse(tokens: &[Token]) -> Result<(Tree, Warnings), DtsError> {
    let mut cur = Cursor::new(tokens);
    let mut tree = Tree::new();
    let mut warnings = Warnings::default();
    let mut seen_dts_v1 = false;

    loop {
        let head = match cur.peek_kind() {
            None => break,
            Some(k) => k,
        };

        match head {
            TokenKind::Directive(Directive::DtsV1) => {
                cur.bump();
                cur.expect_punct(';')?;
                seen_dts_v1 = true;
            }
            TokenKind::Directive(Directive::Plugin) => {
                cur.bump();
                cur.expect_punct(';')?;
                tree.plugin = true;
            }
            TokenKind::Directive(Directive::MemReserve) => {
                cur.bump();
                let a = cur.expect_int()?;
                let b = cur.expect_int()?;
                cur.expect_punct(';')?;
                tree.add_memreserve(a, b);
            }
            TokenKind::Directive(Directive::Include) => {
                cur.bump();
                let inc = cur.expect_include_path()?;
                tree.add_include(inc);
            }
            TokenKind::Directive(Directive::DeleteNode) => {
                cur.bump();
                let label = cur.expect_ref()?;
                cur.expect_punct(';')?;
                let id = *tree
                    .labels
                    .get(&label)
                    .ok_or_else(|| DtsError::UnknownLabel {
                        file: cur.file.clone(),
                        label: label.clone(),
                    })?;
                tree.delete_node(id);
            }
            TokenKind::Punct('/') => {
                cur.bump();
                cur.expect_punct('{')?;
                let root = tree.root_id();
                parse_node_body(&mut cur, &mut tree, root, &mut warnings)?;
                cur.expect_punct(';')?;
            }
            TokenKind::Label(_) | TokenKind::Ref(_) => {
                let mut labels = Vec::new();
                while let Some(TokenKind::Label(l)) = cur.peek_kind() {
                    labels.push(l);
                    cur.bump();
                }
                let refname = cur.expect_ref()?;
                let id = *tree
                    .labels
                    .get(&refname)
                    .ok_or_else(|| DtsError::UnknownLabel {
                        file: cur.file.clone(),
                        label: refname.clone(),
                    })?;
                if labels.len() > 1 {
                    warnings.push(Warning::MultipleLabelsSameNode {
                        file: cur.file.clone(),
                        labels: labels.clone(),
                    });
                }
                for l in &labels {
                    tree.declare_label(id, l, &cur.file, &mut warnings)?;
                }
                cur.expect_punct('{')?;
                parse_node_body(&mut cur, &mut tree, id, &mut warnings)?;
                cur.expect_punct(';')?;
            }
            other => {
                warnings.push(Warning::JunkAfterTopLevel {
                    file: cur.file.clone(),
                    text: other.to_string(),
                });
                cur.bump();
            }
        }
    }

    if !seen_dts_v1 {
        return Err(DtsError::MissingDtsVersion);
    }
    Ok((tree, warnings))
}

fn parse_node_body(
    cur: &mut Cursor,
    tree: &mut Tree,
    node_id: crate::node::NodeId,
    warnings: &mut Warnings,
) -> Result<(), DtsError> {
    loop {
        let head = cur.peek_kind();
        match head {
            Some(TokenKind::Punct('}')) => {
                cur.bump();
                return Ok(());
            }
            None => {
                return Err(DtsError::UnexpectedEof {
                    expected: "'}'".to_string(),
                });
            }
            Some(TokenKind::Directive(Directive::DeleteNode)) => {
                cur.bump();
                let name = cur.expect_ident()?;
                cur.expect_punct(';')?;
                tree.delete_child_by_name(node_id, &name);
            }
            Some(TokenKind::Directive(Directive::DeleteProperty)) => {
                cur.bump();
                let name = cur.expect_ident()?;
                cur.expect_punct(';')?;
                tree.get_mut(node_id).properties.retain(|p| p.name != name);
            }
            Some(TokenKind::Directive(Directive::Include)) => {
                cur.bump();
                let inc = cur.expect_include_path()?;
                tree.add_include(inc);
            }
            _ => {
                let mut labels = Vec::new();
                while let Some(TokenKind::Label(l)) = cur.peek_kind() {
                    labels.push(l);
                    cur.bump();
                }
                let name = cur.expect_ident()?;
                match cur.peek_kind() {
                    Some(TokenKind::Punct('{')) => {
                        cur.bump();
                        let child = tree.get_or_add_child(node_id, &name);
                        if labels.len() > 1 {
                            warnings.push(Warning::MultipleLabelsSameNode {
                                file: cur.file.clone(),
                                labels: labels.clone(),
                            });
                        }
                        for l in &labels {
                            tree.declare_label(child, l, &cur.file, warnings)?;
                        }
                        parse_node_body(cur, tree, child, warnings)?;
                        cur.expect_punct(';')?;
                    }
                    Some(TokenKind::Punct('=')) => {
                        cur.bump();
                        for l in &labels {
                            warnings.push(Warning::LabelOnProperty {
                                file: cur.file.clone(),
                                label: l.clone(),
                            });
                        }
                        let chunks = parse_value_list(cur)?;
                        cur.expect_punct(';')?;
                        tree.write_property(node_id, Property::new(name, chunks));
                    }
                    Some(TokenKind::Punct(';')) => {
                        cur.bump();
                        for l in &labels {
                            warnings.push(Warning::LabelOnProperty {
                                file: cur.file.clone(),
                                label: l.clone(),
                            });
                        }
                        tree.write_property(node_id, Property::boolean(name));
                    }
                    other => return Err(cur.unexpected("'{', '=', or ';'", other)),
                }
            }
        }
    }
}

fn parse_value_list(cur: &mut Cursor) -> Result<Vec<Chunk>, DtsError> {
    let mut out = vec![parse_chunk(cur)?];
    while matches!(cur.peek_kind(), Some(TokenKind::Punct(','))) {
        cur.bump();
        out.push(parse_chunk(cur)?);
    }
    Ok(out)
}

fn parse_chunk(cur: &mut Cursor) -> Result<Chunk, DtsError> {
    match cur.peek_kind() {
        Some(TokenKind::Str(_)) => {
            let s = match cur.bump() {
                Some(TokenKind::Str(s)) => s,
                _ => unreachable!(),
            };
            Ok(Chunk::Str(s))
        }
        Some(TokenKind::Ref(_)) => {
            let l = match cur.bump() {
                Some(TokenKind::Ref(l)) => l,
                _ => unreachable!(),
            };
            Ok(Chunk::LabelRef(l))
        }
        Some(TokenKind::Punct('<')) => parse_cells(cur, 4),
        Some(TokenKind::Punct('[')) => parse_bytes(cur),
        Some(TokenKind::Directive(Directive::Bits)) => {
            cur.bump();
            let n_text = cur.expect_ident()?;
            let n: u32 = n_text
                .parse()
                .map_err(|_| DtsError::BadInteger(n_text.clone()))?;
            if ![8, 16, 32, 64].contains(&n) {
                return Err(DtsError::InvalidBitsSize(n));
            }
            parse_cells(cur, (n / 8) as u8)
        }
        other => Err(cur.unexpected("a property value", other)),
    }
}

fn parse_cells(cur: &mut Cursor, elem_size: u8) -> Result<Chunk, DtsError> {
    cur.expect_punct('<')?;
    let mut items = Vec::new();
    loop {
        match cur.peek_kind() {
            Some(TokenKind::Punct('>')) => {
                cur.bump();
                break;
            }
            Some(TokenKind::Ref(l)) => {
                cur.bump();
                items.push(CellTerm::LabelRef(l));
            }
            Some(TokenKind::Ident(text)) => {
                cur.bump();
                let v = parse_int_literal(&text).ok_or_else(|| DtsError::BadInteger(text.clone()))?;
                items.push(CellTerm::Int { value: v, text });
            }
            Some(TokenKind::NegInt(v)) => {
                cur.bump();
                items.push(CellTerm::Int {
                    value: v,
                    text: format!("({v})"),
                });
            }
            other => return Err(cur.unexpected("cell item or '>'", other)),
        }
    }
    Ok(Chunk::Cells { elem_size, items })
}

fn parse_bytes(cur: &mut Cursor) -> Result<Chunk, DtsError> {
    cur.expect_punct('[')?;
    let mut out = Vec::new();
    loop {
        match cur.peek_kind() {
            Some(TokenKind::Punct(']')) => {
                cur.bump();
                break;
            }
            Some(TokenKind::Ident(text)) => {
                cur.bump();
                let v = u8::from_str_radix(&text, 16).map_err(|_| DtsError::BadInteger(text.clone()))?;
                out.push(v);
            }
            other => return Err(cur.unexpected("byte or ']'", other)),
        }
    }
    Ok(Chunk::Bytes(out))
}
