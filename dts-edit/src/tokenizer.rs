//! Line-oriented DTS tokenizer (spec.md §4.1).
//!
//! Follows `/include/`/`#include` inclusion depth-first, skips `#if*`
//! regions (no `#else` support — spec.md §9's open question is resolved
//! here by mirroring the limitation rather than rejecting `#else`, since
//! that matches how `dtc`'s own cpp pass behaves for most overlay sources),
//! and strips `//`/`/*...*/` comments before emitting tokens. Lines that
//! start with `#` but aren't a recognized cpp directive (`#address-cells`,
//! `#size-cells`, `#gpio-cells`, ...) are ordinary property names and fall
//! through to the normal name scanner.

use crate::error::DtsError;
use crate::fileio::FileOpener;
use crate::token::{Directive, Token, TokenKind};

const NAME_CHARS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789,._+#@-";

fn is_name_char(c: char) -> bool {
    NAME_CHARS.contains(c)
}

const DIRECTIVE_KEYWORDS: &[(&str, Directive)] = &[
    ("/dts-v1/", Directive::DtsV1),
    ("/plugin/", Directive::Plugin),
    ("/memreserve/", Directive::MemReserve),
    ("/bits/", Directive::Bits),
    ("/delete-node/", Directive::DeleteNode),
    ("/delete-property/", Directive::DeleteProperty),
];

pub struct Tokenizer<'a> {
    opener: &'a dyn FileOpener,
    out: Vec<Token>,
    in_comment: bool,
    if_depth: u32,
}

impl<'a> Tokenizer<'a> {
    pub fn new(opener: &'a dyn FileOpener) -> Self {
        Self {
            opener,
            out: Vec::new(),
            in_comment: false,
            if_depth: 0,
        }
    }

    /// Tokenizes `path` (and everything it transitively includes),
    /// returning the flat token stream described in spec.md §4.1.
    pub fn tokenize(mut self, path: &str) -> Result<Vec<Token>, DtsError> {
        self.tokenize_file(path)?;
        Ok(self.out)
    }

    fn tokenize_file(&mut self, path: &str) -> Result<(), DtsError> {
        self.out.push(Token {
            kind: TokenKind::FileMarker(path.to_string()),
            file: path.to_string(),
            line: 0,
        });

        let bytes = self.opener.open(path)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        for (lineno, raw_line) in text.lines().enumerate() {
            self.process_line(path, lineno + 1, raw_line)?;
        }
        Ok(())
    }

    fn process_line(&mut self, file: &str, lineno: usize, raw_line: &str) -> Result<(), DtsError> {
        let code = self.strip_comments(raw_line);
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        if trimmed.starts_with('#') {
            return self.handle_hash_directive(file, lineno, trimmed);
        }
        if let Some(rest) = trimmed.strip_prefix("/include/") {
            if self.if_depth > 0 {
                return Ok(());
            }
            return self.handle_include(file, lineno, rest.trim());
        }

        if self.if_depth > 0 {
            return Ok(());
        }

        self.scan_line(file, lineno, trimmed)
    }

    /// Strips `//` and (possibly multi-line) `/* ... */` comments from a
    /// single line, carrying the `in_comment` bit across calls.
    fn strip_comments(&mut self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            if self.in_comment {
                if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                    self.in_comment = false;
                    i += 2;
                } else {
                    i += 1;
                }
                continue;
            }
            if chars[i] == '/' && chars.get(i + 1) == Some(&'/') {
                break;
            }
            if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
                self.in_comment = true;
                i += 2;
                continue;
            }
            out.push(chars[i]);
            i += 1;
        }
        out
    }

    /// `line` is the full trimmed line including its leading `#`. Only the
    /// true cpp-style directives (`#include`, `#if*`, `#endif`) are handled
    /// here; anything else (`#address-cells = <1>;`, `#size-cells`, ...) is
    /// a property name that happens to start with `#` and falls through to
    /// [`Self::scan_line`], which already treats `#` as a name character.
    fn handle_hash_directive(&mut self, file: &str, lineno: usize, line: &str) -> Result<(), DtsError> {
        let rest = line[1..].trim_start();
        if rest == "endif" || rest.starts_with("endif") {
            self.if_depth = self.if_depth.saturating_sub(1);
            return Ok(());
        }
        if rest.starts_with("if") {
            // Covers both `#if COND` and `#ifdef SYM` (no `#else` support).
            self.if_depth += 1;
            return Ok(());
        }
        if self.if_depth > 0 {
            return Ok(());
        }
        if let Some(target) = rest.strip_prefix("include") {
            return self.handle_include(file, lineno, target.trim());
        }
        self.scan_line(file, lineno, line)
    }

    fn handle_include(&mut self, file: &str, lineno: usize, spec: &str) -> Result<(), DtsError> {
        let (target, angled) = if let Some(inner) = spec.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            (inner.to_string(), false)
        } else if let Some(inner) = spec.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            (inner.to_string(), true)
        } else {
            return Err(DtsError::BadResidue {
                file: format!("{file}:{lineno}"),
                residue: spec.to_string(),
            });
        };

        if target.contains(".h") {
            self.out.push(Token {
                kind: TokenKind::Directive(Directive::Include),
                file: file.to_string(),
                line: lineno,
            });
            self.out.push(Token {
                kind: TokenKind::IncludePath {
                    path: target,
                    angled,
                },
                file: file.to_string(),
                line: lineno,
            });
            return Ok(());
        }

        if target.contains(".dtsi") || target.contains(".dts") {
            self.tokenize_file(&target)?;
            self.out.push(Token {
                kind: TokenKind::FileMarker(file.to_string()),
                file: file.to_string(),
                line: lineno,
            });
            return Ok(());
        }

        Err(DtsError::UnsupportedInclude {
            file: format!("{file}:{lineno}"),
            path: target,
        })
    }

    fn scan_line(&mut self, file: &str, lineno: usize, line: &str) -> Result<(), DtsError> {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            if chars[i].is_whitespace() {
                i += 1;
                continue;
            }

            if let Some((directive, len)) = match_directive_keyword(&chars[i..]) {
                self.out.push(Token {
                    kind: TokenKind::Directive(directive),
                    file: file.to_string(),
                    line: lineno,
                });
                i += len;
                continue;
            }

            if chars[i] == '&' {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && is_name_char(chars[j]) {
                    j += 1;
                }
                if j == start {
                    return Err(residue_err(file, lineno, &chars, i));
                }
                let name: String = chars[start..j].iter().collect();
                self.out.push(Token {
                    kind: TokenKind::Ref(name),
                    file: file.to_string(),
                    line: lineno,
                });
                i = j;
                continue;
            }

            if chars[i] == '(' {
                if let Some((value, len)) = match_neg_int(&chars[i..]) {
                    self.out.push(Token {
                        kind: TokenKind::NegInt(value),
                        file: file.to_string(),
                        line: lineno,
                    });
                    i += len;
                    continue;
                }
                return Err(residue_err(file, lineno, &chars, i));
            }

            if chars[i] == '"' || chars[i] == '\'' {
                let (s, len) = scan_string(&chars[i..], chars[i]).ok_or_else(|| {
                    DtsError::UnterminatedString {
                        file: format!("{file}:{lineno}"),
                    }
                })?;
                self.out.push(Token {
                    kind: TokenKind::Str(s),
                    file: file.to_string(),
                    line: lineno,
                });
                i += len;
                continue;
            }

            if is_name_char(chars[i]) {
                let start = i;
                let mut j = i;
                while j < chars.len() && is_name_char(chars[j]) {
                    j += 1;
                }
                let name: String = chars[start..j].iter().collect();
                if j < chars.len() && chars[j] == ':' {
                    self.out.push(Token {
                        kind: TokenKind::Label(name),
                        file: file.to_string(),
                        line: lineno,
                    });
                    i = j + 1;
                } else {
                    self.out.push(Token {
                        kind: TokenKind::Ident(name),
                        file: file.to_string(),
                        line: lineno,
                    });
                    i = j;
                }
                continue;
            }

            if "{};=<>,[]/".contains(chars[i]) {
                self.out.push(Token {
                    kind: TokenKind::Punct(chars[i]),
                    file: file.to_string(),
                    line: lineno,
                });
                i += 1;
                continue;
            }

            return Err(residue_err(file, lineno, &chars, i));
        }
        Ok(())
    }
}

fn residue_err(file: &str, lineno: usize, chars: &[char], from: usize) -> DtsError {
    let residue: String = chars[from..].iter().collect();
    DtsError::BadResidue {
        file: format!("{file}:{lineno}"),
        residue,
    }
}

fn match_directive_keyword(chars: &[char]) -> Option<(Directive, usize)> {
    let s: String = chars.iter().collect();
    for (text, directive) in DIRECTIVE_KEYWORDS {
        if s.starts_with(text) {
            return Some((directive.clone(), text.chars().count()));
        }
    }
    None
}

/// Matches a parenthesized negative integer literal, `(-N)`, where `N` is
/// decimal or `0x`-prefixed hex.
fn match_neg_int(chars: &[char]) -> Option<(i128, usize)> {
    debug_assert_eq!(chars[0], '(');
    let mut i = 1;
    while chars.get(i).is_some_and(|c| c.is_whitespace()) {
        i += 1;
    }
    if chars.get(i) != Some(&'-') {
        return None;
    }
    i += 1;
    let digits_start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_hexdigit() || *c == 'x' || *c == 'X') {
        i += 1;
    }
    if i == digits_start {
        return None;
    }
    let digits: String = chars[digits_start..i].iter().collect();
    let magnitude = parse_int_literal(&digits)?;
    while chars.get(i).is_some_and(|c| c.is_whitespace()) {
        i += 1;
    }
    if chars.get(i) != Some(&')') {
        return None;
    }
    i += 1;
    Some((-magnitude, i))
}

pub fn parse_int_literal(s: &str) -> Option<i128> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16).ok()
    } else {
        s.parse::<i128>().ok()
    }
}

fn scan_string(chars: &[char], quote: char) -> Option<(String, usize)> {
    debug_assert_eq!(chars[0], quote);
    let mut out = String::new();
    let mut i = 1;
    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Some((out, i + 1)),
            '\\' => {
                i += 1;
                let esc = *chars.get(i)?;
                out.push(match esc {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    '0' => '\0',
                    other => other,
                });
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileio::FileOpener;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct MemOpener(RefCell<HashMap<String, Vec<u8>>>);

    impl FileOpener for MemOpener {
        fn open(&self, path: &str) -> Result<Vec<u8>, DtsError> {
            self.0
                .borrow()
                .get(path)
                .cloned()
                .ok_or_else(|| DtsError::IncludeNotFound {
                    file: String::new(),
                    path: path.to_string(),
                })
        }
        fn exists(&self, path: &str) -> bool {
            self.0.borrow().contains_key(path)
        }
    }

    fn opener(files: &[(&str, &str)]) -> MemOpener {
        let mut m = HashMap::new();
        for (k, v) in files {
            m.insert(k.to_string(), v.as_bytes().to_vec());
        }
        MemOpener(RefCell::new(m))
    }

    #[test]
    fn tokenizes_minimal_plugin() {
        let src = "/dts-v1/;\n/plugin/;\n/ {\n\tfragment@0 {\n\t};\n};\n";
        let o = opener(&[("a.dts", src)]);
        let toks = Tokenizer::new(&o).tokenize("a.dts").unwrap();
        let kinds: Vec<_> = toks
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::FileMarker(_)))
            .map(|t| t.kind.clone())
            .collect();
        assert_eq!(kinds[0], TokenKind::Directive(Directive::DtsV1));
        assert_eq!(kinds[1], TokenKind::Punct(';'));
        assert_eq!(kinds[2], TokenKind::Directive(Directive::Plugin));
    }

    #[test]
    fn strips_line_and_block_comments() {
        let src = "/dts-v1/; // trailing\n/* block\ncomment */ /plugin/;\n";
        let o = opener(&[("a.dts", src)]);
        let toks = Tokenizer::new(&o).tokenize("a.dts").unwrap();
        let kinds: Vec<_> = toks
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::FileMarker(_)))
            .map(|t| t.kind.clone())
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Directive(Directive::DtsV1),
                TokenKind::Punct(';'),
                TokenKind::Directive(Directive::Plugin),
                TokenKind::Punct(';'),
            ]
        );
    }

    #[test]
    fn skips_ifdef_region_without_else_support() {
        let src = "#ifdef FOO\nbad garbage !!!\n#endif\nok_token;\n";
        let o = opener(&[("a.dts", src)]);
        let toks = Tokenizer::new(&o).tokenize("a.dts").unwrap();
        let kinds: Vec<_> = toks
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::FileMarker(_)))
            .map(|t| t.kind.clone())
            .collect();
        assert_eq!(
            kinds,
            vec![TokenKind::Ident("ok_token".into()), TokenKind::Punct(';')]
        );
    }

    #[test]
    fn inlines_dtsi_include_depth_first() {
        let inc = "child_node {\n};\n";
        let top = "/dts-v1/;\n/include/ \"inc.dtsi\"\n";
        let o = opener(&[("top.dts", top), ("inc.dtsi", inc)]);
        let toks = Tokenizer::new(&o).tokenize("top.dts").unwrap();
        let markers: Vec<_> = toks
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::FileMarker(f) => Some(f.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(markers, vec!["top.dts", "inc.dtsi", "top.dts"]);
        assert!(toks
            .iter()
            .any(|t| t.kind == TokenKind::Ident("child_node".into())));
    }

    #[test]
    fn header_include_does_not_descend() {
        let top = "#include <foo.h>\n";
        let o = opener(&[("top.dts", top)]);
        let toks = Tokenizer::new(&o).tokenize("top.dts").unwrap();
        let kinds: Vec<_> = toks
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::FileMarker(_)))
            .map(|t| t.kind.clone())
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Directive(Directive::Include),
                TokenKind::IncludePath {
                    path: "foo.h".into(),
                    angled: true
                },
            ]
        );
    }

    #[test]
    fn unrecognized_residue_fails() {
        let o = opener(&[("a.dts", "$$$garbage;\n")]);
        let res = Tokenizer::new(&o).tokenize("a.dts");
        assert!(matches!(res, Err(DtsError::BadResidue { .. })));
    }

    #[test]
    fn hash_prefixed_property_names_lex_as_idents() {
        let o = opener(&[("a.dts", "#address-cells = <1>;\n#size-cells = <0>;\n")]);
        let toks = Tokenizer::new(&o).tokenize("a.dts").unwrap();
        let kinds: Vec<_> = toks
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::FileMarker(_)))
            .map(|t| t.kind.clone())
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident("#address-cells".into()),
                TokenKind::Punct('='),
                TokenKind::Punct('<'),
                TokenKind::Ident("1".into()),
                TokenKind::Punct('>'),
                TokenKind::Punct(';'),
                TokenKind::Ident("#size-cells".into()),
                TokenKind::Punct('='),
                TokenKind::Punct('<'),
                TokenKind::Ident("0".into()),
                TokenKind::Punct('>'),
                TokenKind::Punct(';'),
            ]
        );
    }

    #[test]
    fn negative_int_literal() {
        let o = opener(&[("a.dts", "x = <(-1)>;\n")]);
        let toks = Tokenizer::new(&o).tokenize("a.dts").unwrap();
        assert!(toks.iter().any(|t| t.kind == TokenKind::NegInt(-1)));
    }
}
