//! Full tokenize → parse → emit pipeline tests (spec.md §8 seed scenario 1
//! and the emitter/parser round-trip invariant).

use std::cell::RefCell;
use std::collections::HashMap;

use dts_edit::error::DtsError;
use dts_edit::fileio::FileOpener;
use dts_edit::tokenizer::Tokenizer;
use dts_edit::{emit, parser};

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

fn opener(src: &str) -> MemOpener {
    let mut m = HashMap::new();
    m.insert("top.dts".to_string(), src.as_bytes().to_vec());
    MemOpener(RefCell::new(m))
}

fn parse_str(src: &str) -> dts_edit::Tree {
    let o = opener(src);
    let tokens = Tokenizer::new(&o).tokenize("top.dts").unwrap();
    parser::parse(&tokens).unwrap().0
}

#[test]
fn minimal_plugin_round_trip() {
    let src = r#"
        /dts-v1/;
        /plugin/;
        / {
            fragment@0 {
                target-path = "/soc";
                __overlay__ {
                    foo {
                        status = "okay";
                    };
                };
            };
        };
    "#;
    let tree = parse_str(src);
    assert!(tree.plugin);
    let out = emit::emit(&tree, false);
    assert!(out.contains("fragment@0"));
    assert!(out.contains("target-path = \"/soc\";"));
    assert!(out.contains("status = \"okay\";"));

    let reparsed = parse_str(&out);
    let frag = reparsed.find_child(reparsed.root_id(), "fragment@0").unwrap();
    let overlay = reparsed.find_child(frag, "__overlay__").unwrap();
    let foo = reparsed.find_child(overlay, "foo").unwrap();
    assert_eq!(
        reparsed.get(foo).find_property("status").unwrap().chunks,
        tree.get(foo).find_property("status").unwrap().chunks
    );
}

#[test]
fn sorted_emission_is_byte_identical_across_runs() {
    let src = r#"
        /dts-v1/;
        / {
            b@20 {
                zzz;
            };
            a@10 {
                aaa = <1>;
            };
        };
    "#;
    let tree = parse_str(src);
    let first = emit::emit(&tree, true);
    let second = emit::emit(&tree, true);
    assert_eq!(first, second);
}

#[test]
fn duplicate_includes_collapse_to_one() {
    let inc = "/* shared */\n";
    let mut m = HashMap::new();
    m.insert("shared.h".to_string(), inc.as_bytes().to_vec());
    m.insert(
        "top.dts".to_string(),
        b"/dts-v1/;\n#include <shared.h>\n#include <shared.h>\n/ { };\n".to_vec(),
    );
    let o = MemOpener(RefCell::new(m));
    let tokens = Tokenizer::new(&o).tokenize("top.dts").unwrap();
    let (tree, _) = parser::parse(&tokens).unwrap();
    assert_eq!(tree.includes.len(), 1);
}
