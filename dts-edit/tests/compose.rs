//! Full pipeline tests for the Overlay Composer (spec.md §8 seed scenarios
//! 2 and 3): tokenize → parse two plugin sources, merge, and check the
//! resulting tree and re-emitted text.

use std::cell::RefCell;
use std::collections::HashMap;

use dts_edit::error::DtsError;
use dts_edit::fileio::FileOpener;
use dts_edit::tokenizer::Tokenizer;
use dts_edit::value::Chunk;
use dts_edit::{compose, emit, parser, Warnings};

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

fn parse_named(name: &str, src: &str) -> dts_edit::Tree {
    let mut m = HashMap::new();
    m.insert(name.to_string(), src.as_bytes().to_vec());
    let o = MemOpener(RefCell::new(m));
    let tokens = Tokenizer::new(&o).tokenize(name).unwrap();
    parser::parse(&tokens).unwrap().0
}

#[test]
fn renumber_on_merge_is_contiguous_end_to_end() {
    let a_src = r#"
        /dts-v1/;
        /plugin/;
        / {
            fragment@0 { target-path = "/soc"; __overlay__ { a0 { }; }; };
            fragment@1 { target-path = "/soc"; __overlay__ { a1 { }; }; };
        };
    "#;
    let b_src = r#"
        /dts-v1/;
        /plugin/;
        / {
            fragment@0 { target-path = "/soc"; __overlay__ { b0 { }; }; };
        };
    "#;
    let mut a = parse_named("a.dts", a_src);
    a.frag_count = 2;
    let b = parse_named("b.dts", b_src);

    let mut warnings = Warnings::default();
    compose::merge(&mut a, b, &mut warnings).unwrap();

    assert_eq!(a.frag_count, 3);
    let root = a.root_id();
    let names: Vec<String> = a
        .get(root)
        .children
        .iter()
        .map(|&c| a.get(c).name.clone())
        .filter(|n| n.starts_with("fragment"))
        .collect();
    assert_eq!(names, vec!["fragment@0", "fragment@1", "fragment@2"]);

    let frag2 = a.find_child(root, "fragment@2").unwrap();
    let overlay = a.find_child(frag2, "__overlay__").unwrap();
    assert!(a.find_child(overlay, "b0").is_some());
}

#[test]
fn label_uniquification_end_to_end() {
    let a_src = r#"
        /dts-v1/;
        /plugin/;
        / {
            fragment@0 {
                target-path = "/soc";
                __overlay__ {
                    cam0: cam { reg = <0 0>; };
                };
            };
        };
    "#;
    let b_src = r#"
        /dts-v1/;
        /plugin/;
        / {
            fragment@0 {
                target-path = "/soc";
                __overlay__ {
                    cam0: cam {
                        link = &cam0;
                        nested = <&cam0>;
                    };
                };
            };
        };
    "#;
    let mut a = parse_named("a.dts", a_src);
    let b = parse_named("b.dts", b_src);

    let mut warnings = Warnings::default();
    compose::merge(&mut a, b, &mut warnings).unwrap();

    assert!(a.labels.contains_key("cam0"));
    assert!(a.labels.contains_key("cam0_1"));

    let renamed = *a.labels.get("cam0_1").unwrap();
    let link = a.get(renamed).find_property("link").unwrap();
    assert_eq!(link.chunks, vec![Chunk::LabelRef("cam0".into())]);

    let nested = a.get(renamed).find_property("nested").unwrap();
    let text = nested.chunks[0].to_string();
    assert_eq!(text, "<&cam0_1>");
}

#[test]
fn apply_onto_base_end_to_end() {
    let base_src = r#"
        /dts-v1/;
        / {
            soc {
                gpio: gpio@0 { reg = <0 0x100>; };
            };
        };
    "#;
    let overlay_src = r#"
        /dts-v1/;
        /plugin/;
        / {
            fragment@0 {
                target = <&gpio>;
                __overlay__ {
                    status = "okay";
                    pin { function = "out"; };
                };
            };
        };
    "#;
    let mut base = parse_named("base.dts", base_src);
    let overlay = parse_named("overlay.dts", overlay_src);

    let mut warnings = Warnings::default();
    compose::apply(&mut base, &overlay, &mut warnings).unwrap();

    let gpio = *base.labels.get("gpio").unwrap();
    assert_eq!(
        base.get(gpio).find_property("status").unwrap().chunks,
        vec![Chunk::Str("okay".into())]
    );
    assert!(base.find_child(gpio, "pin").is_some());

    let text = emit::emit(&base, false);
    assert!(text.contains("status = \"okay\";"));
}
