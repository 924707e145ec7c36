//! The Emitter (spec.md §4.6): serializes a [`Tree`] back to DTS text.

use crate::node::{addr_cmp, NodeId};
use crate::property::Property;
use crate::tree::Tree;

/// Serializes `tree` to DTS text. With `sort`, properties sort by name,
/// children sort by the §4.6 address comparator, and labels sort lexically
/// — giving byte-identical output across runs on the same input.
pub fn emit(tree: &Tree, sort: bool) -> String {
    let mut out = String::new();
    out.push_str("/dts-v1/;\n");
    if tree.plugin {
        out.push_str("/plugin/;\n");
    }
    for inc in &tree.includes {
        if inc.angled {
            out.push_str(&format!("#include <{}>\n", inc.path));
        } else {
            out.push_str(&format!("#include \"{}\"\n", inc.path));
        }
    }
    for (start, len) in &tree.memreserves {
        out.push_str(&format!("/memreserve/ {start:#x} {len:#x};\n"));
    }
    emit_node(tree, tree.root_id(), 0, sort, &mut out);
    out
}

fn emit_node(tree: &Tree, id: NodeId, depth: usize, sort: bool, out: &mut String) {
    let indent = "\t".repeat(depth);
    let node = tree.get(id);

    out.push_str(&indent);
    let mut labels = node.labels.clone();
    if sort {
        labels.sort();
    }
    for l in &labels {
        out.push_str(l);
        out.push_str(": ");
    }
    out.push_str(node.display_name());
    out.push_str(" {\n");

    let mut props: Vec<&Property> = node.properties.iter().collect();
    if sort {
        props.sort_by(|a, b| a.name.cmp(&b.name));
    }
    for p in props {
        out.push_str(&"\t".repeat(depth + 1));
        out.push_str(&p.name);
        if !p.is_boolean() {
            out.push_str(" = ");
            let parts: Vec<String> = p.chunks.iter().map(|c| c.to_string()).collect();
            out.push_str(&parts.join(", "));
        }
        out.push_str(";\n");
    }

    let mut children = node.children.clone();
    if sort {
        children.sort_by(|&a, &b| addr_cmp(&tree.get(a).name, &tree.get(b).name));
    }
    for c in children {
        emit_node(tree, c, depth + 1, sort, out);
    }

    out.push_str(&indent);
    out.push_str("};\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{CellTerm, Chunk};

    #[test]
    fn minimal_plugin_emits_header_and_fragment() {
        let mut t = Tree::new();
        t.plugin = true;
        let frag = t.get_or_add_child(t.root_id(), "fragment@0");
        t.write_property(
            frag,
            Property::new("target-path", vec![Chunk::Str("/soc".into())]),
        );
        let overlay = t.get_or_add_child(frag, "__overlay__");
        let foo = t.get_or_add_child(overlay, "foo");
        t.write_property(foo, Property::new("status", vec![Chunk::Str("okay".into())]));

        let out = emit(&t, false);
        assert!(out.starts_with("/dts-v1/;\n/plugin/;\n"));
        assert!(out.contains("fragment@0 {"));
        assert!(out.contains("target-path = \"/soc\";"));
        assert!(out.contains("status = \"okay\";"));
        assert!(out.trim_end().ends_with("};"));
    }

    #[test]
    fn sorted_emission_orders_properties_and_children_deterministically() {
        let mut t = Tree::new();
        let root = t.root_id();
        let b = t.get_or_add_child(root, "b@20");
        let a = t.get_or_add_child(root, "a@10");
        t.write_property(a, Property::new("zzz", vec![Chunk::cells(vec![CellTerm::int(1)])]));
        t.write_property(a, Property::new("aaa", vec![Chunk::cells(vec![CellTerm::int(2)])]));
        let _ = b;

        let once = emit(&t, true);
        let twice = emit(&t, true);
        assert_eq!(once, twice);

        let a_idx = once.find("a@10").unwrap();
        let b_idx = once.find("b@20").unwrap();
        assert!(a_idx < b_idx);
        let aaa_idx = once.find("aaa").unwrap();
        let zzz_idx = once.find("zzz").unwrap();
        assert!(aaa_idx < zzz_idx);
    }

    #[test]
    fn labels_are_colon_joined_before_name() {
        let mut t = Tree::new();
        let root = t.root_id();
        let soc = t.get_or_add_child(root, "soc");
        t.force_label(soc, "soc_label");
        let out = emit(&t, false);
        assert!(out.contains("soc_label: soc {"));
    }
}
