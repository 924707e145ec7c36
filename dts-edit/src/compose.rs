//! The Overlay Composer (spec.md §4.5): fragment renumbering, plugin+plugin
//! merge with label uniquification, and plugin→base application.

use std::collections::BTreeMap;

use crate::error::{DtsError, Warnings};
use crate::node::NodeId;
use crate::tree::Tree;
use crate::value::{CellTerm, Chunk};

enum FragSep {
    At,
    Dash,
}

fn parse_fragment_name(name: &str) -> Option<(u32, FragSep)> {
    if let Some(rest) = name.strip_prefix("fragment@") {
        rest.parse().ok().map(|n| (n, FragSep::At))
    } else if let Some(rest) = name.strip_prefix("fragment-") {
        rest.parse().ok().map(|n| (n, FragSep::Dash))
    } else {
        None
    }
}

/// Renumbers `tree`'s root-level fragment children starting at `f0`,
/// rewriting fragment-enable override declarations through the remap, and
/// returns the old-number → new-number map (spec.md §4.5, "Renumber
/// fragments").
pub fn renumber_fragments(tree: &mut Tree, f0: usize) -> BTreeMap<u32, u32> {
    let root = tree.root_id();
    let children = tree.get(root).children.clone();
    let mut frag_children = Vec::new();
    for c in children {
        if let Some((n, sep)) = parse_fragment_name(&tree.get(c).name) {
            frag_children.push((c, n, sep));
        }
    }

    let mut remap = BTreeMap::new();
    for (i, (child, old_n, sep)) in frag_children.iter().enumerate() {
        let new_n = f0 + i;
        remap.insert(*old_n, new_n as u32);
        tree.get_mut(*child).name = match sep {
            FragSep::At => format!("fragment@{new_n}"),
            FragSep::Dash => format!("fragment-{new_n}"),
        };
    }
    tree.frag_count = frag_children.len();

    if let Some(overrides) = tree.find_child(root, "__overrides__") {
        let mut props = tree.get(overrides).properties.clone();
        for p in props.iter_mut() {
            let mut i = 0;
            while i + 1 < p.chunks.len() {
                if p.chunks[i].is_zero_cell() {
                    if let Chunk::Str(d) = &p.chunks[i + 1] {
                        let rewritten = rewrite_fragment_enable_decl(d, &remap);
                        p.chunks[i + 1] = Chunk::Str(rewritten);
                    }
                }
                i += 2;
            }
        }
        tree.get_mut(overrides).properties = props;
    }

    remap
}

fn rewrite_fragment_enable_decl(d: &str, remap: &BTreeMap<u32, u32>) -> String {
    let mut out = String::new();
    let mut chars = d.chars().peekable();
    while let Some(c) = chars.next() {
        if "=!+-".contains(c) {
            out.push(c);
            let mut num = String::new();
            while let Some(&d2) = chars.peek() {
                if d2.is_ascii_digit() {
                    num.push(d2);
                    chars.next();
                } else {
                    break;
                }
            }
            match num.parse::<u32>() {
                Ok(n) => out.push_str(&remap.get(&n).copied().unwrap_or(n).to_string()),
                Err(_) => out.push_str(&num),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Merges plugin `overlay` into plugin `base` in place (spec.md §4.5,
/// "Merge (plugin + plugin)"): renumbers `overlay`'s fragments, uniquifies
/// its labels, rewrites `&label` terms inside Cells chunks through the
/// rename map, transplants its fragments, and merges `__overrides__`.
pub fn merge(base: &mut Tree, mut overlay: Tree, warnings: &mut Warnings) -> Result<(), DtsError> {
    for inc in overlay.includes.clone() {
        base.add_include(inc);
    }

    renumber_fragments(&mut overlay, base.frag_count);

    let label_map = uniquify_labels(base, &mut overlay);
    rewrite_cell_label_refs(&mut overlay, &label_map);

    let base_overrides_id = base.find_child(base.root_id(), "__overrides__");
    let base_overrides_props = base_overrides_id
        .map(|id| base.get(id).properties.clone())
        .unwrap_or_default();
    if let Some(id) = base_overrides_id {
        base.delete_node(id);
    }

    let overlay_root = overlay.root_id();
    let frag_children: Vec<NodeId> = overlay
        .get(overlay_root)
        .children
        .iter()
        .copied()
        .filter(|&c| parse_fragment_name(&overlay.get(c).name).is_some())
        .collect();
    for fc in frag_children {
        base.copy_subtree_into(base.root_id(), &overlay, fc, "<merge>", warnings)?;
    }

    let overlay_overrides_props = overlay
        .find_child(overlay_root, "__overrides__")
        .map(|id| overlay.get(id).properties.clone())
        .unwrap_or_default();

    let mut combined = base_overrides_props;
    for p in overlay_overrides_props {
        if combined.iter().any(|existing| existing.name == p.name) {
            return Err(DtsError::DuplicateOverrideParam(p.name));
        }
        combined.push(p);
    }
    if !combined.is_empty() {
        let new_overrides = base.get_or_add_child(base.root_id(), "__overrides__");
        base.get_mut(new_overrides).properties = combined;
    }

    Ok(())
}

/// Picks, for every label in `overlay` that also exists in `base`, the
/// smallest free `_k` suffix; renames it in `overlay`'s label map and node
/// label list; returns the old→new map (spec.md §4.5's "Label
/// uniquification").
fn uniquify_labels(base: &Tree, overlay: &mut Tree) -> BTreeMap<String, String> {
    let overlay_labels: Vec<String> = overlay.labels.keys().cloned().collect();
    let mut label_map = BTreeMap::new();
    let mut assigned: std::collections::HashSet<String> = std::collections::HashSet::new();

    for l in &overlay_labels {
        if !base.labels.contains_key(l) {
            label_map.insert(l.clone(), l.clone());
            continue;
        }
        let mut k = 1u32;
        loop {
            let candidate = format!("{l}_{k}");
            if !base.labels.contains_key(&candidate)
                && !overlay.labels.contains_key(&candidate)
                && !assigned.contains(&candidate)
            {
                assigned.insert(candidate.clone());
                label_map.insert(l.clone(), candidate);
                break;
            }
            k += 1;
        }
    }

    for (old, new) in &label_map {
        if old == new {
            continue;
        }
        let node_id = *overlay.labels.get(old).expect("label just enumerated");
        overlay.labels.remove(old);
        overlay.labels.insert(new.clone(), node_id);
        let node = overlay.get_mut(node_id);
        if let Some(pos) = node.labels.iter().position(|x| x == old) {
            node.labels[pos] = new.clone();
        }
    }

    label_map
}

/// Rewrites `&label` terms inside `Cells` chunks across `overlay`'s whole
/// tree (root excluded) through `label_map`. Whole-value `LabelRef` chunks
/// are left untouched by design (spec.md §9's "two-tier label rewrite").
fn rewrite_cell_label_refs(overlay: &mut Tree, label_map: &BTreeMap<String, String>) {
    let root = overlay.root_id();
    let node_ids: Vec<NodeId> = overlay.all_nodes().collect();
    for id in node_ids {
        if id == root {
            continue;
        }
        let node = overlay.get_mut(id);
        for prop in node.properties.iter_mut() {
            for chunk in prop.chunks.iter_mut() {
                if let Chunk::Cells { items, .. } = chunk {
                    for item in items.iter_mut() {
                        if let CellTerm::LabelRef(l) = item {
                            if let Some(new) = label_map.get(l.as_str()) {
                                if new != l {
                                    *l = new.clone();
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Applies plugin `overlay`'s fragments onto base tree `base` in place
/// (spec.md §4.5, "Apply (plugin → base)"). Dormant fragments (no
/// `__overlay__` child) are skipped; `base`'s own `__overrides__` is left
/// untouched.
pub fn apply(base: &mut Tree, overlay: &Tree, warnings: &mut Warnings) -> Result<(), DtsError> {
    for inc in overlay.includes.clone() {
        base.add_include(inc);
    }

    let overlay_root = overlay.root_id();
    for fc in overlay.get(overlay_root).children.clone() {
        if parse_fragment_name(&overlay.get(fc).name).is_none() {
            continue;
        }
        let overlay_child = match overlay.find_child(fc, "__overlay__") {
            Some(id) => id,
            None => continue,
        };
        let target = resolve_fragment_target(base, overlay, fc)?;
        base.apply_subtree(target, overlay, overlay_child, "<apply>", warnings)?;
    }
    Ok(())
}

fn resolve_fragment_target(base: &Tree, overlay: &Tree, frag: NodeId) -> Result<NodeId, DtsError> {
    let frag_data = overlay.get(frag);
    if let Some(prop) = frag_data.find_property("target") {
        if let Some(label) = prop.chunks.first().and_then(Chunk::as_single_labelref_cell) {
            return base
                .labels
                .get(label)
                .copied()
                .ok_or_else(|| DtsError::MissingTarget(overlay.node_path(frag)));
        }
    }
    if let Some(prop) = frag_data.find_property("target-path") {
        if let Some(path) = prop.chunks.first().and_then(Chunk::as_str) {
            return base
                .resolve_path(path)
                .ok_or_else(|| DtsError::MissingTarget(overlay.node_path(frag)));
        }
    }
    Err(DtsError::MissingTarget(overlay.node_path(frag)))
}
