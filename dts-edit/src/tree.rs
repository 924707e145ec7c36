//! The in-memory device tree (spec.md §3, "Tree Store").

use std::collections::BTreeMap;

use crate::error::{DtsError, Warning, Warnings};
use crate::node::{names_match, IncludeRef, NodeData, NodeId};
use crate::property::Property;
use crate::value::Chunk;

/// A mutable device tree: nodes, properties, label table, includes,
/// memreserves, and the `plugin` flag (spec.md §3).
///
/// Nodes live in an arena (`Vec<Option<NodeData>>`) addressed by
/// [`NodeId`]; deleting a node tombstones its slot rather than
/// renumbering the arena, so every other live `NodeId` stays valid
/// (spec.md §9's back-reference design note).
#[derive(Clone, Debug)]
pub struct Tree {
    nodes: Vec<Option<NodeData>>,
    root: NodeId,
    pub plugin: bool,
    pub labels: BTreeMap<String, NodeId>,
    pub includes: Vec<IncludeRef>,
    pub memreserves: Vec<(u64, u64)>,
    pub frag_count: usize,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(NodeData::root())],
            root: NodeId(0),
            plugin: false,
            labels: BTreeMap::new(),
            includes: Vec::new(),
            memreserves: Vec::new(),
            frag_count: 0,
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> &NodeData {
        self.nodes[id.0]
            .as_ref()
            .expect("dangling NodeId: node was deleted")
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut NodeData {
        self.nodes[id.0]
            .as_mut()
            .expect("dangling NodeId: node was deleted")
    }

    pub fn try_get(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0).and_then(|n| n.as_ref())
    }

    /// Depth-first iterator over every live node, root first.
    pub fn all_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack = vec![self.root];
        let mut out = Vec::new();
        while let Some(id) = stack.pop() {
            out.push(id);
            let children = &self.get(id).children;
            for &c in children.iter().rev() {
                stack.push(c);
            }
        }
        out.into_iter()
    }

    pub fn add_child_raw(&mut self, parent: NodeId, name: &str) -> NodeId {
        let depth = self.get(parent).depth + 1;
        let data = NodeData {
            name: name.to_string(),
            properties: Vec::new(),
            children: Vec::new(),
            labels: Vec::new(),
            parent: Some(parent),
            depth,
        };
        self.nodes.push(Some(data));
        let id = NodeId(self.nodes.len() - 1);
        self.get_mut(parent).children.push(id);
        id
    }

    /// Child lookup by name per spec.md §4.6: exact match wins over all
    /// children; otherwise a query without `@` fuzzily matches a child of
    /// the form `NAME@<anything>`.
    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        let children = &self.get(parent).children;
        for &c in children {
            if self.get(c).name == name {
                return Some(c);
            }
        }
        if name.contains('@') {
            return None;
        }
        children
            .iter()
            .copied()
            .find(|&c| names_match(name, &self.get(c).name))
    }

    pub fn get_or_add_child(&mut self, parent: NodeId, name: &str) -> NodeId {
        self.find_child(parent, name)
            .unwrap_or_else(|| self.add_child_raw(parent, name))
    }

    /// Label declaration semantics from spec.md §4.2: mapping an already
    /// used label to a *different* node is a fatal error; redeclaring the
    /// same label on the same node is only a warning; otherwise the label
    /// is newly attached.
    pub fn declare_label(
        &mut self,
        id: NodeId,
        label: &str,
        file: &str,
        warnings: &mut Warnings,
    ) -> Result<(), DtsError> {
        if let Some(&existing) = self.labels.get(label) {
            if existing == id {
                warnings.push(Warning::DuplicateLabelSameNode {
                    file: file.to_string(),
                    label: label.to_string(),
                });
                return Ok(());
            }
            return Err(DtsError::DuplicateLabel {
                file: file.to_string(),
                label: label.to_string(),
            });
        }
        self.labels.insert(label.to_string(), id);
        self.get_mut(id).labels.push(label.to_string());
        Ok(())
    }

    /// Renames a label's target without the "distinct node" failure mode;
    /// used by the overlay composer, which has already checked uniqueness
    /// itself before installing a renamed label.
    pub fn force_label(&mut self, id: NodeId, label: &str) {
        self.labels.insert(label.to_string(), id);
        self.get_mut(id).labels.push(label.to_string());
    }

    fn tombstone_recursive(&mut self, id: NodeId) {
        let labels = self.get(id).labels.clone();
        for l in labels {
            self.labels.remove(&l);
        }
        let children = self.get(id).children.clone();
        for c in children {
            self.tombstone_recursive(c);
        }
        self.nodes[id.0] = None;
    }

    /// Deletes `id` and its whole subtree, freeing every label in it from
    /// the label map (spec.md §3's Lifecycle paragraph).
    pub fn delete_node(&mut self, id: NodeId) {
        if let Some(parent) = self.get(id).parent {
            self.get_mut(parent).children.retain(|&c| c != id);
        }
        self.tombstone_recursive(id);
    }

    /// `/delete-node/ NAME;` — deletes a child matched per spec.md §4.6.
    pub fn delete_child_by_name(&mut self, parent: NodeId, name: &str) -> bool {
        match self.find_child(parent, name) {
            Some(id) => {
                self.delete_node(id);
                true
            }
            None => false,
        }
    }

    /// The property write rule from spec.md §4.2: replaces an existing
    /// property's chunks, except `status` (coerced to "okay"/"disabled")
    /// and `bootargs` (space-joined concatenation with the existing value).
    pub fn write_property(&mut self, id: NodeId, prop: Property) {
        if prop.name == "status" {
            let coerced = crate::valueinterp::boolean_value(
                prop.chunks
                    .first()
                    .and_then(Chunk::as_str)
                    .unwrap_or("okay"),
            )
            .unwrap_or(true);
            let word = if coerced { "okay" } else { "disabled" };
            let node = self.get_mut(id);
            if let Some(existing) = node.find_property_mut("status") {
                existing.chunks = vec![Chunk::Str(word.to_string())];
            } else {
                node.properties
                    .push(Property::new("status", vec![Chunk::Str(word.to_string())]));
            }
            return;
        }
        if prop.name == "bootargs" {
            let new_val = prop.chunks.first().and_then(Chunk::as_str).unwrap_or("");
            let node = self.get_mut(id);
            if let Some(existing) = node.find_property_mut("bootargs") {
                let combined = match existing.chunks.first().and_then(Chunk::as_str) {
                    Some(old) if !old.is_empty() => format!("{old} {new_val}"),
                    _ => new_val.to_string(),
                };
                existing.chunks = vec![Chunk::Str(combined)];
            } else {
                node.properties
                    .push(Property::new("bootargs", vec![Chunk::Str(new_val.to_string())]));
            }
            return;
        }

        let node = self.get_mut(id);
        if let Some(existing) = node.find_property_mut(&prop.name) {
            existing.chunks = prop.chunks;
        } else {
            node.properties.push(prop);
        }
    }

    /// Recursively applies `src` (read from `src_tree`, which may be a
    /// different `Tree`) onto `dst`: `apply(base, dst, src)` from spec.md
    /// §4.5 — properties follow the §4.2 write rule, labels attach to
    /// `dst`, and children are located-or-created then recursed into.
    pub fn apply_subtree(
        &mut self,
        dst: NodeId,
        src_tree: &Tree,
        src: NodeId,
        file: &str,
        warnings: &mut Warnings,
    ) -> Result<(), DtsError> {
        let src_data = src_tree.get(src).clone();
        for prop in src_data.properties {
            self.write_property(dst, prop);
        }
        for label in &src_data.labels {
            self.declare_label(dst, label, file, warnings)?;
        }
        for child_id in src_data.children {
            let child_name = &src_tree.get(child_id).name;
            let dst_child = self.get_or_add_child(dst, child_name);
            self.apply_subtree(dst_child, src_tree, child_id, file, warnings)?;
        }
        Ok(())
    }

    /// Deep-copies `src` (from `src_tree`) as a brand-new child of `dst`,
    /// without merging into any pre-existing same-named child. Used by
    /// the overlay composer to transplant fragments wholesale.
    pub fn copy_subtree_into(
        &mut self,
        dst_parent: NodeId,
        src_tree: &Tree,
        src: NodeId,
        file: &str,
        warnings: &mut Warnings,
    ) -> Result<NodeId, DtsError> {
        let src_data = src_tree.get(src).clone();
        let new_id = self.add_child_raw(dst_parent, &src_data.name);
        self.get_mut(new_id).properties = src_data.properties;
        for label in &src_data.labels {
            self.declare_label(new_id, label, file, warnings)?;
        }
        for child_id in src_data.children {
            self.copy_subtree_into(new_id, src_tree, child_id, file, warnings)?;
        }
        Ok(new_id)
    }

    /// Builds the absolute path string for `id`, e.g. `/soc/gpio@1000`.
    pub fn node_path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cur = id;
        loop {
            let node = self.get(cur);
            if let Some(parent) = node.parent {
                parts.push(node.name.clone());
                cur = parent;
            } else {
                break;
            }
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Resolves an absolute path or a leading-alias path to a node
    /// (spec.md §4.6: "a leading `NAME/` component through the aliases
    /// table ... may resolve to a label (`&L`) or an absolute path").
    pub fn resolve_path(&self, path: &str) -> Option<NodeId> {
        if let Some(rest) = path.strip_prefix('/') {
            return self.resolve_from(self.root, rest);
        }
        let mut parts = path.splitn(2, '/');
        let alias = parts.next()?;
        let remainder = parts.next().unwrap_or("");
        let aliases_node = self.resolve_from(self.root, "aliases")?;
        let prop = self.get(aliases_node).find_property(alias)?;
        let start = match prop.chunks.first()? {
            Chunk::LabelRef(l) => *self.labels.get(l)?,
            Chunk::Str(s) => self.resolve_path(s)?,
            _ => return None,
        };
        if remainder.is_empty() {
            Some(start)
        } else {
            self.resolve_from(start, remainder)
        }
    }

    fn resolve_from(&self, start: NodeId, rest: &str) -> Option<NodeId> {
        let mut current = start;
        for seg in rest.split('/') {
            if seg.is_empty() {
                continue;
            }
            current = self.find_child(current, seg)?;
        }
        Some(current)
    }

    pub fn add_include(&mut self, inc: IncludeRef) {
        if !self.includes.contains(&inc) {
            self.includes.push(inc);
        }
    }

    pub fn add_memreserve(&mut self, start: u64, len: u64) {
        if !self.memreserves.contains(&(start, len)) {
            self.memreserves.push((start, len));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_node_frees_labels_recursively() {
        let mut t = Tree::new();
        let mut w = Warnings::default();
        let soc = t.add_child_raw(t.root_id(), "soc");
        t.declare_label(soc, "soc_label", "a", &mut w).unwrap();
        let child = t.add_child_raw(soc, "gpio@0");
        t.declare_label(child, "gpio0", "a", &mut w).unwrap();

        t.delete_node(soc);
        assert!(!t.labels.contains_key("soc_label"));
        assert!(!t.labels.contains_key("gpio0"));
        assert!(t.get(t.root_id()).children.is_empty());
    }

    #[test]
    fn status_coercion_and_bootargs_concat() {
        let mut t = Tree::new();
        let root = t.root_id();
        t.write_property(root, Property::new("status", vec![Chunk::Str("on".into())]));
        assert_eq!(
            t.get(root).find_property("status").unwrap().chunks,
            vec![Chunk::Str("okay".into())]
        );
        t.write_property(root, Property::new("status", vec![Chunk::Str("n".into())]));
        assert_eq!(
            t.get(root).find_property("status").unwrap().chunks,
            vec![Chunk::Str("disabled".into())]
        );

        t.write_property(root, Property::new("bootargs", vec![Chunk::Str("a=0".into())]));
        t.write_property(root, Property::new("bootargs", vec![Chunk::Str("b=1".into())]));
        assert_eq!(
            t.get(root).find_property("bootargs").unwrap().chunks,
            vec![Chunk::Str("a=0 b=1".into())]
        );
    }

    #[test]
    fn resolve_path_via_alias_string() {
        let mut t = Tree::new();
        let root = t.root_id();
        let soc = t.get_or_add_child(root, "soc");
        t.get_or_add_child(soc, "gpio@1000");
        let aliases = t.get_or_add_child(root, "aliases");
        t.write_property(
            aliases,
            Property::new("gpio", vec![Chunk::Str("/soc/gpio@1000".into())]),
        );
        let resolved = t.resolve_path("gpio").unwrap();
        assert_eq!(t.node_path(resolved), "/soc/gpio@1000");
    }
}
