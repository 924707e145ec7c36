//! Node records (spec.md §3).

use crate::property::Property;

/// A stable index into a [`crate::tree::Tree`]'s node arena (spec.md §9's
/// "arena of Nodes keyed by stable indices" design note).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// A mutable device-tree node living inside a `Tree`'s arena.
#[derive(Clone, Debug)]
pub struct NodeData {
    pub name: String,
    pub properties: Vec<Property>,
    pub children: Vec<NodeId>,
    pub labels: Vec<String>,
    pub parent: Option<NodeId>,
    pub depth: usize,
}

impl NodeData {
    pub fn root() -> Self {
        Self {
            name: String::new(),
            properties: Vec::new(),
            children: Vec::new(),
            labels: Vec::new(),
            parent: None,
            depth: 0,
        }
    }

    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn find_property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.name == name)
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "/"
        } else {
            &self.name
        }
    }
}

/// A first-seen-ordered, deduplicated include directive (spec.md §9).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncludeRef {
    pub path: String,
    pub angled: bool,
}

/// The part of a node name before any `@unit-address` suffix.
pub fn base_name(name: &str) -> &str {
    name.split('@').next().unwrap_or(name)
}

/// Child-name matching rule from spec.md §4.6: an exact match wins;
/// otherwise a query without `@` matches a candidate of the form
/// `NAME@<anything>`.
pub fn names_match(query: &str, candidate: &str) -> bool {
    if query == candidate {
        return true;
    }
    !query.contains('@') && base_name(candidate) == query
}

/// Extracts the hex unit-address suffix, if any (spec.md §4.6).
pub fn unit_address(name: &str) -> Option<u64> {
    let (_, addr) = name.split_once('@')?;
    u64::from_str_radix(addr, 16).ok()
}

/// The sibling-sort comparator from spec.md §4.6: nodes with a numeric
/// unit-address sort by that address; a node with one sorts before a node
/// without one; otherwise lexicographic name order.
pub fn addr_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (unit_address(a), unit_address(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuzzy_name_match_tolerates_unit_address() {
        assert!(names_match("gpio", "gpio@1000"));
        assert!(names_match("gpio@1000", "gpio@1000"));
        assert!(!names_match("gpio@1000", "gpio@2000"));
        assert!(!names_match("gpio@1000", "gpio"));
    }

    #[test]
    fn addr_cmp_orders_by_unit_address_then_name() {
        assert_eq!(addr_cmp("a@10", "a@20"), std::cmp::Ordering::Less);
        assert_eq!(addr_cmp("a@10", "b"), std::cmp::Ordering::Less);
        assert_eq!(addr_cmp("b", "a@10"), std::cmp::Ordering::Greater);
        assert_eq!(addr_cmp("bbb", "aaa"), std::cmp::Ordering::Greater);
    }
}
