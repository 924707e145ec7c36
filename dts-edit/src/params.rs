//! The Parameter Engine: applies a single `dtparam` against a tree's
//! `__overrides__` declarations (spec.md §4.3).

use crate::error::DtsError;
use crate::node::{base_name, NodeId};
use crate::property::Property;
use crate::tree::Tree;
use crate::value::{CellTerm, Chunk};
use crate::valueinterp::{boolean_value, int_to_cell_term, integer_value, IntegerValue};

/// Applies `name[=value]` against `tree`'s `__overrides__` node, walking the
/// `(target, declaration)` pairs of the matching property in order.
pub fn apply_dtparam(tree: &mut Tree, name: &str, value: Option<&str>) -> Result<(), DtsError> {
    let overrides_id = tree
        .find_child(tree.root_id(), "__overrides__")
        .ok_or_else(|| DtsError::MissingOverrides(name.to_string()))?;
    let prop = tree
        .get(overrides_id)
        .find_property(name)
        .cloned()
        .ok_or_else(|| DtsError::UnknownParam(name.to_string()))?;
    let v = value.unwrap_or("");

    let chunks = &prop.chunks;
    if chunks.is_empty() {
        return Err(DtsError::InvalidOverrideDeclaration(name.to_string()));
    }
    let mut i = 0;
    while i < chunks.len() {
        let target = chunks
            .get(i)
            .ok_or_else(|| DtsError::InvalidOverrideDeclaration(name.to_string()))?;
        i += 1;
        let decl = chunks
            .get(i)
            .ok_or_else(|| DtsError::InvalidOverrideDeclaration(name.to_string()))?;
        i += 1;
        let d = decl
            .as_str()
            .ok_or_else(|| DtsError::InvalidOverrideDeclaration(format!("{decl}")))?;

        let extra = if d.ends_with('=') {
            let e = chunks.get(i).cloned();
            i += 1;
            e
        } else {
            None
        };

        dispatch_override(tree, target, d, v, extra.as_ref())?;
    }
    Ok(())
}

fn dispatch_override(
    tree: &mut Tree,
    target: &Chunk,
    d: &str,
    v: &str,
    extra: Option<&Chunk>,
) -> Result<(), DtsError> {
    if target.is_zero_cell() {
        return apply_fragment_enable(tree, d, v);
    }
    let label = target
        .as_single_labelref_cell()
        .ok_or_else(|| DtsError::InvalidOverrideDeclaration(d.to_string()))?;
    let node_id = *tree
        .labels
        .get(label)
        .ok_or_else(|| DtsError::UnknownLabel {
            file: String::new(),
            label: label.to_string(),
        })?;

    if let Some(prop_name) = d.strip_suffix('?') {
        return apply_boolean_override(tree, node_id, prop_name, v);
    }
    // `D = PROP TYPECHAR OFFSET [= ASSIGN]`: TYPECHAR only counts as such
    // when immediately followed by a decimal OFFSET, and OFFSET always
    // comes before any `=ASSIGN`. Scanning the whole declaration (assign
    // included) for a bare typechar misreads a baked string override whose
    // ASSIGN happens to contain one, e.g. `model=bcm2835.board`.
    let head = d.split_once('=').map_or(d, |(prop_and_type, _)| prop_and_type);
    if let Some(idx) = find_typechar_offset(head) {
        return apply_integer_override(tree, node_id, d, idx, v, extra);
    }
    apply_string_override(tree, node_id, d, v, extra)
}

/// Finds the index of a `TYPECHAR` (`. ; : #` or `"`) immediately followed
/// by a decimal digit, i.e. the start of an `OFFSET`.
fn find_typechar_offset(s: &str) -> Option<usize> {
    const TYPECHARS: &[u8] = b".;:#\"";
    let bytes = s.as_bytes();
    (0..bytes.len()).find(|&i| TYPECHARS.contains(&bytes[i]) && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
}

fn apply_boolean_override(
    tree: &mut Tree,
    node_id: NodeId,
    prop_name: &str,
    v: &str,
) -> Result<(), DtsError> {
    let b = boolean_value(v)?;
    let node = tree.get_mut(node_id);
    if b {
        if node.find_property(prop_name).is_none() {
            node.properties.push(Property::boolean(prop_name));
        }
    } else {
        node.properties.retain(|p| p.name != prop_name);
    }
    Ok(())
}

fn apply_string_override(
    tree: &mut Tree,
    node_id: NodeId,
    d: &str,
    v: &str,
    extra: Option<&Chunk>,
) -> Result<(), DtsError> {
    let (prop_name, val) = match d.split_once('=') {
        Some((name, rhs)) if !rhs.is_empty() => (name.to_string(), rhs.to_string()),
        Some((name, _)) => (name.to_string(), extra_cell_text(extra)?),
        None => (d.to_string(), v.to_string()),
    };
    tree.write_property(node_id, Property::new(prop_name, vec![Chunk::Str(val)]));
    Ok(())
}

fn apply_integer_override(
    tree: &mut Tree,
    node_id: NodeId,
    d: &str,
    type_idx: usize,
    v: &str,
    extra: Option<&Chunk>,
) -> Result<(), DtsError> {
    let prop_name = d[..type_idx].to_string();
    let typechar = d.as_bytes()[type_idx] as char;
    let width = match typechar {
        '.' => 1u8,
        ';' => 2,
        ':' => 4,
        '#' => 8,
        '"' => 0,
        _ => return Err(DtsError::InvalidOverrideDeclaration(d.to_string())),
    };
    let rest = &d[type_idx + 1..];
    let (offset_str, assign) = match rest.split_once('=') {
        Some((o, a)) => (o, Some(a)),
        None => (rest, None),
    };
    let offset: usize = offset_str
        .parse()
        .map_err(|_| DtsError::InvalidOverrideDeclaration(d.to_string()))?;

    let val_text = match assign {
        Some(a) if !a.is_empty() => a.to_string(),
        Some(_) => extra_cell_text(extra)?,
        None => v.to_string(),
    };

    if width == 0 {
        tree.write_property(node_id, Property::new(&prop_name, vec![Chunk::Str(val_text)]));
        return Ok(());
    }

    match integer_value(&val_text, width)? {
        IntegerValue::Label(l) => {
            patch_cell(tree, node_id, &prop_name, offset, width, CellTerm::LabelRef(l))?;
        }
        IntegerValue::Int(n) => {
            patch_cell(tree, node_id, &prop_name, offset, width, int_to_cell_term(n, width))?;
            if prop_name == "reg" {
                rewrite_unit_address(tree, node_id, n);
            }
        }
    }
    Ok(())
}

fn extra_cell_text(extra: Option<&Chunk>) -> Result<String, DtsError> {
    match extra {
        Some(Chunk::Cells { items, .. }) if items.len() == 1 => Ok(items[0].to_string()),
        other => Err(DtsError::InvalidOverrideDeclaration(format!(
            "expected a one-cell assignment chunk, found {other:?}"
        ))),
    }
}

/// Patches element `offset / width` of `prop_name`'s first Cells chunk,
/// zero-padding preceding elements and auto-creating the chunk if absent
/// (spec.md §4.3 and the "extends the chunk" boundary behavior). Writes to
/// a missing `reg` property are silently dropped; the caller still performs
/// the unit-address rewrite.
fn patch_cell(
    tree: &mut Tree,
    node_id: NodeId,
    prop_name: &str,
    offset: usize,
    width: u8,
    term: CellTerm,
) -> Result<(), DtsError> {
    if offset % width as usize != 0 {
        return Err(DtsError::UnalignedOffset {
            offset,
            elem_size: width as usize,
        });
    }
    let node = tree.get_mut(node_id);
    if node.find_property(prop_name).is_none() {
        if prop_name == "reg" {
            return Ok(());
        }
        node.properties.push(Property::new(
            prop_name,
            vec![Chunk::Cells {
                elem_size: width,
                items: Vec::new(),
            }],
        ));
    }
    let prop = node.find_property_mut(prop_name).expect("just ensured present");

    // Spec.md §4.3: "the chunk containing byte offset OFFSET" — a global
    // byte offset across the property's chunks, not always the first
    // `Cells` chunk. Walk chunks accumulating byte length; the running
    // last `Cells` chunk also catches an offset at or past its own end,
    // so extending a single-chunk property at its boundary still works.
    let mut chunk_start = 0usize;
    let mut target = None;
    let last_cells = prop.chunks.iter().rposition(|c| matches!(c, Chunk::Cells { .. }));
    for (i, c) in prop.chunks.iter().enumerate() {
        if let Chunk::Cells { elem_size, items } = c {
            let span = items.len() * *elem_size as usize;
            if offset < chunk_start + span || Some(i) == last_cells {
                target = Some((i, chunk_start));
                break;
            }
            chunk_start += span;
        }
    }
    let (chunk_idx, chunk_start) = target.unwrap_or_else(|| {
        prop.chunks.push(Chunk::Cells {
            elem_size: width,
            items: Vec::new(),
        });
        (prop.chunks.len() - 1, 0)
    });

    if let Chunk::Cells { items, .. } = &mut prop.chunks[chunk_idx] {
        let elem_index = (offset - chunk_start) / width as usize;
        while items.len() <= elem_index {
            items.push(CellTerm::int(0));
        }
        items[elem_index] = term;
    }
    Ok(())
}

fn rewrite_unit_address(tree: &mut Tree, node_id: NodeId, val: u64) {
    let node = tree.get_mut(node_id);
    let base = base_name(&node.name).to_string();
    node.name = format!("{base}@{val:x}");
}

fn apply_fragment_enable(tree: &mut Tree, d: &str, v: &str) -> Result<(), DtsError> {
    let mut b = boolean_value(v)?;
    for (op, n) in parse_fragment_ops(d) {
        match op {
            '!' => b = !b,
            '+' => b = true,
            '-' => b = false,
            _ => {}
        }
        let frag = find_fragment(tree, n).ok_or(DtsError::MissingFragment(n))?;
        let child = tree
            .get(frag)
            .children
            .iter()
            .copied()
            .find(|&c| {
                let name = &tree.get(c).name;
                name == "__overlay__" || name == "__dormant__"
            })
            .ok_or(DtsError::MissingFragment(n))?;
        let new_name = if b { "__overlay__" } else { "__dormant__" };
        tree.get_mut(child).name = new_name.to_string();
    }
    Ok(())
}

fn parse_fragment_ops(d: &str) -> Vec<(char, u32)> {
    let mut out = Vec::new();
    let mut chars = d.chars().peekable();
    while let Some(c) = chars.next() {
        if "=!+-".contains(c) {
            let mut num = String::new();
            while let Some(&d2) = chars.peek() {
                if d2.is_ascii_digit() {
                    num.push(d2);
                    chars.next();
                } else {
                    break;
                }
            }
            if let Ok(n) = num.parse() {
                out.push((c, n));
            }
        }
    }
    out
}

fn find_fragment(tree: &Tree, n: u32) -> Option<NodeId> {
    let at = format!("fragment@{n}");
    let dash = format!("fragment-{n}");
    tree.get(tree.root_id())
        .children
        .iter()
        .copied()
        .find(|&c| {
            let name = &tree.get(c).name;
            name == &at || name == &dash
        })
}
