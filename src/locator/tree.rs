/// Accessibility dump parser.
///
/// Turns the raw `uiautomator dump` XML into an ordered forest of
/// `AccessibilityNode`. The `<hierarchy>` wrapper is transparent and the
/// markup may carry several top-level siblings. Anything unparseable yields
/// an empty forest: downstream tiers treat "no accessibility nodes" as a
/// normal fallback trigger, not a fault.
use std::sync::OnceLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use crate::locator::types::{AccessibilityNode, Bounds, Selector};

fn bounds_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]").expect("bounds pattern")
    })
}

/// Parse a `bounds="[l,t][r,b]"` attribute value. Malformed input maps to
/// the zero rectangle rather than an error.
pub fn parse_bounds(raw: &str) -> Bounds {
    let Some(caps) = bounds_re().captures(raw) else {
        return Bounds::default();
    };
    let coord = |i: usize| caps[i].parse::<i32>().unwrap_or(0);
    Bounds::new(coord(1), coord(2), coord(3), coord(4))
}

fn node_from_attrs(start: &BytesStart) -> AccessibilityNode {
    let mut node = AccessibilityNode::default();
    let mut bounds = Bounds::default();

    for attr in start.attributes().flatten() {
        let value = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_default();
        match attr.key.as_ref() {
            b"index" => node.index = value.parse().unwrap_or(0),
            b"text" => node.text = value,
            b"resource-id" => node.resource_id = value,
            b"class" => node.class_name = value,
            b"content-desc" => node.content_desc = value,
            b"clickable" => node.clickable = value == "true",
            b"focusable" => node.focusable = value == "true",
            b"bounds" => bounds = parse_bounds(&value),
            _ => {}
        }
    }

    node.set_bounds(bounds);
    node
}

fn attach(roots: &mut Vec<AccessibilityNode>, stack: &mut [AccessibilityNode], node: AccessibilityNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

/// Parse raw dump markup into a node forest.
pub fn parse_tree(xml: &str) -> Vec<AccessibilityNode> {
    if xml.trim().is_empty() {
        return Vec::new();
    }

    let mut reader = Reader::from_str(xml);
    let mut roots: Vec<AccessibilityNode> = Vec::new();
    let mut stack: Vec<AccessibilityNode> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"node" => {
                stack.push(node_from_attrs(&e));
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"node" => {
                let node = node_from_attrs(&e);
                attach(&mut roots, &mut stack, node);
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"node" => {
                if let Some(node) = stack.pop() {
                    attach(&mut roots, &mut stack, node);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "accessibility dump unparseable, returning empty forest");
                return Vec::new();
            }
        }
    }

    // Unbalanced markup: attach whatever is still open so nothing is lost.
    while let Some(node) = stack.pop() {
        attach(&mut roots, &mut stack, node);
    }

    roots
}

/// Depth-first flattening, parents before children.
pub fn flatten(forest: &[AccessibilityNode]) -> Vec<&AccessibilityNode> {
    fn walk<'a>(node: &'a AccessibilityNode, out: &mut Vec<&'a AccessibilityNode>) {
        out.push(node);
        for child in &node.children {
            walk(child, out);
        }
    }

    let mut out = Vec::new();
    for root in forest {
        walk(root, &mut out);
    }
    out
}

/// Whether a node satisfies every populated selector field.
///
/// Exact text matches against `text` or `content-desc`; contains-text is
/// case-insensitive; resource-id and class-name are substring matches.
pub fn matches_selector(node: &AccessibilityNode, selector: &Selector) -> bool {
    if let Some(text) = &selector.text {
        if node.text != *text && node.content_desc != *text {
            return false;
        }
    }
    if let Some(fragment) = &selector.text_contains {
        let needle = fragment.to_lowercase();
        let in_text = node.text.to_lowercase().contains(&needle);
        let in_desc = node.content_desc.to_lowercase().contains(&needle);
        if !in_text && !in_desc {
            return false;
        }
    }
    if let Some(id) = &selector.resource_id {
        if !node.resource_id.contains(id.as_str()) {
            return false;
        }
    }
    if let Some(class) = &selector.class_name {
        if !node.class_name.contains(class.as_str()) {
            return false;
        }
    }
    true
}

/// Collect every node in the forest matching the selector, in tree order.
pub fn query(forest: &[AccessibilityNode], selector: &Selector) -> Vec<AccessibilityNode> {
    flatten(forest)
        .into_iter()
        .filter(|n| matches_selector(n, selector))
        .cloned()
        .collect()
}
