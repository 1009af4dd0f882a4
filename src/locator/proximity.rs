/// Anchor-based re-ranking of resolved elements.
///
/// Flat pixel distance misleads on list UIs: an anchor and an action icon
/// from two different rows can be closer in raw pixels than the icon in the
/// anchor's own row. A candidate sharing the anchor's smallest grouping
/// container is therefore promoted ahead of merely-near candidates; pure
/// distance is the fallback when the tree offers no shared grouping.
use crate::locator::tree;
use crate::locator::types::{AccessibilityNode, FoundElement, Point, ProximityMethod};

/// Layout containers that group list rows and toolbars.
fn is_grouping_container(class_name: &str) -> bool {
    class_name.contains("ViewGroup") || class_name.contains("Layout")
}

/// The smallest grouping container whose bounds contain the point.
fn smallest_container<'a>(
    containers: &[&'a AccessibilityNode],
    point: Point,
) -> Option<&'a AccessibilityNode> {
    containers
        .iter()
        .copied()
        .filter(|c| c.bounds.contains(point.x, point.y))
        .min_by_key(|c| c.bounds.width() as i64 * c.bounds.height() as i64)
}

fn distance(a: Point, b: Point) -> f64 {
    let dx = (a.x - b.x) as f64;
    let dy = (a.y - b.y) as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Reorder `elements` by spatial relationship to the anchor point.
///
/// Candidates whose smallest grouping container also holds the anchor come
/// first (stable among themselves); the remainder is sorted by Euclidean
/// distance to the anchor. When nothing shares a container, all elements
/// are sorted purely by distance and the method reported is `distance`.
pub fn rank_by_proximity(
    elements: Vec<FoundElement>,
    anchor: Point,
    forest: &[AccessibilityNode],
) -> (Vec<FoundElement>, ProximityMethod) {
    let containers: Vec<&AccessibilityNode> = tree::flatten(forest)
        .into_iter()
        .filter(|n| is_grouping_container(&n.class_name))
        .collect();

    let anchor_container = smallest_container(&containers, anchor);

    let mut promoted: Vec<FoundElement> = Vec::new();
    let mut rest: Vec<(f64, FoundElement)> = Vec::new();

    for element in elements {
        let center = element.center();
        let shares = match (anchor_container, smallest_container(&containers, center)) {
            (Some(a), Some(c)) => std::ptr::eq(a, c),
            _ => false,
        };
        if shares {
            promoted.push(element);
        } else {
            rest.push((distance(center, anchor), element));
        }
    }

    rest.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    if promoted.is_empty() {
        let ordered = rest.into_iter().map(|(_, e)| e).collect();
        (ordered, ProximityMethod::Distance)
    } else {
        promoted.extend(rest.into_iter().map(|(_, e)| e));
        (promoted, ProximityMethod::Containment)
    }
}
