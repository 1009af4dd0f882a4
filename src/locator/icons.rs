/// Icon pattern lexicon: maps natural-language icon queries to resource-id
/// substring families commonly used for that icon on Android.
///
/// Matching is first-hit in declaration order; a query touching several
/// categories resolves by table position, not relevance.

pub const ICON_PATTERNS: &[(&str, &[&str])] = &[
    ("back", &["back", "navigate_up", "nav_back", "arrow_back", "up_button"]),
    ("close", &["close", "cancel", "dismiss", "exit", "clear_button"]),
    ("menu", &["menu", "overflow", "more_options", "hamburger", "drawer", "kebab"]),
    ("search", &["search", "magnifier", "find", "query"]),
    ("settings", &["settings", "preferences", "gear", "config"]),
    ("share", &["share", "send_to", "forward"]),
    ("add", &["add", "plus", "create", "compose", "fab"]),
    ("delete", &["delete", "trash", "remove", "bin"]),
    ("edit", &["edit", "pencil", "rename", "modify"]),
    ("home", &["home", "house", "main_nav"]),
    ("profile", &["profile", "avatar", "account", "user_icon"]),
    ("favorite", &["favorite", "star", "heart", "bookmark", "like"]),
    ("refresh", &["refresh", "reload", "sync", "retry"]),
    ("send", &["send", "submit", "confirm"]),
];

fn contains_either(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}

/// Resolve a free-text query to a resource-id pattern family, if the query
/// names a known icon category. Case-insensitive substring containment is
/// checked against the category name and each of its patterns.
pub fn match_icon_pattern(query: &str) -> Option<&'static [&'static str]> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return None;
    }
    for &(category, patterns) in ICON_PATTERNS {
        if contains_either(&q, category) || patterns.iter().any(|p| contains_either(&q, p)) {
            tracing::debug!(query = %query, category = %category, "icon pattern family matched");
            return Some(patterns);
        }
    }
    None
}

/// Whether a resource id contains any of the family's patterns,
/// case-insensitively.
pub fn matches_resource_id(resource_id: &str, patterns: &[&str]) -> bool {
    let id = resource_id.to_lowercase();
    patterns.iter().any(|p| id.contains(p))
}
