//! MQTT topic filter matching
//!
//! `+` matches exactly one level, a trailing `#` matches the parent level and
//! everything below it. Filters starting with a wildcard never match topics
//! starting with `$`.

/// Returns true when `topic` matches `filter`
pub fn matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
