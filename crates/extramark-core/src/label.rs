use std::collections::HashSet;

/// Pandoc-style heading slug: keep letters, digits, `_`, `-` and `.`,
/// spaces become hyphens, everything lowercased, leading non-letters
/// dropped. An empty result falls back to "section".
pub(crate) fn make_heading_id(text: &str) -> String {
    let mut out = String::new();
    let mut pending_hyphen = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() {
                pending_hyphen = true;
            }
            continue;
        }
        if ch.is_alphanumeric() || ch == '_' || ch == '-' || ch == '.' {
            if out.is_empty() && !ch.is_alphabetic() {
                // Identifiers start at the first letter.
                continue;
            }
            if pending_hyphen {
                out.push('-');
                pending_hyphen = false;
            }
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        }
    }
    if out.is_empty() {
        "section".to_string()
    } else {
        out
    }
}

/// Deduplicates against the document's already-issued ids with `-1`, `-2`
/// suffixes.
pub(crate) fn make_unique_id(base: &str, used: &mut HashSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let mut suffix = 1usize;
    loop {
        let candidate = format!("{}-{}", base, suffix);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Splits a trailing `{#id}` suffix off a heading's content, returning the
/// remaining content and the explicit id.
pub(crate) fn strip_explicit_id(text: &str) -> (&str, Option<&str>) {
    let trimmed = text.trim_end();
    if !trimmed.ends_with('}') {
        return (text, None);
    }
    let open = match trimmed.rfind("{#") {
        Some(idx) => idx,
        None => return (text, None),
    };
    let id = &trimmed[open + 2..trimmed.len() - 1];
    if id.is_empty() || id.bytes().any(|b| b.is_ascii_whitespace() || b == b'}') {
        return (text, None);
    }
    (trimmed[..open].trim_end(), Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_shapes() {
        assert_eq!(make_heading_id("Heading identifiers in HTML"), "heading-identifiers-in-html");
        assert_eq!(make_heading_id("3. Applications"), "applications");
        assert_eq!(make_heading_id("!!!"), "section");
        assert_eq!(make_heading_id("Dogs?--in *my* house?"), "dogs--in-my-house");
    }

    #[test]
    fn unique_ids_get_numeric_suffixes() {
        let mut used = HashSet::new();
        assert_eq!(make_unique_id("a", &mut used), "a");
        assert_eq!(make_unique_id("a", &mut used), "a-1");
        assert_eq!(make_unique_id("a", &mut used), "a-2");
    }

    #[test]
    fn explicit_id_suffix() {
        assert_eq!(strip_explicit_id("Title {#custom}"), ("Title", Some("custom")));
        assert_eq!(strip_explicit_id("No id here"), ("No id here", None));
        assert_eq!(strip_explicit_id("Brace {#}"), ("Brace {#}", None));
    }
}
