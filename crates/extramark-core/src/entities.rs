use once_cell::sync::Lazy;
use std::collections::HashSet;

// Named entities the smart encoder passes through. Anything not listed is
// treated as a literal ampersand and escaped.
static NAMED_ENTITIES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "AElig", "Aacute", "Acirc", "Agrave", "Aring", "Atilde", "Auml", "Ccedil", "Dagger",
        "ETH", "Eacute", "Ecirc", "Egrave", "Euml", "Iacute", "Icirc", "Igrave", "Iuml",
        "Ntilde", "OElig", "Oacute", "Ocirc", "Ograve", "Oslash", "Otilde", "Ouml", "THORN",
        "Uacute", "Ucirc", "Ugrave", "Uuml", "Yacute", "aacute", "acirc", "acute", "aelig",
        "agrave", "amp", "apos", "aring", "atilde", "auml", "bdquo", "brvbar", "bull", "ccedil",
        "cedil", "cent", "circ", "copy", "curren", "dagger", "deg", "divide", "eacute", "ecirc",
        "egrave", "eth", "euml", "euro", "frac12", "frac14", "frac34", "frasl", "gt", "hellip",
        "iacute", "icirc", "iexcl", "igrave", "iquest", "iuml", "laquo", "ldquo", "lsaquo",
        "lsquo", "lt", "macr", "mdash", "micro", "middot", "minus", "nbsp", "ndash", "not",
        "ntilde", "oacute", "ocirc", "oelig", "ograve", "ordf", "ordm", "oslash", "otilde",
        "ouml", "para", "permil", "plusmn", "pound", "prime", "quot", "raquo", "rdquo",
        "reg", "rsaquo", "rsquo", "sbquo", "sect", "shy", "sup1", "sup2", "sup3", "szlig",
        "thorn", "tilde", "times", "trade", "uacute", "ucirc", "ugrave", "uml", "uuml",
        "yacute", "yen", "yuml",
    ]
    .iter()
    .copied()
    .collect()
});

/// Length of the entity starting at `start` (which must index a `&`), or
/// `None` when the text does not read as a named or numeric entity.
pub(crate) fn scan_entity(bytes: &[u8], start: usize, end: usize) -> Option<usize> {
    debug_assert_eq!(bytes.get(start), Some(&b'&'));
    let mut i = start + 1;
    if i >= end {
        return None;
    }
    if bytes[i] == b'#' {
        i += 1;
        let hex = matches!(bytes.get(i), Some(b'x') | Some(b'X'));
        if hex {
            i += 1;
        }
        let digits_start = i;
        while i < end
            && (if hex {
                bytes[i].is_ascii_hexdigit()
            } else {
                bytes[i].is_ascii_digit()
            })
        {
            i += 1;
        }
        if i == digits_start || i >= end || bytes[i] != b';' {
            return None;
        }
        return Some(i + 1 - start);
    }
    let name_start = i;
    while i < end && bytes[i].is_ascii_alphanumeric() {
        i += 1;
    }
    if i == name_start || i >= end || bytes[i] != b';' {
        return None;
    }
    let name = std::str::from_utf8(&bytes[name_start..i]).ok()?;
    if NAMED_ENTITIES.contains(name) {
        Some(i + 1 - start)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> Option<usize> {
        scan_entity(text.as_bytes(), 0, text.len())
    }

    #[test]
    fn recognizes_named_and_numeric_forms() {
        assert_eq!(scan("&amp;"), Some(5));
        assert_eq!(scan("&hellip; rest"), Some(8));
        assert_eq!(scan("&#169;"), Some(6));
        assert_eq!(scan("&#x1F6;"), Some(7));
    }

    #[test]
    fn rejects_malformed_or_unknown() {
        assert_eq!(scan("&amp"), None);
        assert_eq!(scan("&;"), None);
        assert_eq!(scan("&#;"), None);
        assert_eq!(scan("&#xG1;"), None);
        assert_eq!(scan("&notarealentityname;"), None);
        assert_eq!(scan("& amp;"), None);
    }
}
