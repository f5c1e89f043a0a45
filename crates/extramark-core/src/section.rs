//! Splitting a document into sections and joining them back.
//!
//! Sections begin at explicit break-marker lines when any are present,
//! otherwise at top-level headings (the smallest ATX level in the
//! document). Text is preserved verbatim except for normalized spacing at
//! section boundaries, so split followed by join reproduces the document
//! modulo boundary whitespace.

/// Splits `source` into sections. A document with neither break markers
/// nor headings comes back as one section.
pub fn split_sections(source: &str) -> Vec<String> {
    let lines: Vec<&str> = source.lines().collect();

    let has_breaks = lines.iter().any(|line| is_break_marker(line));
    let top_level = lines.iter().filter_map(|line| heading_level(line)).min();

    let starts_section: Box<dyn Fn(&str) -> bool> = if has_breaks {
        Box::new(|line: &str| is_break_marker(line))
    } else if let Some(top) = top_level {
        Box::new(move |line: &str| heading_level(line) == Some(top))
    } else {
        return vec![source.trim_end().to_string()];
    };

    let mut sections = Vec::new();
    let mut current = String::new();
    for line in &lines {
        if starts_section(line) && !current.trim().is_empty() {
            sections.push(current.trim_end().to_string());
            current = String::new();
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        sections.push(current.trim_end().to_string());
    }
    if sections.is_empty() {
        sections.push(String::new());
    }
    sections
}

/// Inverse of [`split_sections`]: sections separated by one blank line.
pub fn join_sections(sections: &[String]) -> String {
    let mut out = String::new();
    for (index, section) in sections.iter().enumerate() {
        if index > 0 {
            out.push_str("\n\n");
        }
        out.push_str(section.trim_end());
    }
    out.push('\n');
    out
}

fn heading_level(line: &str) -> Option<u8> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let hashes = trimmed.bytes().take_while(|&b| b == b'#').count();
    if hashes == 0 {
        return None;
    }
    Some(hashes.min(6) as u8)
}

/// 3+ of `-`, `_` or `*` (optionally space-separated) and nothing else.
fn is_break_marker(line: &str) -> bool {
    let trimmed = line.trim();
    let mut delim = 0u8;
    let mut count = 0usize;
    for b in trimmed.bytes() {
        match b {
            b' ' | b'\t' => {}
            b'-' | b'_' | b'*' => {
                if delim == 0 {
                    delim = b;
                } else if b != delim {
                    return false;
                }
                count += 1;
            }
            _ => return false,
        }
    }
    count >= 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_top_level_headings() {
        let source = "intro\n\n# One\ntext\n\n## Sub\n\n# Two\nmore\n";
        let sections = split_sections(source);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0], "intro");
        assert!(sections[1].starts_with("# One"));
        assert!(sections[1].contains("## Sub"));
        assert!(sections[2].starts_with("# Two"));
    }

    #[test]
    fn break_markers_win_over_headings() {
        let source = "# A\ntext\n* * *\n# B\n";
        let sections = split_sections(source);
        assert_eq!(sections.len(), 2);
        assert!(sections[1].starts_with("* * *"));
    }

    #[test]
    fn split_join_round_trip() {
        let source = "# One\nalpha\n\n# Two\nbeta\n";
        let joined = join_sections(&split_sections(source));
        assert_eq!(joined, source);
    }
}
