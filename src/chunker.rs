//! Hierarchical markdown header splitter.
//!
//! Splits document text at ATX header lines, keeping each header visible
//! inside its own chunk and propagating the stack of active headers as
//! structured metadata. A single linear pass over the lines; stateless
//! across calls; output order equals source order.

use std::collections::BTreeMap;

/// A header marker and the level it maps to, e.g. `("##", 2)`.
#[derive(Debug, Clone)]
pub struct HeaderRule {
    pub marker: String,
    pub level: u8,
}

/// Default rules: `#` through the configured depth, one level per marker.
pub fn default_rules(max_depth: u8) -> Vec<HeaderRule> {
    (1..=max_depth)
        .map(|level| HeaderRule {
            marker: "#".repeat(level as usize),
            level,
        })
        .collect()
}

/// A header-scoped slice of the input text, before document metadata is
/// attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub text: String,
    /// Header text active at the start of this section, keyed by level.
    pub header_path: BTreeMap<u8, String>,
}

/// Split `text` at lines matching a header rule.
///
/// Every header line starts a new section, including consecutive headers
/// with no body text between them (header-only sections). Text before the
/// first header forms a section with an empty header path. When a header
/// of level L is seen, all active headers deeper than L are cleared and
/// the new header becomes active at L.
pub fn split_headers(text: &str, rules: &[HeaderRule]) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut active: BTreeMap<u8, String> = BTreeMap::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut buf_path: BTreeMap<u8, String> = BTreeMap::new();

    for line in text.lines() {
        if let Some((level, title)) = match_header(line, rules) {
            flush(&mut sections, &mut buf, &buf_path);
            active.retain(|l, _| *l < level);
            active.insert(level, title);
            buf_path = active.clone();
            // The header stays visible in its own section.
            buf.push(line);
        } else {
            buf.push(line);
        }
    }
    flush(&mut sections, &mut buf, &buf_path);

    sections
}

fn flush(sections: &mut Vec<Section>, buf: &mut Vec<&str>, path: &BTreeMap<u8, String>) {
    if buf.is_empty() {
        return;
    }
    let text = buf.join("\n").trim().to_string();
    buf.clear();
    // Blank preamble or blank trailing lines produce no section.
    if text.is_empty() {
        return;
    }
    sections.push(Section {
        text,
        header_path: path.clone(),
    });
}

/// Match a line against the header rules: one marker run, then whitespace,
/// then the label. The run length must equal a rule's marker exactly so
/// `###` never matches the `#` rule.
fn match_header<'a>(line: &'a str, rules: &[HeaderRule]) -> Option<(u8, String)> {
    let leading = line.chars().take_while(|c| *c == '#').count();
    if leading == 0 {
        return None;
    }
    let rule = rules.iter().find(|r| r.marker.len() == leading)?;
    let rest = &line[leading..];
    if !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    Some((rule.level, rest.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(text: &str) -> Vec<Section> {
        split_headers(text, &default_rules(5))
    }

    fn path(section: &Section) -> Vec<(u8, &str)> {
        section
            .header_path
            .iter()
            .map(|(l, t)| (*l, t.as_str()))
            .collect()
    }

    #[test]
    fn test_preamble_has_empty_path() {
        let sections = split("intro text\n\n# First\nbody");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].text, "intro text");
        assert!(sections[0].header_path.is_empty());
    }

    #[test]
    fn test_headers_stay_in_chunk_text() {
        let sections = split("# Coverage\nSome body.");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].text, "# Coverage\nSome body.");
        assert_eq!(path(&sections[0]), vec![(1, "Coverage")]);
    }

    #[test]
    fn test_header_path_inherits_ancestors() {
        let sections = split("# Coverage\n## Travel\nCovers evacuation.\n### Limits\nUp to 1M.");
        assert_eq!(sections.len(), 3);
        assert_eq!(path(&sections[1]), vec![(1, "Coverage"), (2, "Travel")]);
        assert_eq!(
            path(&sections[2]),
            vec![(1, "Coverage"), (2, "Travel"), (3, "Limits")]
        );
    }

    #[test]
    fn test_new_header_clears_deeper_levels() {
        let text = "# A\n## B\n### C\ndeep body\n## D\nshallow body";
        let sections = split(text);
        let last = sections.last().unwrap();
        assert_eq!(path(last), vec![(1, "A"), (2, "D")]);
    }

    #[test]
    fn test_consecutive_headers_produce_header_only_chunks() {
        let sections = split("# Coverage\n## Travel\nbody");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].text, "# Coverage");
        assert_eq!(sections[1].text, "## Travel\nbody");
    }

    #[test]
    fn test_header_prefix_invariant() {
        let text = "# One\n## Two\n### Three\nx\n#### Four\ny";
        for section in split(text) {
            let levels: Vec<u8> = section.header_path.keys().copied().collect();
            for (i, level) in levels.iter().enumerate() {
                assert_eq!(*level as usize, i + 1, "levels must form a prefix of 1..N");
            }
        }
    }

    #[test]
    fn test_order_preserved() {
        let text = "# A\na body\n# B\nb body\n# C\nc body";
        let sections = split(text);
        let titles: Vec<&str> = sections
            .iter()
            .map(|s| s.header_path.get(&1).unwrap().as_str())
            .collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_bounded_by_header_count_plus_one() {
        let text = "pre\n# A\n## B\n# C\nbody";
        let sections = split(text);
        let header_lines = text.lines().filter(|l| l.starts_with('#')).count();
        assert!(sections.len() <= header_lines + 1);
    }

    #[test]
    fn test_marker_without_space_is_not_a_header() {
        let sections = split("#hashtag not a header\nmore");
        assert_eq!(sections.len(), 1);
        assert!(sections[0].header_path.is_empty());
    }

    #[test]
    fn test_deeper_than_rules_is_body_text() {
        // Rules go to depth 5; a ###### line is plain text.
        let sections = split("# A\n###### not split\nbody");
        assert_eq!(sections.len(), 1);
        assert!(sections[0].text.contains("###### not split"));
    }

    #[test]
    fn test_empty_input() {
        assert!(split("").is_empty());
        assert!(split("\n\n\n").is_empty());
    }

    #[test]
    fn test_stateless_across_calls() {
        let text = "# A\nbody\n## B\nmore";
        assert_eq!(split(text), split(text));
    }
}
