//! Markdown heading parser. Walks the document line by line, tracking fence
//! state so headings inside fenced code blocks are never mistaken for real
//! section breaks. This is not a general CommonMark parser — it only needs
//! to find ATX headings (`#`..`######`) and their byte spans.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: usize,
    pub text: String,
    /// Byte offset of the start of the heading line.
    pub start: usize,
}

pub fn parse_headings(content: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut in_fence = false;
    let mut fence_marker = "";
    let mut offset = 0usize;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_end_matches('\n').trim_end_matches('\r');
        let line_trimmed_start = trimmed.trim_start();

        if let Some(marker) = fence_opener(line_trimmed_start) {
            if in_fence && line_trimmed_start.starts_with(fence_marker) {
                in_fence = false;
            } else if !in_fence {
                in_fence = true;
                fence_marker = marker;
            }
        } else if !in_fence {
            if let Some((level, text)) = parse_atx(line_trimmed_start) {
                headings.push(Heading {
                    level,
                    text,
                    start: offset,
                });
            }
        }

        offset += line.len();
    }

    headings
}

fn fence_opener(line: &str) -> Option<&'static str> {
    if line.starts_with("```") {
        Some("```")
    } else if line.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

fn parse_atx(line: &str) -> Option<(usize, String)> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None; // "#notaheading"
    }
    let text = rest.trim().trim_end_matches('#').trim().to_string();
    Some((hashes, text))
}

/// Extract the exact byte slice for the first heading matching `header`
/// (case-insensitive), up to but excluding the next heading of the same or
/// shallower level, or end of document.
pub fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let headings = parse_headings(content);
    let target = headings
        .iter()
        .enumerate()
        .find(|(_, h)| h.text.eq_ignore_ascii_case(header))?;
    let (idx, heading) = target;

    let end = headings[idx + 1..]
        .iter()
        .find(|h| h.level <= heading.level)
        .map(|h| h.start)
        .unwrap_or(content.len());

    Some(&content[heading.start..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_shallow_and_deep_headings() {
        let doc = "# Title\n\nSome text\n\n## Acceptance Criteria\n- item\n\n## Dependencies\nnone\n";
        let headings = parse_headings(doc);
        assert_eq!(headings.len(), 3);
        assert_eq!(headings[1].text, "Acceptance Criteria");
        assert_eq!(headings[1].level, 2);
    }

    #[test]
    fn ignores_headings_inside_fenced_code() {
        let doc = "# Title\n\n```\n# not a heading\n```\n\n## Real Section\nbody\n";
        let headings = parse_headings(doc);
        assert_eq!(headings.len(), 2);
        assert_eq!(headings[1].text, "Real Section");
    }

    #[test]
    fn extract_section_stops_at_same_level_heading() {
        let doc = "# Title\n\n## Acceptance Criteria\nline one\nline two\n\n## Dependencies\nother\n";
        let section = extract_section(doc, "acceptance criteria").unwrap();
        assert!(section.contains("line one"));
        assert!(section.contains("line two"));
        assert!(!section.contains("other"));
    }

    #[test]
    fn extract_section_runs_to_eof_when_last() {
        let doc = "# Title\n\n## Dependencies\nlast section\ntrailing\n";
        let section = extract_section(doc, "Dependencies").unwrap();
        assert!(section.ends_with("trailing\n"));
    }

    #[test]
    fn extract_section_matches_first_duplicate_header() {
        let doc = "## Notes\nfirst\n\n## Notes\nsecond\n";
        let section = extract_section(doc, "Notes").unwrap();
        assert!(section.contains("first"));
        assert!(!section.contains("second"));
    }

    #[test]
    fn missing_header_returns_none() {
        let doc = "# Title\nbody\n";
        assert!(extract_section(doc, "Nonexistent").is_none());
    }
}
