use std::path::Path;

pub const MARKDOWN_EXTENSION: &str = "md";
const FALLBACK_STEM: &str = "document";
const MAX_STEM_CHARS: usize = 200;
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Last path component of a client-supplied name, with both separator styles.
fn base_name(raw: &str) -> &str {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw)
}

fn clean_component(raw: &str) -> String {
    let filtered: String = raw
        .chars()
        .filter(|ch| !ch.is_control() && !RESERVED_CHARS.contains(ch))
        .map(|ch| if ch.is_whitespace() { '_' } else { ch })
        .collect();

    let mut collapsed = String::with_capacity(filtered.len());
    for ch in filtered.chars() {
        if ch == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(ch);
    }

    let trimmed = collapsed.trim_matches(|ch| ch == '_' || ch == '.');
    let capped: String = trimmed.chars().take(MAX_STEM_CHARS).collect();
    capped.trim_end_matches(['_', '.']).to_string()
}

/// Download name for a converted document: the original stem, cleaned,
/// with a `.md` extension.
pub fn markdown_filename(original: &str) -> String {
    let base = base_name(original.trim());
    let stem = Path::new(base)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    let cleaned = clean_component(stem);
    if cleaned.is_empty() {
        format!("{FALLBACK_STEM}.{MARKDOWN_EXTENSION}")
    } else {
        format!("{cleaned}.{MARKDOWN_EXTENSION}")
    }
}

/// Object key segment for a raw upload. Keeps the extension.
pub fn storage_name(original: &str) -> String {
    let cleaned = clean_component(base_name(original.trim()));
    if cleaned.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_extension_with_markdown() {
        assert_eq!(markdown_filename("report.pdf"), "report.md");
        assert_eq!(markdown_filename("Q3 Numbers.xlsx"), "Q3_Numbers.md");
        assert_eq!(markdown_filename("archive.tar.pdf"), "archive.tar.md");
    }

    #[test]
    fn strips_reserved_characters() {
        let cleaned = markdown_filename("report<2024>:final?.docx");
        assert_eq!(cleaned, "report2024final.md");
    }

    #[test]
    fn removes_path_components() {
        assert_eq!(markdown_filename("../../../etc/passwd.pdf"), "passwd.md");
        assert_eq!(markdown_filename("C:\\Users\\me\\deck.pptx"), "deck.md");
        let name = markdown_filename("..\\..\\x.pdf");
        assert!(!name.contains(".."));
        assert!(!name.contains('/') && !name.contains('\\'));
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(markdown_filename("  my   big file .pdf"), "my_big_file.md");
    }

    #[test]
    fn falls_back_for_empty_names() {
        assert_eq!(markdown_filename(""), "document.md");
        assert_eq!(markdown_filename("???.pdf"), "document.md");
    }

    #[test]
    fn caps_long_stems() {
        let name = markdown_filename(&format!("{}.pdf", "a".repeat(400)));
        assert_eq!(name.len(), 200 + ".md".len());
    }

    #[test]
    fn storage_names_keep_extension() {
        assert_eq!(storage_name("My Report.pdf"), "My_Report.pdf");
        assert_eq!(storage_name("../secret.docx"), "secret.docx");
        assert_eq!(storage_name("///"), "document");
    }
}
