use uuid::Uuid;

// Keep stored names flat and filesystem-safe regardless of what the client
// sends. Path separators, "..", and anything non-portable get replaced.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.chars().all(|c| c == '_' || c == '.') {
        "document.pdf".to_string()
    } else {
        cleaned
    }
}

/// Disk name for an uploaded document. Prefixing with a fresh UUID keeps
/// names unique even when two users upload "paper.pdf".
pub fn unique_stored_name(original: &str) -> String {
    format!("{}_{}", Uuid::new_v4().simple(), sanitize_filename(original))
}

/// Filename offered in the Content-Disposition header for audio downloads.
/// Restricted to ASCII alphanumerics so the header value is always valid.
pub fn attachment_name(title: &str) -> String {
    let base: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    let base = base.trim_matches('_');
    if base.is_empty() {
        "audio.mp3".to_string()
    } else {
        format!("{}.mp3", base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_names_are_unique_per_call() {
        let a = unique_stored_name("paper.pdf");
        let b = unique_stored_name("paper.pdf");
        assert_ne!(a, b);
        assert!(a.ends_with("_paper.pdf"));
    }

    #[test]
    fn stored_names_strip_path_separators() {
        let name = unique_stored_name("../..\\etc/passwd");
        assert!(!name.contains('/'));
        assert!(!name.contains('\\'));
    }

    #[test]
    fn hostile_filename_falls_back_to_default() {
        let name = unique_stored_name("///");
        assert!(name.ends_with("_document.pdf"));
    }

    #[test]
    fn attachment_name_is_header_safe() {
        assert_eq!(attachment_name("My Paper (v2)"), "My_Paper__v2.mp3");
        assert_eq!(attachment_name("report"), "report.mp3");
        assert_eq!(attachment_name("日本語"), "audio.mp3");
        assert_eq!(attachment_name(""), "audio.mp3");
    }
}
