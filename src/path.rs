//! Filename sanitization for work directories, chapter files and package hrefs.

/// Longest filename most filesystems accept, in bytes.
pub(crate) const MAX_FILENAME_BYTES: usize = 255;
const FALLBACK_NAME: &str = "untitled";

/// Make `name` safe to use as a single path component.
///
/// Removes path separators, characters reserved on Windows and control characters, trims trailing
/// dots and spaces, and truncates to 255 bytes on a char boundary. Names that end up empty (or are
/// `.`/`..`) become `untitled`.
pub fn sanitize_filename(name: &str) -> String {
    let mut s: String = name
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '/' | '\\' | '?' | '<' | '>' | ':' | '*' | '|' | '"'))
        .collect();
    if s.len() > MAX_FILENAME_BYTES {
        let mut cut = MAX_FILENAME_BYTES;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
    let s = s.trim().trim_end_matches(['.', ' ']).to_string();
    if s.is_empty() || s == "." || s == ".." {
        FALLBACK_NAME.to_string()
    } else {
        s
    }
}

/// Filename for a chapter page: sanitized title, whitespace runs collapsed to `_`, `.xhtml` suffix.
pub fn chapter_filename(title: &str) -> String {
    let joined = title.split_whitespace().collect::<Vec<_>>().join("_");
    let mut base = sanitize_filename(&joined);
    // leave room for the extension
    let limit = MAX_FILENAME_BYTES - ".xhtml".len();
    if base.len() > limit {
        let mut cut = limit;
        while !base.is_char_boundary(cut) {
            cut -= 1;
        }
        base.truncate(cut);
    }
    format!("{}.xhtml", base)
}

/// Percent-encode the ASCII characters that are not valid unescaped in a relative URL path.
/// Non-ASCII characters are kept (IRIs are allowed in EPUB hrefs).
pub fn href_escape(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' => out.push(c),
            '-' | '.' | '_' | '~' | '/' | '!' | '$' | '&' | '\'' | '(' | ')' | '*' | '+' | ','
            | ';' | '=' | ':' | '@' => out.push(c),
            c if !c.is_ascii() => out.push(c),
            c => out.push_str(&format!("%{:02X}", c as u32)),
        }
    }
    out
}
