// src/util.rs - Small string helpers shared by logging and error paths

/// Cut `s` to at most `max_len` bytes without splitting a UTF-8 character.
pub fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// One-line preview for listings: newlines folded to spaces, cut to
/// `max_chars` characters with a trailing ellipsis when shortened.
pub fn preview(s: &str, max_chars: usize) -> String {
    let flat: String = s
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let mut out: String = flat.chars().take(max_chars).collect();
    out.push('…');
    out
}
