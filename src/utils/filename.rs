//! Filename sanitization.

/// Sanitize a filename component: path separators become underscores, NUL
/// and other control characters are removed, surrounding whitespace is
/// trimmed. Returns an empty string when nothing survives; callers pick
/// their own fallback (e.g. the job id).
pub fn sanitize_filename(input: &str) -> String {
    input
        .trim()
        .chars()
        .filter_map(|c| match c {
            '/' | '\\' => Some('_'),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sanitize a display label for use inside a path: separators become
/// dashes, control characters are removed. Falls back to `"anime"`.
pub fn sanitize_label(input: &str) -> String {
    let out = input
        .trim()
        .chars()
        .filter_map(|c| match c {
            '/' | '\\' => Some('-'),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect::<String>()
        .trim()
        .to_string();
    if out.is_empty() { "anime".to_string() } else { out }
}
