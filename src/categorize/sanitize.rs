//! Path-safe names for categories and titles

/// Returned when nothing usable survives sanitization
pub const SANITIZE_FALLBACK: &str = "unnamed";

/// Characters that are unsafe in a path component on common filesystems
const UNSAFE_CHARS: &[char] = &['\\', ':', '*', '?', '"', '<', '>', '|'];

/// Sanitize a category. `/` is kept as the hierarchy separator.
pub fn sanitize_category(input: &str) -> String {
    sanitize(input, true)
}

/// Sanitize a file name (without extension). `/` becomes `_`.
pub fn sanitize_filename(input: &str) -> String {
    sanitize(input, false)
}

fn sanitize(input: &str, keep_slash: bool) -> String {
    let mapped: String = input
        .chars()
        .map(|c| if is_allowed(c, keep_slash) { c } else { '_' })
        .collect();

    let mut out = collapse(mapped.trim(), "__", "_");
    if keep_slash {
        out = collapse(&out, "//", "/");
    }

    let edge: &[char] = if keep_slash { &['.', ' ', '_', '/'] } else { &['.', ' ', '_'] };
    let out = out.trim_matches(edge);

    if out.is_empty() {
        SANITIZE_FALLBACK.to_string()
    } else {
        out.to_string()
    }
}

fn is_allowed(c: char, keep_slash: bool) -> bool {
    if UNSAFE_CHARS.contains(&c) {
        return false;
    }
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-' | '.') || (keep_slash && c == '/')
}

fn collapse(s: &str, pair: &str, single: &str) -> String {
    let mut out = s.to_string();
    while out.contains(pair) {
        out = out.replace(pair, single);
    }
    out
}
