//! Identifier rules for struct type names and field names.
//!
//! A valid name is non-empty, starts with an ASCII letter and continues with
//! ASCII letters, digits or underscores.

/// Returns true if `name` is a valid struct or field identifier.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Strip every character that cannot appear in an identifier.
///
/// Leading characters are dropped until the first ASCII letter; after that,
/// only ASCII letters, digits and underscores are kept. Returns `None` when
/// nothing usable remains so the caller can derive a new candidate.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if out.is_empty() {
            if c.is_ascii_alphabetic() {
                out.push(c);
            }
        } else if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}
