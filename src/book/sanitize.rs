//! Filesystem-safe title tokens.

/// Separator that replaces whitespace runs.
pub const SEPARATOR: char = '_';

/// Normalize an arbitrary Unicode title into a filesystem-safe token.
///
/// Keeps alphanumeric characters (any script), drops everything else except
/// whitespace and `_`, collapses each whitespace/`_` run into one `_` and
/// trims separators at both ends. Idempotent: sanitizing twice is the same
/// as sanitizing once.
pub fn sanitize(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_separator = false;

    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push(SEPARATOR);
            }
            pending_separator = false;
            out.push(c);
        } else if c.is_whitespace() || c == SEPARATOR {
            pending_separator = true;
        }
    }

    out
}
