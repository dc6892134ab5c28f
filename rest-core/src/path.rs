//! Path normalization: lexical cleaning rooted at "/" and splitting into segments.
//!
//! Request paths and route patterns go through the same functions, so a pattern
//! and the requests it should match always agree on their segment lists.

/// Segment separator used for splitting and joining.
pub const SEPARATOR: char = '/';

/// Split `path` into its non-empty segments after lexical cleaning.
///
/// `.` segments are dropped, `..` removes the previous segment (never climbing
/// above the root) and repeated slashes collapse. The root, the empty string and
/// any path that cleans down to the root yield no segments at all.
pub fn split(path: &str) -> Vec<String> {
    let mut segments: Vec<String> = Vec::new();
    for part in path.split(SEPARATOR) {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(part.to_owned()),
        }
    }
    segments
}

/// Join segments with "/" and no leading slash. Inverse of [`split`] for
/// already-clean segment lists.
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for (i, s) in segments.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(s.as_ref());
    }
    out
}

/// Lexically clean `path` as if rooted at "/". The result always starts with "/".
pub fn clean(path: &str) -> String {
    format!("{}{}", SEPARATOR, join(&split(path)))
}
