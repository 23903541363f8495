//! Title slugs. Not stored; recomputed on every lookup.

/// Lowercases `title`, drops everything except ASCII word characters,
/// whitespace and `-`, then collapses each whitespace/`-` run into one `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug
}
