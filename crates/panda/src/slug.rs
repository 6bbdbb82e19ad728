/// Convert a display name into a lowercase, hyphen separated identifier
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c == '\'' {
            // apostrophes are dropped so "Bob's" becomes "bobs"
            continue;
        } else {
            pending_dash = true;
        }
    }

    slug
}
