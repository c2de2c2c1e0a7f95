//! Slug normalization for categories and products.
//!
//! Lossy and non-unique by design: two names may normalize to the same
//! slug, and that is not an error anywhere in the catalogue.

/// Turns free text into a URL-safe slug: ASCII letters and digits are
/// lowercased, runs of anything else collapse into single dashes, and
/// leading/trailing dashes are trimmed.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_dashes() {
        assert_eq!(slugify("Essential Programming"), "essential-programming");
    }

    #[test]
    fn collapses_punctuation_runs() {
        assert_eq!(slugify("T-Shirts & Polos"), "t-shirts-polos");
        assert_eq!(slugify("  spaced   out  "), "spaced-out");
    }

    #[test]
    fn drops_non_ascii() {
        assert_eq!(slugify("café"), "caf");
    }

    #[test]
    fn collisions_are_permitted() {
        assert_eq!(slugify("Shoes!"), slugify("shoes"));
    }

    #[test]
    fn empty_input() {
        assert_eq!(slugify("!!!"), "");
    }
}
