//! Slug generation for object ids

/// Turn a display name into a valid object_id
///
/// Letters are lowercased, every run of other characters collapses into a
/// single underscore and the result never starts or ends with one.
/// Returns `"unknown"` when nothing usable is left.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c);
        } else {
            pending_separator = true;
        }
    }

    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_device_labels() {
        assert_eq!(slugify("Fan 1"), "fan_1");
        assert_eq!(slugify("Living Room Fan"), "living_room_fan");
        assert_eq!(slugify("Non-Switchable Fan"), "non_switchable_fan");
    }

    #[test]
    fn test_slugify_collapses_and_trims() {
        assert_eq!(slugify("  Ceiling -- Fan  "), "ceiling_fan");
        assert_eq!(slugify("__fan__"), "fan");
    }

    #[test]
    fn test_slugify_empty() {
        assert_eq!(slugify(""), "unknown");
        assert_eq!(slugify("!!!"), "unknown");
    }
}
