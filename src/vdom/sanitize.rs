//! Fact sanitizing applied by the public constructors.

/// `script` elements are rendered as `p`.
pub fn no_script(tag: &str) -> &str {
    if tag == "script" { "p" } else { tag }
}

/// Attribute keys starting with `on` (any case) or equal to `formAction`
/// get a `data-` prefix.
pub fn no_on_or_form_action(key: &str) -> String {
    let lower = key.to_ascii_lowercase();
    if lower.starts_with("on") || lower == "formaction" {
        format!("data-{key}")
    } else {
        key.to_owned()
    }
}

/// Property keys `innerHTML` and `formAction` get a `data-` prefix.
pub fn no_inner_html_or_form_action(key: &str) -> String {
    if key == "innerHTML" || key == "formAction" {
        format!("data-{key}")
    } else {
        key.to_owned()
    }
}

/// A `javascript:` URI (ignoring whitespace and case) becomes the empty
/// string.
pub fn no_javascript_uri(value: &str) -> String {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if compact
        .get(..11)
        .is_some_and(|p| p.eq_ignore_ascii_case("javascript:"))
    {
        String::new()
    } else {
        value.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_script() {
        assert_eq!(no_script("script"), "p");
        assert_eq!(no_script("div"), "div");
    }

    #[test]
    fn test_on_and_form_action() {
        assert_eq!(no_on_or_form_action("onClick"), "data-onClick");
        assert_eq!(no_on_or_form_action("formAction"), "data-formAction");
        assert_eq!(no_on_or_form_action("formActionX"), "formActionX");
        assert_eq!(no_on_or_form_action("title"), "title");
    }

    #[test]
    fn test_javascript_uri() {
        assert_eq!(no_javascript_uri("JavaScript:alert(1)"), "");
        assert_eq!(no_javascript_uri(" java script :x"), "");
        assert_eq!(no_javascript_uri("https://example.com"), "https://example.com");
    }
}
