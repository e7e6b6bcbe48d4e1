use regex::Regex;
use url::Url;

/// Decides whether a favorite saved with `pattern` applies to `url`.
///
/// First match wins: exact equality, same origin, `*` wildcards, and for
/// input that does not parse as a URL, substring containment either way.
/// Never fails; bad input just doesn't match.
pub fn matches(url: &str, pattern: &str) -> bool {
    if url == pattern {
        return true;
    }

    let parsed = (Url::parse(url), Url::parse(pattern));
    if let (Ok(page), Ok(saved)) = &parsed {
        if page.origin() == saved.origin() {
            return true;
        }
    }

    if pattern.contains('*') && wildcard_matches(url, pattern) {
        return true;
    }

    match parsed {
        (Ok(_), Ok(_)) => false,
        _ => loose_match(url, pattern),
    }
}

/// Each `*` matches any run of characters; everything else is literal.
fn wildcard_matches(url: &str, pattern: &str) -> bool {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    match Regex::new(&format!("^{body}$")) {
        Ok(re) => re.is_match(url),
        Err(_) => false,
    }
}

fn loose_match(url: &str, pattern: &str) -> bool {
    if url.is_empty() || pattern.is_empty() {
        return url == pattern;
    }
    url.contains(pattern) || pattern.contains(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(matches("https://example.com/a?b=1", "https://example.com/a?b=1"));
        assert!(matches("not a url", "not a url"));
    }

    #[test]
    fn same_origin_matches_any_path() {
        assert!(matches(
            "https://example.com/page2",
            "https://example.com/page1"
        ));
        assert!(!matches("https://example.com/page2", "https://other.com/"));
        assert!(!matches("http://example.com/", "https://example.com/"));
        assert!(!matches(
            "https://example.com:8443/",
            "https://example.com/"
        ));
    }

    #[test]
    fn wildcard_patterns() {
        assert!(matches(
            "https://sub.example.com/anything",
            "https://*.example.com/*"
        ));
        assert!(matches("https://docs.rs/regex/latest", "*docs.rs/regex*"));
        assert!(!matches(
            "https://example.org/anything",
            "https://*.example.com/*"
        ));
        assert!(!matches("axb/page", "a.b*"));
    }

    #[test]
    fn malformed_input_falls_back_to_containment() {
        assert!(matches("https://example.com/docs/intro", "example.com/docs"));
        assert!(matches("example.com", "https://example.com/"));
        assert!(!matches("https://example.com/", "unrelated"));
        assert!(!matches("https://example.com/", ""));
        assert!(matches("", ""));
    }
}
