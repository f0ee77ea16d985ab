/// How the segment name for an inbound request is chosen.
#[derive(Clone, Debug)]
pub enum SegmentNaming {
    /// Every request gets the configured default name.
    Fixed(String),
    /// Requests whose `Host` matches the wildcard pattern are named after the
    /// host; everything else, including an unmatched or spoofed `Host`, falls
    /// back to the default name.
    Dynamic {
        /// Name used when the host is absent or does not match.
        fallback: String,
        /// Wildcard pattern (`*` and `?`) matched against the host.
        pattern: String,
    },
}

impl SegmentNaming {
    /// Resolves the segment name for a request with the given host.
    pub fn resolve(&self, host: Option<&str>) -> String {
        match self {
            SegmentNaming::Fixed(name) => name.clone(),
            SegmentNaming::Dynamic { fallback, pattern } => match host {
                Some(host) if wildcard_match(pattern, host) => host.to_string(),
                _ => fallback.clone(),
            },
        }
    }
}

/// Case-insensitive wildcard match: `*` matches any run of characters, `?`
/// any single character. An empty pattern matches nothing.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if pattern == "*" {
        return true;
    }

    let pattern = pattern.to_ascii_lowercase();
    let text = text.to_ascii_lowercase();
    let (pattern, text) = (pattern.as_bytes(), text.as_bytes());

    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            // backtrack: let the last `*` swallow one more character
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_cases() {
        assert!(wildcard_match("*", "anything.at.all"));
        assert!(wildcard_match("api.example.com", "api.example.com"));
        assert!(wildcard_match("API.Example.COM", "api.example.com"));
        assert!(wildcard_match("*.example.com", "api.example.com"));
        assert!(wildcard_match("api.*", "api.example.com"));
        assert!(wildcard_match("a?i.example.com", "api.example.com"));
        assert!(wildcard_match("*mid*", "left-mid-right"));

        assert!(!wildcard_match("", "api.example.com"));
        assert!(!wildcard_match("*.example.com", "example.com"));
        assert!(!wildcard_match("api.?", "api.example.com"));
        assert!(!wildcard_match("other.com", "api.example.com"));
    }

    #[test]
    fn fixed_naming_ignores_host() {
        let naming = SegmentNaming::Fixed("svc-A".to_string());
        assert_eq!(naming.resolve(Some("api.example.com")), "svc-A");
        assert_eq!(naming.resolve(None), "svc-A");
    }

    #[test]
    fn dynamic_naming_prefers_matching_host() {
        let naming = SegmentNaming::Dynamic {
            fallback: "svc-A".to_string(),
            pattern: "*.example.com".to_string(),
        };
        assert_eq!(naming.resolve(Some("api.example.com")), "api.example.com");
        assert_eq!(naming.resolve(Some("evil.org")), "svc-A");
        assert_eq!(naming.resolve(None), "svc-A");
    }
}
