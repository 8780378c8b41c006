//! Domain canonicalization.
//!
//! Every component compares domains through [`normalize_domain`], so the
//! normalized form is what the store's uniqueness constraint sees.
//!
//! Casing is preserved and internationalized names are not converted to
//! punycode: `Example.com` and `example.com` are different domains.

use crate::errors::{LicenseError, LicenseResult};

/// Canonicalize a user-supplied domain.
///
/// Strips a leading `http://` or `https://`, then a leading `www.`, then one
/// trailing `/`. The pass is repeated until nothing changes, which makes the
/// function idempotent even for inputs like `http://http://a.com//`.
/// Input that does not look like a domain is returned after best-effort
/// stripping; there is no error case.
pub fn normalize_domain(raw: &str) -> String {
    let mut current = raw;
    loop {
        let next = strip_once(current);
        if next.len() == current.len() {
            return next.to_string();
        }
        current = next;
    }
}

/// [`normalize_domain`] after trimming surrounding whitespace, refusing input
/// that normalizes to nothing.
pub fn normalize_required(raw: &str) -> LicenseResult<String> {
    let domain = normalize_domain(raw.trim());
    if domain.is_empty() {
        return Err(LicenseError::validation("domain", "must not be empty"));
    }
    Ok(domain)
}

fn strip_once(domain: &str) -> &str {
    let domain = domain
        .strip_prefix("https://")
        .or_else(|| domain.strip_prefix("http://"))
        .unwrap_or(domain);
    let domain = domain.strip_prefix("www.").unwrap_or(domain);
    domain.strip_suffix('/').unwrap_or(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_www_and_trailing_slash() {
        assert_eq!(normalize_domain("https://www.example.com/"), "example.com");
        assert_eq!(normalize_domain("http://example.com"), "example.com");
        assert_eq!(normalize_domain("www.example.com"), "example.com");
        assert_eq!(normalize_domain("example.com/"), "example.com");
    }

    #[test]
    fn keeps_paths_and_ports() {
        assert_eq!(
            normalize_domain("https://example.com:8443/shop/"),
            "example.com:8443/shop"
        );
    }

    #[test]
    fn does_not_fold_case() {
        assert_eq!(normalize_domain("https://www.Example.com/"), "Example.com");
        assert_ne!(
            normalize_domain("https://www.Example.com/"),
            normalize_domain("example.com")
        );
    }

    #[test]
    fn passes_non_ascii_through() {
        assert_eq!(normalize_domain("https://例子.中国/"), "例子.中国");
    }

    #[test]
    fn only_strips_leading_www() {
        assert_eq!(normalize_domain("shop.www.example.com"), "shop.www.example.com");
        assert_eq!(normalize_domain("wwwexample.com"), "wwwexample.com");
    }

    #[test]
    fn is_idempotent() {
        let inputs = [
            "",
            "/",
            "example.com",
            "https://www.example.com/",
            "http://http://example.com//",
            "www.www.example.com",
            "https://www./",
            "HTTP://Example.com/",
            "  example.com  ",
        ];
        for input in inputs {
            let once = normalize_domain(input);
            assert_eq!(normalize_domain(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn malformed_input_passes_through() {
        assert_eq!(normalize_domain("not a domain"), "not a domain");
        assert_eq!(normalize_domain(""), "");
    }
}
