//! Redirect-URI policy.
//!
//! Applied symmetrically at registration and at the authorize endpoint:
//! HTTPS is always allowed, plain HTTP only for loopback hosts, and custom
//! schemes (native-app callbacks like `myapp://cb`) are allowed.

use url::Url;

/// Check a redirect URI against the policy.
#[must_use]
pub fn redirect_uri_allowed(uri: &str) -> bool {
    let Ok(parsed) = Url::parse(uri) else {
        return false;
    };

    match parsed.scheme() {
        "https" => true,
        "http" => matches!(parsed.host_str(), Some("localhost" | "127.0.0.1")),
        scheme => is_valid_custom_scheme(scheme),
    }
}

/// Custom schemes must match `^[a-zA-Z][a-zA-Z0-9+.-]*$`.
fn is_valid_custom_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
}
