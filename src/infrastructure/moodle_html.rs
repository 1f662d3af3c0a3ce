//! Scraping contract for the Moodle login and dashboard pages.
//!
//! Every pattern here is matched against fixtures in the tests below. When the
//! institution upgrades Moodle and a page changes shape, update the fixture and
//! the pattern together.

use regex::Regex;
use std::sync::LazyLock;

/// Hidden field of the login form: `<input type="hidden" name="logintoken" value="...">`.
static LOGIN_TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<input type="hidden" name="logintoken" value="([^"]+)""#)
        .expect("valid login token pattern")
});

/// Session key inside the `M.cfg = {...}` blob: `"sesskey":"..."`.
static SESSION_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""sesskey":"([^"]+)""#).expect("valid session key pattern")
});

/// Text the login page shows to a visitor whose cookies already carry a session.
/// The target instance serves the Japanese locale.
const ALREADY_LOGGED_IN_MARKERS: &[&str] = &["あなたはすでに", "You are already logged in"];

/// Logout affordance rendered only for authenticated users.
const AUTHENTICATED_MARKER: &str = "logout";

pub fn extract_login_token(html: &str) -> Option<String> {
    LOGIN_TOKEN_PATTERN
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str().to_string())
}

pub fn extract_session_key(html: &str) -> Option<String> {
    SESSION_KEY_PATTERN
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|key| key.as_str().to_string())
}

pub fn is_already_authenticated(html: &str) -> bool {
    let has_marker = ALREADY_LOGGED_IN_MARKERS
        .iter()
        .any(|marker| html.contains(marker));
    has_marker && extract_session_key(html).is_some()
}

pub fn is_authenticated_page(html: &str) -> bool {
    html.contains(AUTHENTICATED_MARKER)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn login_token_is_read_from_login_form() {
        assert_eq!(
            extract_login_token(&login_form("abc123")),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn login_token_absent_from_dashboard() {
        assert_eq!(extract_login_token(&dashboard("xyz789")), None);
    }

    #[test]
    fn first_login_token_wins() {
        let html = format!("{}{}", login_form("first"), login_form("second"));
        assert_eq!(extract_login_token(&html), Some("first".to_string()));
    }

    #[test]
    fn session_key_is_read_from_config_blob() {
        assert_eq!(
            extract_session_key(&dashboard("xyz789")),
            Some("xyz789".to_string())
        );
        assert_eq!(extract_session_key("<html></html>"), None);
    }

    #[test]
    fn already_authenticated_needs_marker_and_session_key() {
        assert!(is_already_authenticated(&already_logged_in("cached")));
        assert!(!is_already_authenticated(&login_form("abc123")));
        assert!(!is_already_authenticated("あなたはすでにログインしています。"));
        assert!(is_already_authenticated(
            r#"You are already logged in as Alice. "sesskey":"k1""#
        ));
    }

    #[test]
    fn authenticated_page_shows_logout() {
        assert!(is_authenticated_page(&dashboard("xyz789")));
        assert!(!is_authenticated_page(&invalid_login("abc123")));
    }

    // Property: a well-formed hidden logintoken field is extracted verbatim
    proptest! {
        #[test]
        fn property_login_token_roundtrips_through_form(token in "[A-Za-z0-9]{1,48}") {
            prop_assert_eq!(extract_login_token(&login_form(&token)), Some(token));
        }
    }

    // Property: HTML without the hidden field never yields a token
    proptest! {
        #[test]
        fn property_no_field_no_token(body in "[^<>\"]{0,200}") {
            let html = format!("<html><body>{body}</body></html>");
            prop_assert_eq!(extract_login_token(&html), None);
        }
    }
}
