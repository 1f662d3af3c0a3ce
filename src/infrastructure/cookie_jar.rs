use reqwest::cookie::Jar;
use std::sync::Arc;

/// Cookie jar for one refresh run. Matching by domain, path and `Secure`, and
/// expiry through `Expires`/`Max-Age`, follow `reqwest`'s store. The jar lives
/// in memory only and is dropped with the transport that owns it.
pub type SessionCookieJar = Jar;

pub fn session_cookie_jar() -> Arc<SessionCookieJar> {
    Arc::new(Jar::default())
}
