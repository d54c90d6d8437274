use cookie::Cookie;
use reqwest::cookie::{CookieStore, Jar};
use url::Url;

pub(crate) const CSRF_COOKIE: &str = "_csrf";

/// Reads the CSRF token the provider set during `/authorize`.
///
/// A `_csrf` cookie scoped to the credential-submission path wins over one
/// scoped to `/`. Any other `_csrf` visible to the login or landing URL is the
/// fallback. `None` when the provider set no such cookie.
pub(crate) fn csrf_token(jar: &Jar, login_url: &Url, landing_url: &Url) -> Option<String> {
    let mut root = login_url.clone();
    root.set_path("/");
    root.set_query(None);

    let for_login = cookie_values(jar, login_url, CSRF_COOKIE);
    let for_root = cookie_values(jar, &root, CSRF_COOKIE);

    pick_scoped(&for_login, &for_root)
        .or_else(|| cookie_values(jar, landing_url, CSRF_COOKIE).into_iter().next())
}

/// First value sent to the login path that is not a root-scoped cookie,
/// falling back to any value sent to the login path.
fn pick_scoped(for_login: &[String], for_root: &[String]) -> Option<String> {
    for_login
        .iter()
        .find(|value| !for_root.contains(value))
        .or_else(|| for_login.first())
        .cloned()
}

fn cookie_values(jar: &Jar, url: &Url, name: &str) -> Vec<String> {
    let Some(header) = jar.cookies(url) else {
        return Vec::new();
    };
    let Ok(header) = header.to_str() else {
        return Vec::new();
    };
    Cookie::split_parse(header)
        .filter_map(Result::ok)
        .filter(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_owned())
        .collect()
}
