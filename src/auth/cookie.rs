//! Refresh cookie parsing and formatting.

use axum::http::header;

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Path the refresh cookie is scoped to. Browsers only send it to the auth
/// endpoints.
pub const REFRESH_COOKIE_PATH: &str = "/auth";

/// Extract a cookie value. HTTP/2 clients may split cookies over several
/// Cookie headers, so all of them are searched.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let parts = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookie_header| cookie_header.split(';'));

    for part in parts {
        if let Some((key, value)) = part.trim().split_once('=') {
            if key.trim() == name {
                let value = value.trim();
                return (!value.is_empty()).then_some(value);
            }
        }
    }
    None
}

/// Attributes for the refresh cookie.
///
/// Production serves the client cross-site, so the cookie needs
/// `SameSite=None; Secure`. Development runs over plain HTTP and uses `Lax`.
#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    pub production: bool,
}

impl CookieSettings {
    pub fn new(production: bool) -> Self {
        Self { production }
    }

    fn attributes(&self) -> &'static str {
        if self.production {
            "SameSite=None; Secure"
        } else {
            "SameSite=Lax"
        }
    }

    pub fn refresh_cookie(&self, token: &str, max_age: u64) -> String {
        format!(
            "{}={}; HttpOnly; Path={}; Max-Age={}; {}",
            REFRESH_COOKIE_NAME,
            token,
            REFRESH_COOKIE_PATH,
            max_age,
            self.attributes()
        )
    }

    /// Expires the refresh cookie. Attributes must match the ones it was
    /// set with or browsers keep the original.
    pub fn clear_refresh_cookie(&self) -> String {
        format!(
            "{}=; HttpOnly; Path={}; Max-Age=0; {}",
            REFRESH_COOKIE_NAME,
            REFRESH_COOKIE_PATH,
            self.attributes()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_get_cookie_simple() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("refresh_token=abc123"),
        );

        assert_eq!(get_cookie(&headers, "refresh_token"), Some("abc123"));
    }

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; refresh_token=xyz789; theme=dark"),
        );

        assert_eq!(get_cookie(&headers, "refresh_token"), Some("xyz789"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
        assert_eq!(get_cookie(&headers, "theme"), Some("dark"));
    }

    #[test]
    fn test_get_cookie_missing_or_empty() {
        let mut headers = axum::http::HeaderMap::new();
        assert_eq!(get_cookie(&headers, "refresh_token"), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("refresh_token="));
        assert_eq!(get_cookie(&headers, "refresh_token"), None);
    }

    #[test]
    fn test_get_cookie_across_headers() {
        let mut headers = axum::http::HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("foo=bar"));
        headers.append(header::COOKIE, HeaderValue::from_static("refresh_token=split"));

        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
        assert_eq!(get_cookie(&headers, "refresh_token"), Some("split"));
    }

    #[test]
    fn test_get_cookie_with_spaces() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("  refresh_token = abc123  ; foo=bar"),
        );

        assert_eq!(get_cookie(&headers, "refresh_token"), Some("abc123"));
    }

    #[test]
    fn test_production_cookie() {
        let cookie = CookieSettings::new(true).refresh_cookie("tok", 604800);
        assert_eq!(
            cookie,
            "refresh_token=tok; HttpOnly; Path=/auth; Max-Age=604800; SameSite=None; Secure"
        );
    }

    #[test]
    fn test_development_cookie() {
        let cookie = CookieSettings::new(false).refresh_cookie("tok", 60);
        assert!(cookie.contains("SameSite=Lax"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn test_clear_matches_attributes() {
        let settings = CookieSettings::new(true);
        let clear = settings.clear_refresh_cookie();
        assert!(clear.starts_with("refresh_token=;"));
        assert!(clear.contains("Max-Age=0"));
        assert!(clear.contains("Path=/auth"));
        assert!(clear.ends_with("SameSite=None; Secure"));
    }
}
