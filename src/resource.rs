//! Protected resource identity and `WWW-Authenticate` challenge parsing
//!
//! A [`ProtectedResource`] is the key under which access tokens are cached
//! and concurrent token acquisitions are coalesced. A [`BearerChallenge`] is
//! the subset of an RFC 6750 / RFC 9728 challenge this crate acts upon.

use std::fmt;

use url::Url;

/// Canonical identity of a protected resource: `scheme://host[:port]/path`.
///
/// The query string and fragment are dropped so that requests differing only
/// in query parameters share a token. Default ports are elided by the URL
/// parser, so `https://rs:443/a` and `https://rs/a` are the same resource.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use oidc_interceptor::resource::ProtectedResource;
///
/// let a = ProtectedResource::from_url(&Url::parse("https://rs.example.com/api?page=2").unwrap());
/// let b = ProtectedResource::from_url(&Url::parse("https://rs.example.com:443/api#top").unwrap());
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "https://rs.example.com/api");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtectedResource(String);

impl ProtectedResource {
    /// Computes the resource identity of a request URL.
    pub fn from_url(url: &Url) -> Self {
        let host = url.host_str().unwrap_or_default();
        let identity = match url.port() {
            Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
            None => format!("{}://{}{}", url.scheme(), host, url.path()),
        };
        Self(identity)
    }

    /// Returns the identity string, also used as the RFC 8707 `resource`
    /// parameter in token requests.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProtectedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A `Bearer` challenge carrying a `resource_metadata` URI.
///
/// # Examples
///
/// ```
/// use oidc_interceptor::resource::BearerChallenge;
///
/// let challenge = BearerChallenge::parse(
///     r#"Bearer realm="api", resource_metadata="https://rs/.well-known/resource""#,
/// )
/// .unwrap();
/// assert_eq!(challenge.resource_metadata, "https://rs/.well-known/resource");
///
/// assert!(BearerChallenge::parse(r#"Basic realm="api""#).is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    /// Location of the RFC 9728 protected resource metadata document.
    pub resource_metadata: String,
}

impl BearerChallenge {
    /// Parses a `WWW-Authenticate` header value.
    ///
    /// Returns `None` unless the scheme is `Bearer` and a non-empty
    /// `resource_metadata` parameter is present.
    pub fn parse(www_authenticate: &str) -> Option<Self> {
        let header = www_authenticate.trim_start();
        let scheme = header.get(..6)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let params = &header[6..];
        if !params.is_empty() && !params.starts_with(char::is_whitespace) {
            return None;
        }

        let resource_metadata = parse_resource_metadata_param(params)?;
        if resource_metadata.is_empty() {
            return None;
        }

        Some(Self { resource_metadata })
    }
}

/// Extracts the `resource_metadata` auth-param, quoted or in token form.
///
/// Parameters are walked one by one, so the name must match a whole
/// parameter name and text inside other quoted values is never inspected.
fn parse_resource_metadata_param(params: &str) -> Option<String> {
    let mut rest = params;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() {
            return None;
        }

        let name_end = rest
            .find(|c: char| c == '=' || c == ',' || c.is_whitespace())
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        rest = rest[name_end..].trim_start();

        // A bare token (token68 or flag) carries no value.
        let Some(after_eq) = rest.strip_prefix('=') else {
            continue;
        };
        let after_eq = after_eq.trim_start();

        let (value, remaining) = match after_eq.strip_prefix('"') {
            Some(quoted) => {
                let mut value = String::new();
                let mut end = None;
                let mut chars = quoted.char_indices();
                while let Some((i, c)) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        '"' => {
                            end = Some(i + 1);
                            break;
                        }
                        _ => value.push(c),
                    }
                }
                (value, &quoted[end?..])
            }
            None => {
                let end = after_eq
                    .find(|c: char| c == ',' || c.is_whitespace())
                    .unwrap_or(after_eq.len());
                (after_eq[..end].to_string(), &after_eq[end..])
            }
        };

        if name.eq_ignore_ascii_case("resource_metadata") {
            return Some(value);
        }
        rest = remaining;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(url: &str) -> ProtectedResource {
        ProtectedResource::from_url(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_resource_drops_query_and_fragment() {
        assert_eq!(
            resource("https://rs.example.com/items?id=1#x").as_str(),
            "https://rs.example.com/items"
        );
    }

    #[test]
    fn test_resource_collapses_different_queries() {
        assert_eq!(
            resource("http://localhost:3000/protected?a=1"),
            resource("http://localhost:3000/protected?b=2")
        );
    }

    #[test]
    fn test_resource_keeps_non_default_port() {
        assert_eq!(
            resource("http://localhost:3000/protected").as_str(),
            "http://localhost:3000/protected"
        );
    }

    #[test]
    fn test_resource_elides_default_port() {
        assert_eq!(resource("https://rs:443/a"), resource("https://rs/a"));
        assert_eq!(resource("http://rs:80/a"), resource("http://rs/a"));
    }

    #[test]
    fn test_resource_distinguishes_paths_and_schemes() {
        assert_ne!(resource("https://rs/a"), resource("https://rs/a/b"));
        assert_ne!(resource("https://rs/a"), resource("http://rs/a"));
    }

    #[test]
    fn test_resource_root_path() {
        assert_eq!(resource("https://rs.example.com").as_str(), "https://rs.example.com/");
    }

    #[test]
    fn test_challenge_quoted() {
        let c = BearerChallenge::parse(
            r#"Bearer error="invalid_token", resource_metadata="https://rs/.well-known/oauth-protected-resource""#,
        );
        assert_eq!(
            c.map(|c| c.resource_metadata),
            Some("https://rs/.well-known/oauth-protected-resource".to_string())
        );
    }

    #[test]
    fn test_challenge_unquoted() {
        let c = BearerChallenge::parse("Bearer resource_metadata=https://rs/meta, realm=x");
        assert_eq!(c.map(|c| c.resource_metadata), Some("https://rs/meta".to_string()));
    }

    #[test]
    fn test_challenge_scheme_is_case_insensitive() {
        assert!(BearerChallenge::parse(r#"bearer resource_metadata="https://rs/meta""#).is_some());
    }

    #[test]
    fn test_challenge_rejects_other_schemes() {
        assert!(BearerChallenge::parse(r#"Basic resource_metadata="https://rs/meta""#).is_none());
        assert!(BearerChallenge::parse(r#"BearerX resource_metadata="https://rs/meta""#).is_none());
    }

    #[test]
    fn test_challenge_requires_resource_metadata() {
        assert!(BearerChallenge::parse(r#"Bearer realm="api", error="invalid_token""#).is_none());
        assert!(BearerChallenge::parse("Bearer").is_none());
        assert!(BearerChallenge::parse(r#"Bearer resource_metadata="""#).is_none());
        assert!(BearerChallenge::parse("").is_none());
    }

    #[test]
    fn test_challenge_matches_whole_parameter_name() {
        assert!(BearerChallenge::parse(r#"Bearer x_resource_metadata="https://evil/meta""#).is_none());

        let c = BearerChallenge::parse(
            r#"Bearer x_resource_metadata="https://evil/meta", resource_metadata="https://rs/meta""#,
        );
        assert_eq!(c.map(|c| c.resource_metadata), Some("https://rs/meta".to_string()));
    }

    #[test]
    fn test_challenge_ignores_text_inside_other_quoted_values() {
        let header = r#"Bearer error_description="see resource_metadata=https://evil/meta", realm="api""#;
        assert!(BearerChallenge::parse(header).is_none());
    }

    #[test]
    fn test_challenge_quoted_value_with_escapes_and_spacing() {
        let c = BearerChallenge::parse(
            r#"Bearer realm="a \"quoted\" realm", Resource_Metadata = "https://rs/meta""#,
        );
        assert_eq!(c.map(|c| c.resource_metadata), Some("https://rs/meta".to_string()));
    }

    #[test]
    fn test_challenge_unterminated_quote_is_rejected() {
        assert!(BearerChallenge::parse(r#"Bearer resource_metadata="https://rs/meta"#).is_none());
    }
}
