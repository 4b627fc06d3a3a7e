//! HTTP Digest authentication cache.
//!
//! The TV only implements Digest authentication (RFC 2617, MD5). A naive client pays for a full
//! challenge round-trip on every call; [`AuthCache`] instead keeps the parameters of the last
//! challenge (plus the precomputed `HA1`) so that subsequent requests can carry a valid
//! `Authorization` header up front. The cached state lives until the TV rejects it again, which
//! is how nonce expiry shows up.

use std::collections::HashMap;

use log::debug;

use crate::device_settings::Credentials;

/// Parameters from the most recent Digest challenge.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct CachedDigestState {
    pub realm: String,
    pub nonce: String,
    pub qop: Option<String>,
    pub opaque: Option<String>,
    pub ha1: String,
    pub request_counter: u32,
}

// HA1 is derived from the password, so it's kept out of Debug output.
impl std::fmt::Debug for CachedDigestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedDigestState")
            .field("realm", &self.realm)
            .field("nonce", &self.nonce)
            .field("qop", &self.qop)
            .field("opaque", &self.opaque)
            .field("request_counter", &self.request_counter)
            .finish_non_exhaustive()
    }
}

/// Digest authentication state for one credential pair.
///
/// Owned by exactly one request path (the short-call queue or the long-poll notifier); the two
/// paths deliberately never share a cache.
#[derive(Debug)]
pub struct AuthCache {
    credentials: Option<Credentials>,
    state: Option<CachedDigestState>,
}

impl AuthCache {
    pub fn new(credentials: Option<Credentials>) -> Self {
        AuthCache {
            credentials,
            state: None,
        }
    }

    /// Whether a challenge is currently cached.
    pub fn has_cached_state(&self) -> bool {
        self.state.is_some()
    }

    /// Build an `Authorization` header value for the given request.
    ///
    /// Returns `None` when no challenge is cached. Otherwise the request counter is incremented
    /// and embedded in the header, so no two headers built from the same nonce share a counter.
    pub fn build_header(&mut self, method: &str, uri: &str) -> Option<String> {
        let cnonce = generate_cnonce();

        self.build_header_with_cnonce(method, uri, &cnonce)
    }

    pub(crate) fn build_header_with_cnonce(
        &mut self,
        method: &str,
        uri: &str,
        cnonce: &str,
    ) -> Option<String> {
        let username = self.credentials.as_ref()?.username.clone();
        let state = self.state.as_mut()?;

        let Some(counter) = state.request_counter.checked_add(1) else {
            // The counter space for this nonce is used up; force a fresh challenge.
            debug!("Digest request counter exhausted; dropping cached nonce");
            self.state = None;
            return None;
        };

        state.request_counter = counter;

        let nc = format!("{:08x}", state.request_counter);
        let ha2 = md5_hex(&format!("{method}:{uri}"));

        let mut header = format!(
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", algorithm=MD5"#,
            username, state.realm, state.nonce, uri
        );

        match &state.qop {
            Some(qop) => {
                let response = md5_hex(&format!(
                    "{}:{}:{}:{}:{}:{}",
                    state.ha1, state.nonce, nc, cnonce, qop, ha2
                ));

                header.push_str(&format!(
                    r#", response="{response}", qop={qop}, nc={nc}, cnonce="{cnonce}""#
                ));
            }
            None => {
                let response = md5_hex(&format!("{}:{}:{}", state.ha1, state.nonce, ha2));

                header.push_str(&format!(r#", response="{response}""#));
            }
        }

        if let Some(opaque) = &state.opaque {
            header.push_str(&format!(r#", opaque="{opaque}""#));
        }

        Some(header)
    }

    /// Cache the parameters of a `WWW-Authenticate` challenge.
    ///
    /// Returns `false` (leaving any existing state untouched) if the header is not a usable
    /// Digest challenge. On success `HA1` is computed once and the request counter restarts.
    pub fn cache_from_challenge(&mut self, header: &str) -> bool {
        let Some(credentials) = &self.credentials else {
            debug!("Digest challenge received but no credentials are configured");
            return false;
        };

        let Some(params) = parse_digest_challenge(header) else {
            return false;
        };

        if let Some(algorithm) = params.get("algorithm") {
            if !algorithm.eq_ignore_ascii_case("md5") {
                debug!("Unsupported Digest algorithm: {algorithm}");
                return false;
            }
        }

        let (Some(realm), Some(nonce)) = (params.get("realm"), params.get("nonce")) else {
            debug!("Digest challenge is missing realm or nonce");
            return false;
        };

        let qop = params.get("qop").and_then(|offered| {
            offered
                .split(',')
                .map(str::trim)
                .find(|option| option.eq_ignore_ascii_case("auth"))
                .map(|_| String::from("auth"))
        });

        let ha1 = md5_hex(&format!(
            "{}:{}:{}",
            credentials.username, realm, credentials.password
        ));

        self.state = Some(CachedDigestState {
            realm: realm.clone(),
            nonce: nonce.clone(),
            qop,
            opaque: params.get("opaque").cloned(),
            ha1,
            request_counter: 0,
        });

        true
    }

    /// Drop the cached challenge (the TV has expired the nonce).
    pub fn invalidate(&mut self) {
        self.state = None;
    }

    #[cfg(test)]
    pub(crate) fn cached_state(&self) -> Option<&CachedDigestState> {
        self.state.as_ref()
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

fn generate_cnonce() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// Parse a `WWW-Authenticate` value into lower-cased parameter names and their values.
///
/// Returns `None` if the scheme is not Digest. Values may be quoted (with backslash escapes and
/// embedded `=` or `,`) or bare tokens.
fn parse_digest_challenge(header: &str) -> Option<HashMap<String, String>> {
    let header = header.trim();
    let (scheme, rest) = match header.find(char::is_whitespace) {
        Some(index) => header.split_at(index),
        None => (header, ""),
    };

    if !scheme.eq_ignore_ascii_case("digest") {
        return None;
    }

    let mut params = HashMap::new();
    let mut chars = rest.chars().peekable();

    loop {
        while chars
            .peek()
            .is_some_and(|c| c.is_whitespace() || *c == ',')
        {
            chars.next();
        }

        let mut key = String::new();

        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' || c.is_whitespace() {
                break;
            }

            key.push(c);
            chars.next();
        }

        if key.is_empty() {
            break;
        }

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        if chars.peek() != Some(&'=') {
            params.insert(key.to_ascii_lowercase(), String::new());
            continue;
        }

        chars.next();

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();

        if chars.peek() == Some(&'"') {
            chars.next();

            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }

                value.push(c);
                chars.next();
            }

            value = value.trim_end().to_string();
        }

        params.insert(key.to_ascii_lowercase(), value);
    }

    Some(params)
}

// ================================================================================================
// Tests

#[cfg(test)]
mod tests {
    use super::{parse_digest_challenge, AuthCache};
    use crate::device_settings::Credentials;

    const CHALLENGE: &str = r#"Digest realm="tv", nonce="abc123", qop="auth""#;

    fn cache() -> AuthCache {
        AuthCache::new(Some(Credentials::new("user", "secret")))
    }

    fn header_param(header: &str, name: &str) -> Option<String> {
        parse_digest_challenge(header).and_then(|params| params.get(name).cloned())
    }

    #[test]
    fn no_header_without_cached_state() {
        let mut cache = cache();

        assert!(!cache.has_cached_state());
        assert_eq!(cache.build_header("GET", "/6/powerstate"), None);
    }

    #[test]
    fn response_hash_matches_reference() {
        let mut cache = cache();
        assert!(cache.cache_from_challenge(CHALLENGE));

        let header = cache
            .build_header_with_cnonce("GET", "/6/powerstate", "0a4f113b")
            .unwrap();

        assert_eq!(
            header,
            concat!(
                r#"Digest username="user", realm="tv", nonce="abc123", uri="/6/powerstate", "#,
                r#"algorithm=MD5, response="e8a2b398219440ce029706a6ae3ca09d", qop=auth, "#,
                r#"nc=00000001, cnonce="0a4f113b""#
            )
        );

        // Second request with the same nonce: counter advances, hash changes accordingly
        let header = cache
            .build_header_with_cnonce("POST", "/6/notifychange", "0a4f113b")
            .unwrap();

        assert_eq!(
            header_param(&header, "response").as_deref(),
            Some("6bfe850a5befc221e25bf003b0315f71")
        );
        assert_eq!(header_param(&header, "nc").as_deref(), Some("00000002"));
    }

    #[test]
    fn response_hash_without_qop_omits_counter_and_cnonce() {
        let mut cache = cache();
        assert!(cache.cache_from_challenge(r#"Digest realm="tv", nonce="abc123""#));

        let header = cache
            .build_header_with_cnonce("GET", "/6/powerstate", "0a4f113b")
            .unwrap();

        assert_eq!(
            header_param(&header, "response").as_deref(),
            Some("ce9070d183b2b01ff9cc229e3e7066fc")
        );
        assert_eq!(header_param(&header, "qop"), None);
        assert_eq!(header_param(&header, "nc"), None);
        assert_eq!(header_param(&header, "cnonce"), None);
    }

    #[test]
    fn request_counter_strictly_increases() {
        let mut cache = cache();
        assert!(cache.cache_from_challenge(CHALLENGE));

        let counters: Vec<String> = (0..20)
            .map(|_| {
                let header = cache.build_header("GET", "/6/audio/volume").unwrap();
                header_param(&header, "nc").unwrap()
            })
            .collect();

        for counter in &counters {
            assert_eq!(counter.len(), 8);
        }

        for pair in counters.windows(2) {
            let first = u32::from_str_radix(&pair[0], 16).unwrap();
            let second = u32::from_str_radix(&pair[1], 16).unwrap();
            assert!(second > first);
        }

        assert_eq!(counters[0], "00000001");
        assert_eq!(counters[15], "00000010");
    }

    #[test]
    fn new_challenge_resets_counter() {
        let mut cache = cache();
        assert!(cache.cache_from_challenge(CHALLENGE));
        cache.build_header("GET", "/6/powerstate");
        cache.build_header("GET", "/6/powerstate");
        assert_eq!(cache.cached_state().unwrap().request_counter, 2);

        assert!(cache.cache_from_challenge(r#"Digest realm="tv", nonce="def456", qop="auth""#));

        let state = cache.cached_state().unwrap();
        assert_eq!(state.request_counter, 0);
        assert_eq!(state.nonce, "def456");
    }

    #[test]
    fn non_digest_challenge_leaves_state_untouched() {
        let mut cache = cache();
        assert!(cache.cache_from_challenge(CHALLENGE));
        cache.build_header("GET", "/6/powerstate");
        let before = cache.cached_state().cloned();

        assert!(!cache.cache_from_challenge(r#"Basic realm="tv""#));
        assert!(!cache.cache_from_challenge(""));
        assert!(!cache.cache_from_challenge(r#"Digest realm="tv""#));
        assert!(!cache.cache_from_challenge(
            r#"Digest realm="tv", nonce="x", algorithm=SHA-256"#
        ));

        assert_eq!(cache.cached_state().cloned(), before);
    }

    #[test]
    fn challenge_without_credentials_is_not_cached() {
        let mut cache = AuthCache::new(None);

        assert!(!cache.cache_from_challenge(CHALLENGE));
        assert!(!cache.has_cached_state());
    }

    #[test]
    fn invalidate_drops_state() {
        let mut cache = cache();
        assert!(cache.cache_from_challenge(CHALLENGE));

        cache.invalidate();

        assert!(!cache.has_cached_state());
        assert_eq!(cache.build_header("GET", "/6/powerstate"), None);
    }

    #[test]
    fn opaque_is_echoed() {
        let mut cache = cache();
        assert!(cache.cache_from_challenge(
            r#"Digest realm="tv", nonce="abc123", qop="auth", opaque="xyz""#
        ));

        let header = cache.build_header("GET", "/6/powerstate").unwrap();

        assert_eq!(header_param(&header, "opaque").as_deref(), Some("xyz"));
    }

    #[test]
    fn challenge_parsing_tolerates_quoting_variants() {
        let params = parse_digest_challenge(
            r#"digest realm=tv,nonce="a=b,c", qop="auth,auth-int" , opaque="q\"x", stale=FALSE"#,
        )
        .unwrap();

        assert_eq!(params["realm"], "tv");
        assert_eq!(params["nonce"], "a=b,c");
        assert_eq!(params["qop"], "auth,auth-int");
        assert_eq!(params["opaque"], "q\"x");
        assert_eq!(params["stale"], "FALSE");

        assert!(parse_digest_challenge(r#"Basic realm="tv""#).is_none());
    }

    #[test]
    fn qop_prefers_auth_from_offered_list() {
        let mut cache = cache();
        assert!(cache.cache_from_challenge(
            r#"Digest realm="tv", nonce="abc123", qop="auth-int, auth""#
        ));
        assert_eq!(cache.cached_state().unwrap().qop.as_deref(), Some("auth"));

        assert!(cache.cache_from_challenge(r#"Digest realm="tv", nonce="abc123", qop="auth-int""#));
        assert_eq!(cache.cached_state().unwrap().qop, None);
    }
}
