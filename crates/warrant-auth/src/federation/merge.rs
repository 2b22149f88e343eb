//! Merging and fetching key sets.

use std::collections::HashSet;

use time::{OffsetDateTime, PrimitiveDateTime};
use url::Url;

use crate::AuthResult;
use crate::error::AuthError;
use crate::keys::Jwks;

/// Path peers publish their key set under.
pub const PKEYS_PATH: &str = "/api/pkeys";

/// Maximum accepted size of a peer key set (1 MB).
pub const MAX_JWKS_SIZE: usize = 1024 * 1024;

/// Merges peer key sets into the local one.
///
/// Keys are deduplicated by `kid`; the first occurrence wins, so local keys
/// take precedence over peers and earlier peers over later ones. The result
/// expires at the earliest non-zero expiry of all inputs.
#[must_use]
pub fn merge_jwks(local: Jwks, peers: impl IntoIterator<Item = Jwks>) -> Jwks {
    let mut merged = local;
    let mut seen: HashSet<String> = merged.keys.iter().map(|k| k.kid.clone()).collect();

    for peer in peers {
        if let Some(peer_exp) = peer.expires()
            && merged.expires().is_none_or(|exp| peer_exp < exp)
        {
            merged.exp = Some(peer_exp);
        }

        for key in peer.keys {
            if seen.insert(key.kid.clone()) {
                merged.keys.push(key);
            }
        }
    }

    merged
}

/// Builds the URL of a peer's local-only key set.
///
/// # Errors
///
/// Returns `PeerFetch` if the base URL cannot carry a path.
pub fn peer_jwks_url(peer: &Url) -> AuthResult<Url> {
    let base = peer.as_str().trim_end_matches('/');
    let mut url = Url::parse(&format!("{}{}", base, PKEYS_PATH))
        .map_err(|e| AuthError::peer_fetch(peer.as_str(), e.to_string()))?;
    url.query_pairs_mut().append_pair("local", "true");
    Ok(url)
}

/// Fetches a peer's own key set.
///
/// # Errors
///
/// Returns `PeerFetch` on transport failure, a non-200 status, an oversized
/// body, or a body that does not decode as a key set.
pub async fn fetch_peer_jwks(client: &reqwest::Client, peer: &Url) -> AuthResult<Jwks> {
    let url = peer_jwks_url(peer)?;
    let fail = |message: String| AuthError::peer_fetch(peer.as_str(), message);

    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| fail(e.to_string()))?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(fail(format!("status {}", response.status().as_u16())));
    }

    if let Some(len) = response.content_length()
        && len as usize > MAX_JWKS_SIZE
    {
        return Err(fail(format!("response exceeds {} bytes", MAX_JWKS_SIZE)));
    }

    let body = response.bytes().await.map_err(|e| fail(e.to_string()))?;
    if body.len() > MAX_JWKS_SIZE {
        return Err(fail(format!("response exceeds {} bytes", MAX_JWKS_SIZE)));
    }

    serde_json::from_slice(&body).map_err(|e| fail(format!("undecodable key set: {}", e)))
}

/// Returns when a merged key set should be fetched again.
///
/// Stale at `exp - buffer`. When that point has already passed but `exp`
/// has not, the set is kept until `exp`. Without a usable future `exp` the
/// set is kept for `fallback`. Offsets past the representable range
/// saturate instead of overflowing.
#[must_use]
pub fn stale_at(
    exp: Option<OffsetDateTime>,
    now: OffsetDateTime,
    buffer: std::time::Duration,
    fallback: std::time::Duration,
) -> OffsetDateTime {
    match exp.filter(|exp| *exp > now && *exp > OffsetDateTime::UNIX_EPOCH) {
        Some(exp) => match time::Duration::try_from(buffer)
            .ok()
            .and_then(|buffer| exp.checked_sub(buffer))
        {
            Some(refresh) if refresh > now => refresh,
            _ => exp,
        },
        None => time::Duration::try_from(fallback)
            .ok()
            .and_then(|fallback| now.checked_add(fallback))
            .unwrap_or(PrimitiveDateTime::MAX.assume_utc()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Jwk;
    use time::Duration;

    fn jwks(exp: Option<OffsetDateTime>, kids: &[&str]) -> Jwks {
        Jwks {
            exp,
            keys: kids.iter().map(|kid| Jwk::okp(kid, format!("x-{}", kid))).collect(),
        }
    }

    fn kids(jwks: &Jwks) -> Vec<&str> {
        jwks.keys.iter().map(|k| k.kid.as_str()).collect()
    }

    #[test]
    fn test_merge_without_peers_returns_local() {
        let now = OffsetDateTime::now_utc();
        let local = jwks(Some(now + Duration::hours(1)), &["a", "b"]);
        assert_eq!(merge_jwks(local.clone(), Vec::new()), local);
    }

    #[test]
    fn test_merge_disjoint_union_with_earliest_expiry() {
        let now = OffsetDateTime::now_utc();
        let local = jwks(Some(now + Duration::hours(3)), &["l1"]);
        let peer_a = jwks(Some(now + Duration::hours(1)), &["a1", "a2"]);
        let peer_b = jwks(Some(now + Duration::hours(2)), &["b1"]);

        let merged = merge_jwks(local, [peer_a, peer_b]);
        assert_eq!(kids(&merged), ["l1", "a1", "a2", "b1"]);
        assert_eq!(merged.exp, Some(now + Duration::hours(1)));
    }

    #[test]
    fn test_merge_local_wins_duplicate_kid() {
        let now = OffsetDateTime::now_utc();
        let local = jwks(Some(now + Duration::hours(1)), &["shared"]);
        let mut peer = jwks(Some(now + Duration::hours(2)), &["shared", "p"]);
        peer.keys[0].x = Some("peer-copy".to_string());

        let merged = merge_jwks(local, [peer]);
        assert_eq!(kids(&merged), ["shared", "p"]);
        assert_eq!(merged.keys[0].x.as_deref(), Some("x-shared"));
    }

    #[test]
    fn test_merge_ignores_zero_peer_expiry() {
        let now = OffsetDateTime::now_utc();
        let local = jwks(Some(now + Duration::hours(1)), &["l"]);
        let zero = jwks(Some(OffsetDateTime::UNIX_EPOCH), &["z"]);
        let none = jwks(None, &["n"]);

        let merged = merge_jwks(local, [zero, none]);
        assert_eq!(merged.exp, Some(now + Duration::hours(1)));
        assert_eq!(merged.keys.len(), 3);
    }

    #[test]
    fn test_merge_peer_expiry_fills_missing_local() {
        let now = OffsetDateTime::now_utc();
        let local = jwks(None, &["l"]);
        let peer = jwks(Some(now + Duration::hours(2)), &["p"]);

        let merged = merge_jwks(local, [peer]);
        assert_eq!(merged.exp, Some(now + Duration::hours(2)));
    }

    #[test]
    fn test_peer_jwks_url() {
        let cases = [
            ("http://issuer-b:8080", "http://issuer-b:8080/api/pkeys?local=true"),
            ("http://issuer-b:8080/", "http://issuer-b:8080/api/pkeys?local=true"),
            ("https://host/auth/", "https://host/auth/api/pkeys?local=true"),
        ];
        for (peer, expected) in cases {
            let url = peer_jwks_url(&Url::parse(peer).unwrap()).unwrap();
            assert_eq!(url.as_str(), expected);
        }
    }

    #[test]
    fn test_stale_at() {
        let now = OffsetDateTime::now_utc();
        let buffer = std::time::Duration::from_secs(30);
        let fallback = std::time::Duration::from_secs(300);

        let exp = now + Duration::hours(1);
        assert_eq!(stale_at(Some(exp), now, buffer, fallback), exp - Duration::seconds(30));

        // Inside the buffer: keep until the hard expiry.
        let exp = now + Duration::seconds(10);
        assert_eq!(stale_at(Some(exp), now, buffer, fallback), exp);

        let fallback_at = now + Duration::seconds(300);
        assert_eq!(stale_at(None, now, buffer, fallback), fallback_at);
        assert_eq!(stale_at(Some(now - Duration::hours(1)), now, buffer, fallback), fallback_at);
        assert_eq!(
            stale_at(Some(OffsetDateTime::UNIX_EPOCH), now, buffer, fallback),
            fallback_at
        );
    }

    #[test]
    fn test_stale_at_saturates_huge_durations() {
        let now = OffsetDateTime::now_utc();
        let huge = std::time::Duration::from_secs(u64::MAX);

        assert_eq!(
            stale_at(None, now, huge, huge),
            PrimitiveDateTime::MAX.assume_utc()
        );

        let exp = now + Duration::hours(1);
        assert_eq!(stale_at(Some(exp), now, huge, huge), exp);
    }
}
