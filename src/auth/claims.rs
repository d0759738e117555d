//! Non-verifying bearer-token claims introspection
//!
//! Tokens handled here come from our own credential, not from an untrusted
//! peer, so the signature is deliberately not checked. Any decode failure
//! yields an empty scope list; this function never fails.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use log::debug;
use serde_json::Value;

/// Extract the granted scopes from a bearer token's claims.
///
/// Reads the space-separated `scp` claim when present, falling back to an
/// array-valued `roles` claim (app-only tokens carry roles instead of
/// scopes). Malformed input of any kind returns an empty list.
pub fn parse_token_scopes(token: &str) -> Vec<String> {
    let Some(claims) = decode_claims(token) else {
        debug!("Failed to decode token claims");
        return Vec::new();
    };

    if let Some(scp) = claims.get("scp").and_then(Value::as_str) {
        return scp
            .split(' ')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    if let Some(roles) = claims.get("roles").and_then(Value::as_array) {
        return roles
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }

    debug!("No scopes found in token claims");
    Vec::new()
}

fn decode_claims(token: &str) -> Option<Value> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims.is_object().then_some(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_token(claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        format!("{}.{}.signature", header, payload)
    }

    #[test]
    fn test_scp_claim_is_split_on_spaces() {
        let token = make_token(&serde_json::json!({
            "scp": "Calendars.ReadWrite People.Read"
        }));
        assert_eq!(
            parse_token_scopes(&token),
            vec!["Calendars.ReadWrite", "People.Read"]
        );
    }

    #[test]
    fn test_roles_claim_fallback() {
        let token = make_token(&serde_json::json!({
            "roles": ["Calendars.Read.All", "User.Read.All"]
        }));
        assert_eq!(
            parse_token_scopes(&token),
            vec!["Calendars.Read.All", "User.Read.All"]
        );
    }

    #[test]
    fn test_scp_takes_precedence_over_roles() {
        let token = make_token(&serde_json::json!({
            "scp": "User.Read",
            "roles": ["Other.Role"]
        }));
        assert_eq!(parse_token_scopes(&token), vec!["User.Read"]);
    }

    #[test]
    fn test_no_scope_claims_yields_empty() {
        let token = make_token(&serde_json::json!({ "aud": "graph" }));
        assert!(parse_token_scopes(&token).is_empty());
    }

    #[test]
    fn test_malformed_tokens_never_panic() {
        for garbage in ["", "not-a-jwt", "a.b.c", "a.!!!.c", "one.segment"] {
            assert!(parse_token_scopes(garbage).is_empty());
        }
    }

    #[test]
    fn test_non_object_payload_yields_empty() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(b"\"just a string\"");
        let token = format!("{}.{}.sig", header, payload);
        assert!(parse_token_scopes(&token).is_empty());
    }
}
