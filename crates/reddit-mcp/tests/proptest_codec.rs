//! Property tests for the bearer codec and PKCE derivation.

use proptest::prelude::*;

use reddit_mcp::server::oauth::pkce::{challenge_s256, verify_s256};
use reddit_mcp::server::oauth::TokenCodec;

fn codec(secret: &[u8]) -> TokenCodec {
    TokenCodec::new(
        secret.to_vec(),
        "https://gateway.example.com".to_string(),
        "https://gateway.example.com".to_string(),
    )
}

proptest! {
    #[test]
    fn mint_verify_round_trip(
        sub in "[a-zA-Z0-9_-]{1,32}",
        access in "[ -~]{0,64}",
        refresh in "[ -~]{0,64}",
        iat in 0i64..4_000_000_000i64,
    ) {
        let codec = codec(b"0123456789abcdef0123456789abcdef");
        let token = codec.mint(&sub, &access, &refresh, iat);
        let claims = codec.verify(&token, iat).unwrap();

        prop_assert_eq!(claims.sub, sub);
        prop_assert_eq!(claims.upstream_access_token, access);
        prop_assert_eq!(claims.upstream_refresh_token, refresh);
        prop_assert_eq!(claims.iat, iat);
    }

    #[test]
    fn wrong_secret_never_verifies(
        sub in "[a-zA-Z0-9_-]{1,32}",
        iat in 0i64..4_000_000_000i64,
    ) {
        let token = codec(b"0123456789abcdef0123456789abcdef").mint(&sub, "a", "r", iat);
        let other = codec(b"fedcba9876543210fedcba9876543210");
        prop_assert!(other.verify(&token, iat).is_err());
    }

    #[test]
    fn expiry_window_is_exact(iat in 0i64..3_000_000_000i64) {
        let codec = codec(b"0123456789abcdef0123456789abcdef");
        let token = codec.mint("alice", "a", "r", iat);

        prop_assert!(codec.verify(&token, iat + 86_399).is_ok());
        prop_assert!(codec.verify(&token, iat + 86_401).is_err());
        prop_assert!(codec.verify(&token, iat - 1).is_err());
    }

    #[test]
    fn pkce_challenge_round_trip(verifier in "[A-Za-z0-9._~-]{43,128}") {
        let challenge = challenge_s256(&verifier);
        prop_assert!(verify_s256(&verifier, &challenge));
        let mutated = format!("{}x", verifier);
        prop_assert!(!verify_s256(&mutated, &challenge));
    }

    #[test]
    fn garbage_tokens_never_verify(token in "[ -~]{0,128}") {
        let codec = codec(b"0123456789abcdef0123456789abcdef");
        // Any string that did not come out of mint() fails closed.
        prop_assert!(codec.verify(&token, 0).is_err());
    }
}
