//! Decoding and expiry classification of three-segment credentials.
//!
//! A credential looks like `header.claims.signature`, each segment
//! base64url-encoded. The client never verifies the signature (it has
//! no key); it only needs the claims to know who is signed in and when
//! the credential stops working.
//!
//! Nothing in here performs I/O or reads the system clock. The caller
//! passes `now` in epoch seconds, which keeps every check deterministic
//! in tests.

use std::time::Duration;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::{Claims, DecodeError};

/// Default safety margin before literal expiry (5 minutes).
pub const DEFAULT_SKEW: Duration = Duration::from_secs(300);

/// base64url, accepting segments with or without `=` padding.
const SEGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const SEGMENT_NAMES: [&str; 3] = ["header", "claims", "signature"];

/// Where a decoded credential sits relative to its expiry.
///
/// ```text
///            now            now + skew
///  ───────────┼─────────────────┼──────────────→ time
///   Expired   │   NearExpiry    │     Valid
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Comfortably before expiry.
    Valid,
    /// Still accepted by the server, but inside the skew window.
    /// The session should refresh proactively.
    NearExpiry,
    /// `expires_at <= now`. The server will reject it.
    Expired,
}

impl TokenStatus {
    /// Returns `true` unless the credential has expired outright.
    pub fn is_usable(self) -> bool {
        !matches!(self, Self::Expired)
    }
}

/// Decodes the claims segment of a raw credential.
///
/// All three segments must be present, non-empty and base64url. The
/// header and claims segments must also be JSON; the claims must carry
/// at least a subject and an expiry.
///
/// # Errors
/// Returns [`DecodeError`] for any structural problem. It never panics,
/// whatever the input.
pub fn decode(raw: &str) -> Result<Claims, DecodeError> {
    let segments: Vec<&str> = raw.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(DecodeError::SegmentCount {
            found: segments.len(),
        });
    }

    let mut decoded: Vec<Vec<u8>> = Vec::with_capacity(3);
    for (segment, name) in segments.iter().zip(SEGMENT_NAMES) {
        if segment.is_empty() {
            return Err(DecodeError::EmptySegment { segment: name });
        }
        let bytes = SEGMENT_ENGINE.decode(segment).map_err(|source| {
            DecodeError::Base64 {
                segment: name,
                source,
            }
        })?;
        decoded.push(bytes);
    }

    // The header is only checked for shape; nothing in it is used.
    serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(
        &decoded[0],
    )
    .map_err(|source| DecodeError::Json {
        segment: "header",
        source,
    })?;

    serde_json::from_slice(&decoded[1]).map_err(|source| DecodeError::Json {
        segment: "claims",
        source,
    })
}

/// Token codec configured with a skew window.
#[derive(Debug, Clone, Copy)]
pub struct TokenCodec {
    skew: Duration,
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self::new(DEFAULT_SKEW)
    }
}

impl TokenCodec {
    /// Creates a codec that flags credentials expiring within `skew`.
    pub fn new(skew: Duration) -> Self {
        Self { skew }
    }

    /// The configured skew window.
    pub fn skew(&self) -> Duration {
        self.skew
    }

    /// Same as the free [`decode`] function.
    pub fn decode(&self, raw: &str) -> Result<Claims, DecodeError> {
        decode(raw)
    }

    /// Decodes `raw` and classifies it against `now` (epoch seconds).
    pub fn inspect(
        &self,
        raw: &str,
        now: i64,
    ) -> Result<(Claims, TokenStatus), DecodeError> {
        let claims = decode(raw)?;
        let status = self.classify(&claims, now);
        Ok((claims, status))
    }

    /// Classifies already-decoded claims against `now`.
    pub fn classify(&self, claims: &Claims, now: i64) -> TokenStatus {
        let skew = i64::try_from(self.skew.as_secs()).unwrap_or(i64::MAX);
        if claims.expires_at <= now {
            TokenStatus::Expired
        } else if claims.expires_at <= now.saturating_add(skew) {
            TokenStatus::NearExpiry
        } else {
            TokenStatus::Valid
        }
    }

    /// `true` if `raw` decodes and has not expired at `now`.
    ///
    /// A near-expiry credential is still valid; use
    /// [`is_near_expiry`](Self::is_near_expiry) for that signal.
    pub fn is_valid(&self, raw: &str, now: i64) -> bool {
        matches!(self.inspect(raw, now), Ok((_, status)) if status.is_usable())
    }

    /// `true` if `raw` decodes, has not expired, and expires within the
    /// skew window.
    pub fn is_near_expiry(&self, raw: &str, now: i64) -> bool {
        matches!(self.inspect(raw, now), Ok((_, TokenStatus::NearExpiry)))
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn segment(json: &str) -> String {
        URL_SAFE_NO_PAD.encode(json)
    }

    fn token_expiring_at(exp: i64) -> String {
        format!(
            "{}.{}.{}",
            segment(r#"{"alg":"HS256","typ":"JWT"}"#),
            segment(&format!(r#"{{"sub":"u-1","exp":{exp},"role":"admin"}}"#)),
            segment("signature")
        )
    }

    fn codec() -> TokenCodec {
        TokenCodec::default()
    }

    // =====================================================================
    // decode()
    // =====================================================================

    #[test]
    fn test_decode_well_formed_returns_claims() {
        let claims = decode(&token_expiring_at(NOW + 3600)).unwrap();

        assert_eq!(claims.subject, "u-1");
        assert_eq!(claims.expires_at, NOW + 3600);
        assert_eq!(claims.role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_decode_accepts_padded_segments() {
        use base64::engine::general_purpose::URL_SAFE;
        let raw = format!(
            "{}.{}.{}",
            URL_SAFE.encode(r#"{"alg":"none"}"#),
            URL_SAFE.encode(r#"{"subject":"u-2","expiresAt":10}"#),
            URL_SAFE.encode("s")
        );

        let claims = decode(&raw).unwrap();

        assert_eq!(claims.subject, "u-2");
        assert_eq!(claims.expires_at, 10);
    }

    #[test]
    fn test_decode_wrong_segment_count_returns_error() {
        for raw in ["", "abc", "a.b", "a.b.c.d", "...."] {
            assert!(
                matches!(decode(raw), Err(DecodeError::SegmentCount { .. })),
                "{raw:?} should be rejected for its segment count"
            );
        }
    }

    #[test]
    fn test_decode_empty_segment_returns_error() {
        let raw = format!("{}..{}", segment("{}"), segment("sig"));

        assert!(matches!(
            decode(&raw),
            Err(DecodeError::EmptySegment { segment: "claims" })
        ));
    }

    #[test]
    fn test_decode_non_base64_returns_error() {
        let raw = format!("{}.***.{}", segment("{}"), segment("sig"));

        assert!(matches!(
            decode(&raw),
            Err(DecodeError::Base64 { segment: "claims", .. })
        ));
    }

    #[test]
    fn test_decode_claims_not_json_returns_error() {
        let raw = format!(
            "{}.{}.{}",
            segment("{}"),
            segment("not json"),
            segment("sig")
        );

        assert!(matches!(
            decode(&raw),
            Err(DecodeError::Json { segment: "claims", .. })
        ));
    }

    #[test]
    fn test_decode_claims_missing_expiry_returns_error() {
        let raw = format!(
            "{}.{}.{}",
            segment("{}"),
            segment(r#"{"sub":"u-1"}"#),
            segment("sig")
        );

        assert!(matches!(decode(&raw), Err(DecodeError::Json { .. })));
    }

    // =====================================================================
    // is_valid() / is_near_expiry()
    // =====================================================================

    #[test]
    fn test_is_valid_malformed_returns_false() {
        assert!(!codec().is_valid("definitely-not-a-token", NOW));
        assert!(!codec().is_near_expiry("definitely-not-a-token", NOW));
    }

    #[test]
    fn test_is_valid_just_expired_returns_false() {
        assert!(!codec().is_valid(&token_expiring_at(NOW - 1), NOW));
    }

    #[test]
    fn test_is_valid_expiring_exactly_now_returns_false() {
        assert!(!codec().is_valid(&token_expiring_at(NOW), NOW));
    }

    #[test]
    fn test_is_valid_beyond_skew_is_not_near_expiry() {
        let raw = token_expiring_at(NOW + 300 + 1);

        assert!(codec().is_valid(&raw, NOW));
        assert!(!codec().is_near_expiry(&raw, NOW));
    }

    #[test]
    fn test_is_valid_inside_skew_is_near_expiry() {
        let raw = token_expiring_at(NOW + 300 - 1);

        assert!(codec().is_valid(&raw, NOW));
        assert!(codec().is_near_expiry(&raw, NOW));
    }

    #[test]
    fn test_inspect_custom_skew_shifts_window() {
        let codec = TokenCodec::new(Duration::from_secs(60));
        let raw = token_expiring_at(NOW + 120);

        let (_, status) = codec.inspect(&raw, NOW).unwrap();

        assert_eq!(status, TokenStatus::Valid);
        assert_eq!(codec.skew(), Duration::from_secs(60));
    }
}
