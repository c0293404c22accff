#![forbid(unsafe_code)]

//! Diagnostics for a profile that listed no items. Nothing here downloads or
//! retries; the result always has zero counts.

use crate::error::EngineError;
use crate::model::{BatchResult, CollectionHandle};

// Lowercased engine messages that usually mean the platform wants a login.
const AUTH_MARKERS: &[&str] = &[
    "login",
    "log in",
    "sign in",
    "cookies",
    "rate-limit",
    "rate limit",
    "too many requests",
    "429",
    "401",
    "403",
    "unable to extract",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyReason {
    AuthenticationLikely,
    EmptyOrPrivate,
    EngineError(String),
}

impl EmptyReason {
    /// Picks the most useful explanation for an empty listing.
    pub fn classify(issue: Option<&EngineError>, has_credentials: bool) -> Self {
        match issue {
            Some(err @ EngineError::Unavailable { .. }) => EmptyReason::EngineError(err.detail()),
            Some(err) => {
                let detail = err.detail();
                let lowered = detail.to_ascii_lowercase();
                if AUTH_MARKERS.iter().any(|marker| lowered.contains(marker)) || !has_credentials {
                    EmptyReason::AuthenticationLikely
                } else {
                    EmptyReason::EngineError(detail)
                }
            }
            None if has_credentials => EmptyReason::EmptyOrPrivate,
            None => EmptyReason::AuthenticationLikely,
        }
    }
}

pub fn fallback(handle: &CollectionHandle, reason: &EmptyReason) -> BatchResult {
    let lines = match reason {
        EmptyReason::AuthenticationLikely => vec![
            format!(
                "Profile extraction failed for {handle}. The platform may require authentication."
            ),
            "Try using a cookies file or download individual items manually.".to_string(),
        ],
        EmptyReason::EmptyOrPrivate => vec![
            format!("No items found for {handle}. The profile may be private or empty."),
            "Check that the cookies file belongs to an account that can view this profile."
                .to_string(),
        ],
        EmptyReason::EngineError(detail) => vec![
            format!("Profile extraction failed for {handle}: {detail}"),
            "Download individual items manually or retry later.".to_string(),
        ],
    };
    BatchResult::diagnostic(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(detail: &str) -> EngineError {
        EngineError::Failed {
            operation: "metadata enumeration",
            detail: detail.into(),
        }
    }

    #[test]
    fn classify_prefers_authentication_hints() {
        assert_eq!(
            EmptyReason::classify(Some(&failed("Unable to extract shared data")), true),
            EmptyReason::AuthenticationLikely
        );
        assert_eq!(
            EmptyReason::classify(Some(&failed("HTTP Error 500")), false),
            EmptyReason::AuthenticationLikely
        );
        assert_eq!(
            EmptyReason::classify(Some(&failed("HTTP Error 500")), true),
            EmptyReason::EngineError("HTTP Error 500".into())
        );
        assert_eq!(EmptyReason::classify(None, false), EmptyReason::AuthenticationLikely);
        assert_eq!(EmptyReason::classify(None, true), EmptyReason::EmptyOrPrivate);
    }

    #[test]
    fn classify_reports_missing_engine() {
        let missing = EngineError::Unavailable {
            binary: "yt-dlp".into(),
            reason: "No such file or directory".into(),
        };
        assert!(matches!(
            EmptyReason::classify(Some(&missing), false),
            EmptyReason::EngineError(detail) if detail.contains("yt-dlp")
        ));
    }

    #[test]
    fn fallback_only_produces_diagnostics() {
        let handle = CollectionHandle::new("alice");
        for reason in [
            EmptyReason::AuthenticationLikely,
            EmptyReason::EmptyOrPrivate,
            EmptyReason::EngineError("boom".into()),
        ] {
            let result = fallback(&handle, &reason);
            assert_eq!(result.succeeded_count, 0);
            assert_eq!(result.failed_count, 0);
            assert_eq!(result.errors.len(), 2);
            assert!(result.errors[0].contains("@alice"));
        }
        let auth = fallback(&handle, &EmptyReason::AuthenticationLikely);
        assert!(auth.errors[1].contains("cookies"));
    }
}
