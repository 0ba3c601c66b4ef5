//! Trust-policy evaluation over a decoded status-event sequence.
//!
//! After a decrypt/verify call the status sequence carries three independent
//! kinds of security facts: the signature verdict (`GOODSIG`/`BADSIG`/...),
//! the web-of-trust verdict (`TRUST_*`), and the signer's identity
//! (`VALIDSIG`). The evaluator combines them under a caller-supplied
//! [`TrustLevelPolicy`] and [`ExceptionPolicy`] into a single accept/reject
//! decision, rejecting by default: a signature is accepted only when both
//! its verdict and its signer's trust level are explicitly acceptable.
//!
//! Two policy switches deliberately weaken enforcement and log a loud
//! warning when they fire: `never` accepts signers the keyring marks
//! never-trust, and `none` accepts sequences with no trust verdict at all
//! (self-signed test traffic). Both are off by default.
//!
//! Every query here is a pure scan over the full sequence; no single event
//! is trusted in isolation.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::status::StatusEventSequence;

/// Overall signature verdict for one decrypt/verify call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignatureResult {
    /// GOODSIG present with no BADSIG or ERRSIG.
    Good,
    /// BADSIG present.
    Bad,
    /// ERRSIG present (verification could not be performed).
    Error,
    /// EXPSIG present (the signature itself has expired).
    Expired,
    /// EXPKEYSIG present (made with an expired key).
    KeyExpired,
    /// REVKEYSIG present (made with a revoked key).
    KeyRevoked,
    /// No signature-lifecycle event in the sequence.
    None,
}

/// Web-of-trust verdict for the signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrustResult {
    /// TRUST_UNDEFINED present.
    Undefined,
    /// TRUST_NEVER present.
    Never,
    /// TRUST_MARGINAL present.
    Marginal,
    /// TRUST_FULLY present.
    Fully,
    /// TRUST_ULTIMATE present.
    Ultimate,
    /// No trust verdict in the sequence.
    None,
}

/// Which signer trust levels the caller accepts.
///
/// The default accepts marginal, full and ultimate trust and rejects
/// everything else — including sequences that carry no trust verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustLevelPolicy {
    /// Accept a sequence with no trust verdict at all. Warns when it fires.
    pub none: bool,
    /// Accept TRUST_UNDEFINED signers.
    pub unknown: bool,
    /// Accept TRUST_MARGINAL signers.
    pub marginal: bool,
    /// Accept TRUST_FULLY signers.
    pub full: bool,
    /// Accept TRUST_ULTIMATE signers.
    pub ultimate: bool,
    /// Accept even TRUST_NEVER signers. This opts out of trust enforcement
    /// entirely and warns loudly when it fires.
    pub never: bool,
}

impl Default for TrustLevelPolicy {
    fn default() -> Self {
        Self {
            none: false,
            unknown: false,
            marginal: true,
            full: true,
            ultimate: true,
            never: false,
        }
    }
}

/// Exceptional signature verdicts the caller accepts anyway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExceptionPolicy {
    /// Accept an expired signature (EXPSIG).
    pub allow_expired_signature: bool,
    /// Accept a signature made with an expired key (EXPKEYSIG).
    pub allow_expired_key: bool,
    /// Accept a signature made with a revoked key (REVKEYSIG).
    pub allow_revoked_key: bool,
}

/// Policy rejection of a decrypted/verified payload. Callers treat any of
/// these as a hard failure of the surrounding operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// The signer's primary fingerprint is absent or not on the allow-list.
    #[error("signer {fingerprint:?} is not in the allowed signer list")]
    SignerNotAllowed {
        /// The primary signer fingerprint, when one was reported.
        fingerprint: Option<String>,
    },
    /// The signature verdict is unacceptable under the exception policy.
    #[error("signature rejected: {reason:?}")]
    SignatureRejected {
        /// The verdict that caused the rejection.
        reason: SignatureResult,
    },
    /// The signer's trust level is unacceptable under the trust-level policy.
    #[error("signature not trusted: {reason:?}")]
    SignatureNotTrusted {
        /// The trust verdict that caused the rejection.
        reason: TrustResult,
    },
}

impl StatusEventSequence {
    /// True iff any event in the sequence carries this keyword.
    pub fn has_event(&self, keyword: &str) -> bool {
        self.iter().any(|event| event.keyword == keyword)
    }

    /// The overall signature verdict, scanning the whole sequence.
    ///
    /// GOOD requires the absence of BADSIG and ERRSIG; the remaining
    /// verdicts are tested in priority order BAD, ERROR, EXPIRED,
    /// KEY_EXPIRED, KEY_REVOKED.
    pub fn signature_result(&self) -> SignatureResult {
        if self.has_event("GOODSIG") && !self.has_event("BADSIG") && !self.has_event("ERRSIG") {
            SignatureResult::Good
        } else if self.has_event("BADSIG") {
            SignatureResult::Bad
        } else if self.has_event("ERRSIG") {
            SignatureResult::Error
        } else if self.has_event("EXPSIG") {
            SignatureResult::Expired
        } else if self.has_event("EXPKEYSIG") {
            SignatureResult::KeyExpired
        } else if self.has_event("REVKEYSIG") {
            SignatureResult::KeyRevoked
        } else {
            SignatureResult::None
        }
    }

    /// The signer's web-of-trust verdict, in priority order UNDEFINED,
    /// NEVER, MARGINAL, FULLY, ULTIMATE.
    pub fn signature_trust_result(&self) -> TrustResult {
        if self.has_event("TRUST_UNDEFINED") {
            TrustResult::Undefined
        } else if self.has_event("TRUST_NEVER") {
            TrustResult::Never
        } else if self.has_event("TRUST_MARGINAL") {
            TrustResult::Marginal
        } else if self.has_event("TRUST_FULLY") {
            TrustResult::Fully
        } else if self.has_event("TRUST_ULTIMATE") {
            TrustResult::Ultimate
        } else {
            TrustResult::None
        }
    }

    /// The primary key fingerprint from the first VALIDSIG event, if any.
    pub fn primary_signer_fingerprint(&self) -> Option<&str> {
        self.iter()
            .find(|event| event.keyword == "VALIDSIG")
            .and_then(|event| event.field("primary_key_fingerprint"))
    }

    /// Fingerprints of every IMPORT_OK event, de-duplicated, in order of
    /// first appearance.
    pub fn imported_fingerprints(&self) -> Vec<&str> {
        let mut fingerprints: Vec<&str> = Vec::new();
        for event in self {
            if event.keyword != "IMPORT_OK" {
                continue;
            }
            if let Some(fpr) = event.field("fingerprint") {
                if !fingerprints.contains(&fpr) {
                    fingerprints.push(fpr);
                }
            }
        }
        fingerprints
    }

    /// True iff a primary signer fingerprint is present and on the
    /// allow-list (compared case-insensitively). An empty allow-list or a
    /// sequence without VALIDSIG is always false, never an error.
    pub fn is_signer_allowed<S: AsRef<str>>(&self, allowed: &[S]) -> bool {
        match self.primary_signer_fingerprint() {
            Some(fpr) if !fpr.is_empty() => allowed
                .iter()
                .any(|candidate| candidate.as_ref().eq_ignore_ascii_case(fpr)),
            _ => false,
        }
    }

    /// Fail unless the signer is on the allow-list.
    ///
    /// # Errors
    ///
    /// [`PolicyError::SignerNotAllowed`] when [`Self::is_signer_allowed`]
    /// is false.
    pub fn assert_signer_allowed<S: AsRef<str>>(&self, allowed: &[S]) -> Result<(), PolicyError> {
        if self.is_signer_allowed(allowed) {
            Ok(())
        } else {
            Err(PolicyError::SignerNotAllowed {
                fingerprint: self.primary_signer_fingerprint().map(str::to_owned),
            })
        }
    }

    /// Enforce the trust policy over this sequence.
    ///
    /// The signature verdict must be GOOD, or one of the exceptional
    /// verdicts the [`ExceptionPolicy`] allows. Independently, the signer's
    /// trust verdict must be one of the levels the [`TrustLevelPolicy`]
    /// accepts; a TRUST_NEVER verdict overrides every other signal unless
    /// the policy opts in to `never`, and a sequence with no trust verdict
    /// is only acceptable under `none`. Both opt-ins log a warning when
    /// they fire.
    ///
    /// # Errors
    ///
    /// [`PolicyError::SignatureRejected`] for an unacceptable signature
    /// verdict, [`PolicyError::SignatureNotTrusted`] for an unacceptable
    /// trust level.
    pub fn assert_signature_trusted(
        &self,
        levels: &TrustLevelPolicy,
        exceptions: &ExceptionPolicy,
    ) -> Result<(), PolicyError> {
        let result = self.signature_result();
        let goodness = result == SignatureResult::Good
            || (exceptions.allow_expired_signature && result == SignatureResult::Expired)
            || (exceptions.allow_expired_key && result == SignatureResult::KeyExpired)
            || (exceptions.allow_revoked_key && result == SignatureResult::KeyRevoked);
        if !goodness {
            return Err(PolicyError::SignatureRejected { reason: result });
        }

        let mut trustiness = (levels.unknown && self.has_event("TRUST_UNDEFINED"))
            || (levels.marginal && self.has_event("TRUST_MARGINAL"))
            || (levels.full && self.has_event("TRUST_FULLY"))
            || (levels.ultimate && self.has_event("TRUST_ULTIMATE"));

        if levels.never {
            if self.has_event("TRUST_NEVER") {
                warn!(
                    "accepting a never-trust signer: trust enforcement is disabled by policy"
                );
                trustiness = true;
            }
        } else if self.has_event("TRUST_NEVER") {
            // Never-trust overrides every other trust signal.
            trustiness = false;
        }

        if levels.none && self.signature_trust_result() == TrustResult::None {
            warn!("no trust verdict in status output; accepting untrusted signer by policy");
            trustiness = true;
        }

        if !trustiness {
            return Err(PolicyError::SignatureNotTrusted {
                reason: self.signature_trust_result(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::decode_status;

    fn seq(lines: &[&str]) -> StatusEventSequence {
        let text: String = lines
            .iter()
            .map(|l| format!("[GNUPG:] {l}\n"))
            .collect();
        decode_status(&text)
    }

    #[test]
    fn test_has_event() {
        let s = seq(&["GOODSIG AAAA Alice <alice@test.xyz>", "TRUST_FULLY 0 pgp"]);
        assert!(s.has_event("GOODSIG"));
        assert!(s.has_event("TRUST_FULLY"));
        assert!(!s.has_event("BADSIG"));
    }

    #[test]
    fn test_signature_result_good() {
        let s = seq(&["NEWSIG", "GOODSIG AAAA Alice <alice@test.xyz>"]);
        assert_eq!(s.signature_result(), SignatureResult::Good);
    }

    #[test]
    fn test_badsig_wins_over_goodsig() {
        let s = seq(&[
            "GOODSIG AAAA Alice <alice@test.xyz>",
            "BADSIG BBBB Mallory <m@test.xyz>",
        ]);
        assert_eq!(s.signature_result(), SignatureResult::Bad);
    }

    #[test]
    fn test_errsig_blocks_good() {
        let s = seq(&["GOODSIG AAAA Alice <alice@test.xyz>", "ERRSIG BBBB 1 8 00 0 9"]);
        assert_eq!(s.signature_result(), SignatureResult::Error);
    }

    #[test]
    fn test_signature_result_none() {
        let s = seq(&["BEGIN_DECRYPTION", "DECRYPTION_OKAY"]);
        assert_eq!(s.signature_result(), SignatureResult::None);
    }

    #[test]
    fn test_expired_key_result() {
        let s = seq(&["EXPKEYSIG AAAA Alice <alice@test.xyz>"]);
        assert_eq!(s.signature_result(), SignatureResult::KeyExpired);
    }

    #[test]
    fn test_trust_result_priority() {
        let s = seq(&["TRUST_FULLY 0 pgp"]);
        assert_eq!(s.signature_trust_result(), TrustResult::Fully);
        let s = seq(&["TRUST_NEVER 0", "TRUST_FULLY 0 pgp"]);
        assert_eq!(s.signature_trust_result(), TrustResult::Never);
        let s = seq(&["BEGIN_DECRYPTION"]);
        assert_eq!(s.signature_trust_result(), TrustResult::None);
    }

    #[test]
    fn test_primary_signer_fingerprint() {
        let s = seq(&[
            "GOODSIG AAAA Alice <alice@test.xyz>",
            "VALIDSIG AAAA 2020-09-13 1600000000 0 4 0 1 8 00 FFFF0000",
        ]);
        assert_eq!(s.primary_signer_fingerprint(), Some("FFFF0000"));
        assert_eq!(seq(&["GOODSIG AAAA"]).primary_signer_fingerprint(), None);
    }

    #[test]
    fn test_imported_fingerprints_dedup_in_order() {
        let s = seq(&[
            "IMPORT_OK 1 AAAA",
            "IMPORT_OK 0 BBBB",
            "IMPORT_OK 17 AAAA",
            "IMPORT_RES 2 0 2 0 0 0 0 0 0 0 0 0 0 0 0",
        ]);
        assert_eq!(s.imported_fingerprints(), vec!["AAAA", "BBBB"]);
    }

    #[test]
    fn test_signer_allowed_empty_list_is_false() {
        let s = seq(&["VALIDSIG AAAA 2020-09-13 1600000000 0 4 0 1 8 00 FFFF0000"]);
        let empty: Vec<String> = Vec::new();
        assert!(!s.is_signer_allowed(&empty));
        assert!(s.is_signer_allowed(&["ffff0000"]));
        assert!(!s.is_signer_allowed(&["0000FFFF"]));
    }

    #[test]
    fn test_assert_signer_allowed_error_carries_fingerprint() {
        let s = seq(&["VALIDSIG AAAA 2020-09-13 1600000000 0 4 0 1 8 00 FFFF0000"]);
        let err = s
            .assert_signer_allowed(&["0000FFFF"])
            .expect_err("must reject");
        assert_eq!(
            err,
            PolicyError::SignerNotAllowed {
                fingerprint: Some("FFFF0000".to_owned()),
            }
        );
    }

    #[test]
    fn test_default_policy_accepts_goodsig_trust_fully() {
        let s = seq(&["GOODSIG AAAA Alice <alice@test.xyz>", "TRUST_FULLY 0 pgp"]);
        s.assert_signature_trusted(&TrustLevelPolicy::default(), &ExceptionPolicy::default())
            .expect("accepted");
    }

    #[test]
    fn test_default_policy_rejects_trust_never() {
        let s = seq(&["GOODSIG AAAA Alice <alice@test.xyz>", "TRUST_NEVER 0"]);
        let err = s
            .assert_signature_trusted(&TrustLevelPolicy::default(), &ExceptionPolicy::default())
            .expect_err("must reject");
        assert_eq!(
            err,
            PolicyError::SignatureNotTrusted {
                reason: TrustResult::Never,
            }
        );
    }

    #[test]
    fn test_never_opt_in_accepts_trust_never() {
        let s = seq(&["GOODSIG AAAA Alice <alice@test.xyz>", "TRUST_NEVER 0"]);
        let levels = TrustLevelPolicy {
            never: true,
            ..TrustLevelPolicy::default()
        };
        s.assert_signature_trusted(&levels, &ExceptionPolicy::default())
            .expect("accepted by never opt-in");
    }

    #[test]
    fn test_never_overrides_other_trust_signals() {
        let s = seq(&[
            "GOODSIG AAAA Alice <alice@test.xyz>",
            "TRUST_FULLY 0 pgp",
            "TRUST_NEVER 0",
        ]);
        let err = s
            .assert_signature_trusted(&TrustLevelPolicy::default(), &ExceptionPolicy::default())
            .expect_err("never wins");
        assert!(matches!(err, PolicyError::SignatureNotTrusted { .. }));
    }

    #[test]
    fn test_none_accepts_missing_trust_verdict() {
        let s = seq(&["GOODSIG AAAA Alice <alice@test.xyz>"]);
        // Rejected by default.
        assert!(s
            .assert_signature_trusted(&TrustLevelPolicy::default(), &ExceptionPolicy::default())
            .is_err());
        // Accepted once `none` is enabled.
        let levels = TrustLevelPolicy {
            none: true,
            ..TrustLevelPolicy::default()
        };
        s.assert_signature_trusted(&levels, &ExceptionPolicy::default())
            .expect("accepted by none opt-in");
    }

    #[test]
    fn test_bad_signature_rejected_before_trust() {
        let s = seq(&["BADSIG AAAA Mallory <m@test.xyz>", "TRUST_ULTIMATE 0 pgp"]);
        let err = s
            .assert_signature_trusted(&TrustLevelPolicy::default(), &ExceptionPolicy::default())
            .expect_err("must reject");
        assert_eq!(
            err,
            PolicyError::SignatureRejected {
                reason: SignatureResult::Bad,
            }
        );
    }

    #[test]
    fn test_expired_key_exception() {
        let s = seq(&["EXPKEYSIG AAAA Alice <alice@test.xyz>", "TRUST_FULLY 0 pgp"]);
        // Rejected without the exception.
        assert!(s
            .assert_signature_trusted(&TrustLevelPolicy::default(), &ExceptionPolicy::default())
            .is_err());
        // Accepted with it.
        let exceptions = ExceptionPolicy {
            allow_expired_key: true,
            ..ExceptionPolicy::default()
        };
        s.assert_signature_trusted(&TrustLevelPolicy::default(), &exceptions)
            .expect("accepted by exception");
    }

    #[test]
    fn test_expired_signature_exception() {
        let s = seq(&["EXPSIG AAAA Alice <alice@test.xyz>", "TRUST_FULLY 0 pgp"]);
        let exceptions = ExceptionPolicy {
            allow_expired_signature: true,
            ..ExceptionPolicy::default()
        };
        s.assert_signature_trusted(&TrustLevelPolicy::default(), &exceptions)
            .expect("accepted by exception");
    }

    #[test]
    fn test_revoked_key_exception() {
        let s = seq(&["REVKEYSIG AAAA Alice <alice@test.xyz>", "TRUST_MARGINAL 0 pgp"]);
        assert!(s
            .assert_signature_trusted(&TrustLevelPolicy::default(), &ExceptionPolicy::default())
            .is_err());
        let exceptions = ExceptionPolicy {
            allow_revoked_key: true,
            ..ExceptionPolicy::default()
        };
        s.assert_signature_trusted(&TrustLevelPolicy::default(), &exceptions)
            .expect("accepted by exception");
    }

    #[test]
    fn test_policy_json_shapes() {
        // Policies deserialize from sparse JSON, unlisted switches default.
        let levels: TrustLevelPolicy =
            serde_json::from_str(r#"{"none": true}"#).expect("deserialize levels");
        assert!(levels.none);
        assert!(levels.marginal);
        assert!(!levels.never);
        let exceptions: ExceptionPolicy =
            serde_json::from_str(r#"{"allow_expired_key": true}"#).expect("deserialize exceptions");
        assert!(exceptions.allow_expired_key);
        assert!(!exceptions.allow_revoked_key);
    }
}
