//! Moderation gate — the policy decision plus the fail-closed oracle call.
//!
//! Decision order:
//! 1. `disabled` → no check at all.
//! 2. `force` → check, no matter what the subject says.
//! 3. otherwise → check unless the subject opts out with `NO_MODERATION`.

use std::sync::Arc;

use crate::pipeline::types::SafetyOracle;

/// Subject token that opts a message out of moderation when `force` is off.
pub const OPT_OUT_TOKEN: &str = "NO_MODERATION";

/// Global moderation policy flags, fixed at startup.
#[derive(Debug, Clone, Copy)]
pub struct ModerationPolicy {
    /// Moderate every message regardless of the subject opt-out.
    pub force: bool,
    /// Skip moderation entirely. Wins over `force`.
    pub disabled: bool,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            force: true,
            disabled: false,
        }
    }
}

/// Per-message moderation result. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationDecision {
    /// Policy did not require a check; treated as allowed.
    Skipped,
    Allowed,
    /// Flagged by the oracle, or the oracle call failed (fail closed).
    Rejected,
}

/// Whether policy + subject require an oracle check.
pub fn moderation_required(policy: ModerationPolicy, subject: &str) -> bool {
    if policy.disabled {
        return false;
    }
    if policy.force {
        return true;
    }
    !subject.to_uppercase().contains(OPT_OUT_TOKEN)
}

/// Screens message bodies through the safety oracle according to policy.
pub struct ModerationGate {
    policy: ModerationPolicy,
    oracle: Arc<dyn SafetyOracle>,
}

impl ModerationGate {
    pub fn new(policy: ModerationPolicy, oracle: Arc<dyn SafetyOracle>) -> Self {
        Self { policy, oracle }
    }

    /// Screen one message. An unreachable oracle rejects: unmoderated text
    /// must never reach synthesis when the check itself is down.
    pub async fn screen(&self, subject: &str, body: &str) -> ModerationDecision {
        if !moderation_required(self.policy, subject) {
            return ModerationDecision::Skipped;
        }

        match self.oracle.is_flagged(body).await {
            Ok(true) => {
                tracing::warn!("safety oracle flagged message content");
                ModerationDecision::Rejected
            }
            Ok(false) => ModerationDecision::Allowed,
            Err(e) => {
                tracing::error!("safety oracle unavailable, treating content as unsafe: {e}");
                ModerationDecision::Rejected
            }
        }
    }
}
