/// The outcome of authorizing one call against the active policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub verdict: Verdict,
    /// Name of the policy that produced the decision.
    pub policy_name: String,
    /// Rule that decided the call, if one matched.
    pub matched_rule: Option<String>,
    /// Human-readable explanation.
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Permit,
    Deny,
}

impl Decision {
    pub fn permit(
        policy_name: impl Into<String>,
        matched_rule: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            verdict: Verdict::Permit,
            policy_name: policy_name.into(),
            matched_rule,
            reason: reason.into(),
        }
    }

    pub fn deny(
        policy_name: impl Into<String>,
        matched_rule: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            verdict: Verdict::Deny,
            policy_name: policy_name.into(),
            matched_rule,
            reason: reason.into(),
        }
    }

    pub fn is_permit(&self) -> bool {
        self.verdict == Verdict::Permit
    }
}
