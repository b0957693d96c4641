use super::vendor::VendorError;

/// What to do after a failed join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Stop the agent holding the channel (when known), wait, then join again.
    Retry { stale_agent_id: Option<String> },
    GiveUp,
}

/// Retry policy for the join call: a conflict on the first attempt earns one
/// retry, anything else (or a second failure) is final.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictRetry {
    #[default]
    Initial,
    Retrying,
}

impl ConflictRetry {
    pub fn on_failure(&mut self, error: &VendorError) -> RetryDecision {
        match self {
            ConflictRetry::Initial if error.is_conflict() => {
                *self = ConflictRetry::Retrying;
                RetryDecision::Retry {
                    stale_agent_id: error.stale_agent_id(),
                }
            }
            _ => RetryDecision::GiveUp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict() -> VendorError {
        VendorError::Status {
            status: 409,
            body: r#"{"agent_id":"OLD"}"#.to_string(),
        }
    }

    #[test]
    fn test_first_conflict_retries_once() {
        let mut policy = ConflictRetry::default();
        assert_eq!(
            policy.on_failure(&conflict()),
            RetryDecision::Retry {
                stale_agent_id: Some("OLD".to_string())
            }
        );
        assert_eq!(policy, ConflictRetry::Retrying);
        assert_eq!(policy.on_failure(&conflict()), RetryDecision::GiveUp);
    }

    #[test]
    fn test_other_failures_are_final() {
        let mut policy = ConflictRetry::default();
        let err = VendorError::Status {
            status: 503,
            body: String::new(),
        };
        assert_eq!(policy.on_failure(&err), RetryDecision::GiveUp);
        assert_eq!(policy, ConflictRetry::Initial);
    }
}
