/// Default number of renegotiation requests honored per top-level call.
pub const DEFAULT_RETRY_BUDGET: u32 = 10;

/// Configuration for an [`OperationContext`](crate::OperationContext).
///
/// Controls the retry budget, the initial retry policy and whether the
/// logging observer is installed.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Maximum renegotiation requests honored within one top-level call.
    pub retry_budget: u32,
    /// Names allowed to renegotiate. Empty means every name not denied.
    pub retry_allow: Vec<String>,
    /// Names never allowed to renegotiate. Takes precedence over the allow list.
    pub retry_deny: Vec<String>,
    /// Install a [`LoggingObserver`](crate::LoggingObserver) at build time.
    pub log_operations: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            retry_budget: DEFAULT_RETRY_BUDGET,
            retry_allow: Vec::new(),
            retry_deny: Vec::new(),
            log_operations: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_config_defaults() {
        let config = ContextConfig::default();
        assert_eq!(config.retry_budget, 10);
        assert!(config.retry_allow.is_empty());
        assert!(config.retry_deny.is_empty());
        assert!(config.log_operations);
    }
}
