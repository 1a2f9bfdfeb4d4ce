//! Session configuration.
//!
//! One parameterized configuration replaces the per-variant differences
//! between client front ends (reconnect limits, rejection codes, whether
//! choice answers are rendered at all).

use crate::endpoint::EndpointTemplate;
use std::collections::BTreeSet;
use std::time::Duration;

/// Close codes that mean the server refused the session on policy grounds.
pub const DEFAULT_PERMANENT_CLOSE_CODES: [u16; 5] = [401, 403, 4001, 4003, 4004];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub endpoint_template: EndpointTemplate,
    pub max_reconnect_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_ceiling: Duration,
    pub permanent_close_codes: BTreeSet<u16>,
    /// When false every answer type is rendered as free text.
    pub supports_choice_answers: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint_template: EndpointTemplate::default(),
            max_reconnect_attempts: 3,
            backoff_base: Duration::from_millis(2000),
            backoff_ceiling: Duration::from_millis(8000),
            permanent_close_codes: DEFAULT_PERMANENT_CLOSE_CODES.into_iter().collect(),
            supports_choice_answers: true,
        }
    }
}

impl SessionConfig {
    pub fn with_endpoint_template(mut self, template: EndpointTemplate) -> Self {
        self.endpoint_template = template;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, base: Duration, ceiling: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_ceiling = ceiling;
        self
    }

    pub fn with_permanent_close_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.permanent_close_codes = codes.into_iter().collect();
        self
    }

    pub fn with_choice_answers(mut self, enabled: bool) -> Self {
        self.supports_choice_answers = enabled;
        self
    }
}
