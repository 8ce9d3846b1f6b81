//! Input validation
//!
//! Compose requests are checked at the boundary, before any generation is
//! started. A rejected request produces a [`ComposeError::Validation`] whose
//! text is shown to the client verbatim.

use serde::{Deserialize, Serialize};

use crate::error::ComposeError;

/// Limits applied to compose requests
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeLimits {
    /// Maximum prompt length in characters, after sanitizing (default: 512)
    pub max_prompt_chars: usize,
    /// Upper bound for a request's token budget (default: 100000)
    pub max_tokens_ceiling: u32,
}

impl Default for ComposeLimits {
    fn default() -> Self {
        Self {
            max_prompt_chars: 512,
            max_tokens_ceiling: 100_000,
        }
    }
}

/// Validates and normalizes compose input
#[derive(Clone, Debug, Default)]
pub struct InputValidator {
    limits: ComposeLimits,
}

impl InputValidator {
    /// Create a validator with the given limits
    #[must_use]
    pub fn new(limits: ComposeLimits) -> Self {
        Self { limits }
    }

    /// Limits in effect
    #[must_use]
    pub fn limits(&self) -> &ComposeLimits {
        &self.limits
    }

    /// Sanitize a prompt and check it is usable
    ///
    /// Surrounding whitespace is trimmed, then C0 and C1 control characters
    /// (U+0000-U+001F, U+007F-U+009F) are removed.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::Validation`] for an empty or over-long prompt.
    pub fn validate_prompt(&self, raw: &str) -> Result<String, ComposeError> {
        let prompt: String = raw.trim().chars().filter(|c| !c.is_control()).collect();

        if prompt.is_empty() {
            return Err(ComposeError::Validation("Prompt cannot be empty.".to_string()));
        }

        if prompt.chars().count() > self.limits.max_prompt_chars {
            return Err(ComposeError::Validation(format!(
                "Prompt too long (max {} chars).",
                self.limits.max_prompt_chars
            )));
        }

        Ok(prompt)
    }

    /// Clamp a requested token budget to `1..=max_tokens_ceiling`
    #[must_use]
    pub fn clamp_max_tokens(&self, requested: u64) -> u32 {
        let ceiling = self.limits.max_tokens_ceiling.max(1);
        u32::try_from(requested).map_or(ceiling, |n| n.clamp(1, ceiling))
    }
}
