//! Interactive error recovery.
//!
//! When a backend operation fails, the service asks an [`ErrorResolver`]
//! what to do. The answer is the only recovery driver: there is no
//! automatic backoff and no retry limit.

use async_trait::async_trait;
use std::fmt;

use crate::model::SourceType;

/// How the failing operation is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Lifecycle-critical: ignoring yields no result, disabling re-raises
    Unrecoverable,
    /// Best-effort: ignoring or disabling yields the fallback
    Recoverable,
}

/// The user's answer to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Retry,
    Ignore,
    Disable,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Retry => "Retry",
            Self::Ignore => "Ignore",
            Self::Disable => "Disable",
        })
    }
}

/// Everything a resolver gets to see about a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorContext {
    pub source: SourceType,
    /// Service log name
    pub service: String,
    pub operation: &'static str,
    pub severity: Severity,
    /// Raw error message
    pub message: String,
}

impl ErrorContext {
    pub fn header(&self) -> &'static str {
        match self.severity {
            Severity::Unrecoverable => "Unrecoverable error!",
            Severity::Recoverable => "Error!",
        }
    }

    pub fn body(&self) -> String {
        match self.severity {
            Severity::Unrecoverable => format!(
                "{} threw an unrecoverable error:\n{}",
                self.service, self.message
            ),
            Severity::Recoverable => format!("{} threw an error:\n{}", self.service, self.message),
        }
    }
}

/// Decides how a failed operation continues.
#[async_trait]
pub trait ErrorResolver: Send + Sync {
    async fn resolve(&self, context: &ErrorContext) -> Resolution;
}

/// Asks on the terminal.
///
/// The prompt runs on the blocking pool; the failing operation waits for
/// the answer. Without a terminal the failure is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptResolver;

const CHOICES: [Resolution; 3] = [Resolution::Retry, Resolution::Ignore, Resolution::Disable];

#[async_trait]
impl ErrorResolver for PromptResolver {
    async fn resolve(&self, context: &ErrorContext) -> Resolution {
        let prompt = format!("{} {}\n{}", context.header(), context.operation, context.body());
        let answer = tokio::task::spawn_blocking(move || {
            dialoguer::Select::new()
                .with_prompt(prompt)
                .items(&CHOICES)
                .default(0)
                .interact_opt()
        })
        .await;

        match answer {
            Ok(Ok(Some(index))) => CHOICES.get(index).copied().unwrap_or(Resolution::Ignore),
            Ok(Ok(None)) => Resolution::Ignore,
            Ok(Err(e)) => {
                tracing::warn!(target: "service", error = %e, "Prompt unavailable, ignoring failure");
                Resolution::Ignore
            }
            Err(e) => {
                tracing::warn!(target: "service", error = %e, "Prompt task failed, ignoring failure");
                Resolution::Ignore
            }
        }
    }
}

/// Always gives the same answer. Used for non-interactive runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedResolver(pub Resolution);

#[async_trait]
impl ErrorResolver for FixedResolver {
    async fn resolve(&self, context: &ErrorContext) -> Resolution {
        tracing::warn!(
            target: "service",
            service = %context.service,
            operation = context.operation,
            resolution = %self.0,
            "{}", context.message
        );
        self.0
    }
}
