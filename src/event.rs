//! Trigger event gate
//!
//! Caches are only read or written for events tied to a branch or tag ref.
//! Anything else (schedules, manual dispatches without a ref, ...) makes
//! both phases a quiet no-op.

use std::fmt;
use tracing::warn;

/// Environment variable naming the triggering event
pub const EVENT_NAME_VAR: &str = "GITHUB_EVENT_NAME";

/// Environment variable holding the triggering ref
pub const REF_VAR: &str = "GITHUB_REF";

/// Event kinds that carry a ref
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Push,
    PullRequest,
    PullRequestTarget,
}

impl EventKind {
    /// Parse a recognized event name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "push" => Some(Self::Push),
            "pull_request" => Some(Self::PullRequest),
            "pull_request_target" => Some(Self::PullRequestTarget),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Push => "push",
            Self::PullRequest => "pull_request",
            Self::PullRequestTarget => "pull_request_target",
        };
        write!(f, "{}", name)
    }
}

/// The triggering event as supplied by the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventContext {
    pub event_name: String,
    pub git_ref: Option<String>,
}

impl EventContext {
    /// Create a context; a blank ref counts as absent
    pub fn new(event_name: impl Into<String>, git_ref: Option<String>) -> Self {
        Self {
            event_name: event_name.into(),
            git_ref: git_ref.filter(|r| !r.trim().is_empty()),
        }
    }

    /// Read the context from the environment
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(EVENT_NAME_VAR).unwrap_or_default(),
            std::env::var(REF_VAR).ok(),
        )
    }

    /// Recognized event kind, if any
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_name(&self.event_name)
    }
}

/// Whether cache operations may run for this event
pub fn is_eligible(ctx: &EventContext) -> bool {
    ctx.kind().is_some() && ctx.git_ref.is_some()
}

/// [`is_eligible`], warning when the event is rejected
pub fn check(ctx: &EventContext) -> bool {
    let eligible = is_eligible(ctx);
    if !eligible {
        let shown = if ctx.event_name.is_empty() {
            "<unknown>"
        } else {
            ctx.event_name.as_str()
        };
        warn!(
            "Event Validation Error: The event type {} is not supported because it's not tied to a branch or tag ref.",
            shown
        );
    }
    eligible
}
