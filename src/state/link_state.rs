/// Per-link state definitions for tracking harvest progress
///
/// A link's state is never stored directly; it is derived from which persisted
/// set the link appears in, plus its attempt count.
use crate::state::LinkSet;
use crate::Link;
use std::collections::BTreeMap;
use std::fmt;

/// Failed-run count per link, persisted as a JSON object
pub type AttemptLedger = BTreeMap<Link, u32>;

/// Represents the current state of a link in the harvest process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// Discovered but not yet successfully scraped
    Pending,

    /// The most recent attempt errored
    Failed { attempts: u32 },

    /// A record for this link exists in the observation store
    Scraped,

    /// Failed often enough to be parked outside the work queue
    Exhausted { attempts: u32 },
}

impl LinkState {
    /// Derives a link's state from the persisted sets
    ///
    /// Scraped wins over everything else: a record in the observation store is
    /// the only proof of completion.
    pub fn classify(
        link: &str,
        scraped: &LinkSet,
        failed: &LinkSet,
        exhausted: &LinkSet,
        attempts: &AttemptLedger,
    ) -> Self {
        let count = attempts.get(link).copied().unwrap_or(0);
        if scraped.contains(link) {
            Self::Scraped
        } else if exhausted.contains(link) {
            Self::Exhausted { attempts: count }
        } else if failed.contains(link) {
            Self::Failed { attempts: count }
        } else {
            Self::Pending
        }
    }

    /// State after one more failed run, given the ceiling (0 = no ceiling)
    pub fn after_failure(self, max_attempts: u32) -> Self {
        let attempts = match self {
            Self::Pending => 1,
            Self::Failed { attempts } | Self::Exhausted { attempts } => attempts + 1,
            Self::Scraped => return Self::Scraped,
        };

        if max_attempts > 0 && attempts >= max_attempts {
            Self::Exhausted { attempts }
        } else {
            Self::Failed { attempts }
        }
    }

    /// Returns true if the link belongs in the next work queue
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed { .. })
    }

    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Scraped)
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Failed { attempts } | Self::Exhausted { attempts } => *attempts,
            Self::Pending | Self::Scraped => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Failed { .. } => "failed",
            Self::Scraped => "scraped",
            Self::Exhausted { .. } => "exhausted",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { attempts } | Self::Exhausted { attempts } => {
                write!(f, "{} ({} attempts)", self.as_str(), attempts)
            }
            _ => write!(f, "{}", self.as_str()),
        }
    }
}
