//! Lifecycle states stored as upper-case text columns.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(UserRole, "role", {
    Client => "CLIENT",
    Freelancer => "FREELANCER",
});

text_enum!(JobStatus, "job status", {
    Open => "OPEN",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    Disputed => "DISPUTED",
});

text_enum!(ApplicationStatus, "application status", {
    Pending => "PENDING",
    Accepted => "ACCEPTED",
    Rejected => "REJECTED",
});

text_enum!(MilestoneStatus, "milestone status", {
    Pending => "PENDING",
    InProgress => "IN_PROGRESS",
    Submitted => "SUBMITTED",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

impl ApplicationStatus {
    /// Only a pending application may be decided, and only into a terminal state.
    pub fn can_transition_to(self, next: ApplicationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted) | (Self::Pending, Self::Rejected)
        )
    }
}

/// Which side of a job is acting on a milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobParty {
    Client,
    Freelancer,
}

impl MilestoneStatus {
    pub fn can_transition_to(self, next: MilestoneStatus, actor: JobParty) -> bool {
        use MilestoneStatus::*;

        match actor {
            JobParty::Freelancer => matches!(
                (self, next),
                (Pending, InProgress) | (InProgress, Submitted) | (Rejected, InProgress)
            ),
            JobParty::Client => {
                matches!((self, next), (Submitted, Approved) | (Submitted, Rejected))
            }
        }
    }
}
