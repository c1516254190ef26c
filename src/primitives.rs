//! Typed identifiers and core enums shared across the engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn prefixed_hex_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

macro_rules! prefixed_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a new globally unique identifier with this type's prefix.
            pub fn new() -> Self {
                Self(prefixed_hex_id($prefix))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

prefixed_id!(AgentId, "agent");
prefixed_id!(HostId, "host");
prefixed_id!(SnapshotId, "snap");
prefixed_id!(VolumeId, "vol");

macro_rules! named_string {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Construct a name, rejecting the empty string.
            pub fn new(value: impl Into<String>) -> Result<Self, InvalidNameError> {
                let value = value.into();
                if value.is_empty() {
                    return Err(InvalidNameError);
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

named_string!(AgentName);
named_string!(HostName);
named_string!(ProviderInstanceName);
named_string!(ProviderBackendName);

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("name must be non-empty")]
pub struct InvalidNameError;

/// `STOPPED -> RUNNING -> WAITING -> REPLACED | DONE`, plus destroyed
/// (absence from the store, not representable as a value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentLifecycleState {
    Stopped,
    Running,
    Waiting,
    Replaced,
    Done,
}

impl AgentLifecycleState {
    /// Whether `self -> next` is a valid transition per the state machine in
    /// the data model (destroyed agents are removed from the store, not
    /// modeled as a variant here, so there is no `-> destroyed` arm).
    pub fn can_transition_to(self, next: Self) -> bool {
        use AgentLifecycleState::*;
        matches!(
            (self, next),
            (Stopped, Running)
                | (Running, Waiting)
                | (Running, Done)
                | (Running, Stopped)
                | (Waiting, Running)
                | (Waiting, Done)
                | (Waiting, Stopped)
                | (Running, Replaced)
                | (Waiting, Replaced)
                | (Stopped, Replaced)
        )
    }
}

/// The embedded reference to an agent's host inside its persisted
/// record. Only IDs and display data are carried here, never a live
/// handle — leaf records hold IDs and resolve through the host store at
/// call sites, avoiding a cyclic host/agent object graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRef {
    pub id: HostId,
    pub name: String,
    pub provider_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Destroyed,
}

/// A named kind of liveness signal contributing to idle computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySource {
    Create,
    Start,
    Boot,
    User,
    Agent,
    Ssh,
    Process,
}

impl ActivitySource {
    pub fn file_name(self) -> &'static str {
        match self {
            ActivitySource::Create => "create",
            ActivitySource::Start => "start",
            ActivitySource::Boot => "boot",
            ActivitySource::User => "user",
            ActivitySource::Agent => "agent",
            ActivitySource::Ssh => "ssh",
            ActivitySource::Process => "process",
        }
    }
}

/// A policy declaring which activity sources count as "active".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleMode {
    /// USER + SSH + CREATE + START + BOOT
    User,
    /// USER ∪ {AGENT, PROCESS}
    Io,
}

impl IdleMode {
    /// Activity sources this mode considers when computing idleness.
    pub fn sources(self) -> &'static [ActivitySource] {
        use ActivitySource::*;
        match self {
            IdleMode::User => &[User, Ssh, Create, Start, Boot],
            IdleMode::Io => &[User, Ssh, Create, Start, Boot, Agent, Process],
        }
    }
}

/// Governs whether a single resource failure stops a bulk sweep (list, gc).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorBehavior {
    Abort,
    Continue,
}

impl clap::ValueEnum for ErrorBehavior {
    fn value_variants<'a>() -> &'a [Self] {
        &[ErrorBehavior::Abort, ErrorBehavior::Continue]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            ErrorBehavior::Abort => clap::builder::PossibleValue::new("abort"),
            ErrorBehavior::Continue => clap::builder::PossibleValue::new("continue"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_has_prefix_and_is_unique() {
        let a = AgentId::new();
        let b = AgentId::new();
        assert!(a.as_str().starts_with("agent-"));
        assert_ne!(a, b);
    }

    #[test]
    fn name_rejects_empty() {
        assert!(AgentName::new("").is_err());
        assert!(AgentName::new("a1").is_ok());
    }

    #[test]
    fn lifecycle_transitions() {
        use AgentLifecycleState::*;
        assert!(Stopped.can_transition_to(Running));
        assert!(Running.can_transition_to(Waiting));
        assert!(!Done.can_transition_to(Running));
        assert!(!Stopped.can_transition_to(Waiting));
    }

    #[test]
    fn idle_mode_sources() {
        assert_eq!(IdleMode::User.sources().len(), 5);
        assert!(IdleMode::Io.sources().contains(&ActivitySource::Process));
    }
}
