//! Transport probe.
//!
//! Decides, for the calling context, whether the native messaging primitive
//! exists and whether this context may use it. Probes are injected values and
//! are asked again on every call.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the current context can do with the native transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportAvailability {
    /// No native primitive in this context.
    Unavailable,
    /// Primitive present, but no process identity (e.g. an injected page
    /// script). Direct calls are not allowed.
    NativeRestricted,
    /// Primitive present and the context has a process identity.
    NativePrivileged,
}

impl TransportAvailability {
    pub fn has_native(self) -> bool {
        !matches!(self, TransportAvailability::Unavailable)
    }
}

impl fmt::Display for TransportAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportAvailability::Unavailable => "unavailable",
            TransportAvailability::NativeRestricted => "native_restricted",
            TransportAvailability::NativePrivileged => "native_privileged",
        };
        f.write_str(s)
    }
}

/// Source of a [`TransportAvailability`] verdict.
pub trait EnvironmentProbe: Send + Sync + fmt::Debug {
    fn probe(&self) -> TransportAvailability;
}

/// A fixed verdict is its own probe.
impl EnvironmentProbe for TransportAvailability {
    fn probe(&self) -> TransportAvailability {
        *self
    }
}

/// The host's native runtime object as seen from one context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeRuntime {
    /// Process identity. Only privileged contexts have one.
    pub id: Option<String>,
}

/// Description of what a context can see of the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEnvironment {
    pub runtime: Option<NativeRuntime>,
}

impl HostEnvironment {
    /// Context with no native runtime object at all.
    pub fn bare() -> Self {
        Self { runtime: None }
    }

    /// Runtime object present without an identity.
    pub fn restricted() -> Self {
        Self {
            runtime: Some(NativeRuntime { id: None }),
        }
    }

    /// Runtime object present with identity `id`.
    pub fn privileged(id: impl Into<String>) -> Self {
        Self {
            runtime: Some(NativeRuntime {
                id: Some(id.into()),
            }),
        }
    }
}

impl EnvironmentProbe for HostEnvironment {
    fn probe(&self) -> TransportAvailability {
        match &self.runtime {
            None => TransportAvailability::Unavailable,
            Some(NativeRuntime { id: None }) => TransportAvailability::NativeRestricted,
            Some(NativeRuntime { id: Some(_) }) => TransportAvailability::NativePrivileged,
        }
    }
}
