use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Method name the caller sends to tell the host an identifier is no longer needed.
///
/// This is a cross-boundary contract: hosts match on the exact string.
pub const RELEASE_METHOD: &str = "farcall.dispatcher.releaseReferenceById";

/// Key under which a reference-shaped result carries its identifier.
pub const REFERENCE_MARKER_KEY: &str = "__farcallRefId";

/// Opaque identifier of an object living on the host.
///
/// Identifiers are allocated by a [`ReferenceRegistry`](crate::ReferenceRegistry)
/// and are never reused for the lifetime of that registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(pub u64);

impl ReferenceId {
    /// The host's root object. Always addressable, never allocated, never released.
    pub const GLOBAL: ReferenceId = ReferenceId(0);

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_global(self) -> bool {
        self == Self::GLOBAL
    }
}

impl From<u64> for ReferenceId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The shape a host uses to hand back a reference instead of a value:
/// `{"__farcallRefId": 7}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceMarker {
    #[serde(rename = "__farcallRefId")]
    pub id: ReferenceId,
}

impl ReferenceMarker {
    pub fn new(id: ReferenceId) -> Self {
        Self { id }
    }

    /// Recognises a reference-shaped value. Anything else, including objects
    /// carrying extra keys, is not a reference.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.len() != 1 {
            return None;
        }
        object
            .get(REFERENCE_MARKER_KEY)
            .and_then(Value::as_u64)
            .map(|raw| Self::new(ReferenceId(raw)))
    }

    pub fn into_value(self) -> Value {
        let mut object = serde_json::Map::with_capacity(1);
        object.insert(REFERENCE_MARKER_KEY.to_string(), Value::from(self.id.0));
        Value::Object(object)
    }
}
