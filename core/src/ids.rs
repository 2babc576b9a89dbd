//! Identifier newtypes.
//!
//! Real persisted objects are addressed by `ObjId`, writing systems by `WsId`.
//! Staging objects use `ShadowId`, which lives in a separate numeric space and
//! is never handed out twice within a process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! define_id {
    ($name:ident, $repr:ty, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub $repr);

        impl $name {
            pub const fn new(id: $repr) -> Self {
                Self(id)
            }

            pub const fn get(self) -> $repr {
                self.0
            }
        }

        impl From<$repr> for $name {
            fn from(id: $repr) -> Self {
                Self(id)
            }
        }

        impl From<$name> for $repr {
            fn from(id: $name) -> $repr {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(ObjId, u32, "Identifier of a persisted object owned by the store.");
define_id!(WsId, u32, "Identifier of a writing system.");
define_id!(ShadowId, u64, "Synthetic identifier of a staging object.");

static NEXT_SHADOW: AtomicU64 = AtomicU64::new(1);

impl ShadowId {
    /// Allocate a fresh shadow id. Ids are process-unique.
    pub fn fresh() -> Self {
        Self(NEXT_SHADOW.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_ids_are_never_reused() {
        let a = ShadowId::fresh();
        let b = ShadowId::fresh();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn obj_id_conversions() {
        let id = ObjId::from(42u32);
        assert_eq!(u32::from(id), 42);
        assert_eq!(id.to_string(), "42");
    }
}
