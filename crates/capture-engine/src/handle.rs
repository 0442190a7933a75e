//! Scoped ownership of framework objects.

use std::fmt;
use std::sync::Arc;

use crate::framework::{Framework, ObjectId, ObjectKind};

/// Exclusive reference to one framework object.
///
/// The object is released exactly once, when the handle is dropped. Not
/// `Clone`: ordered teardown takes handles out of their owner and drops them
/// in sequence.
pub struct OwnedHandle {
    framework: Arc<dyn Framework>,
    id: ObjectId,
    kind: ObjectKind,
    name: String,
}

impl OwnedHandle {
    pub fn new(
        framework: Arc<dyn Framework>,
        id: ObjectId,
        kind: ObjectKind,
        name: impl Into<String>,
    ) -> Self {
        Self {
            framework,
            id,
            kind,
            name: name.into(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release now. Equivalent to dropping the handle.
    pub fn release(self) {}
}

impl fmt::Debug for OwnedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish()
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        tracing::debug!(id = self.id.0, kind = ?self.kind, name = %self.name, "Releasing");
        self.framework.release(self.id);
    }
}
