use quire_types::ObjectId;

/// A value returned from a snapshot or carried in a watcher notification.
///
/// Small values come back inline; values above the configured inline
/// threshold come back as a [`ValueHandle`] to stream from the object store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// The value bytes, inlined.
    Bytes(Vec<u8>),
    /// A streaming handle to a large value object.
    Handle(ValueHandle),
}

impl Value {
    /// The inline bytes, if this value was small enough to inline.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            Value::Handle(_) => None,
        }
    }

    /// The streaming handle, if the value was too large to inline.
    pub fn handle(&self) -> Option<&ValueHandle> {
        match self {
            Value::Bytes(_) => None,
            Value::Handle(handle) => Some(handle),
        }
    }
}

/// Streaming handle to a value object in the object store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueHandle {
    /// Id of the value object.
    pub object_id: ObjectId,
    /// Size of the value in bytes.
    pub size: u64,
}

/// An opaque handle naming an already-stored value object.
///
/// Returned by `create_reference` and accepted by `put_reference`, so large
/// values are streamed into the store once and bound to keys without
/// re-sending the bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reference {
    object_id: ObjectId,
}

impl Reference {
    /// Wrap an existing value object id as a reference.
    pub fn from_object_id(object_id: ObjectId) -> Self {
        Self { object_id }
    }

    /// The referenced object id.
    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }
}
