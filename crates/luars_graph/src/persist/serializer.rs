use std::collections::HashMap;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::lua_value::UserdataRef;
use crate::persist::{PersistResult, ValueReader, ValueWriter};

/// Save/load pair for a host object kind.
///
/// Only the name travels in the stream; the reading process must have a
/// serializer registered under the same name. Implementations should hand
/// out one shared `Rc` per kind so the stream records the name once.
///
/// Serialized bodies are never deferred. A body that writes further
/// userdata recurses natively, and a stream nested past the reader's
/// `max_read_depth` is rejected on read, so chains of userdata written
/// from `save` must stay shallow.
pub trait Serializer {
    fn name(&self) -> &str;

    fn save(&self, writer: &mut ValueWriter<'_>, value: &UserdataRef) -> PersistResult<()>;

    fn load(&self, reader: &mut ValueReader<'_>) -> PersistResult<UserdataRef>;
}

#[derive(Default)]
pub struct SerializerRegistry {
    serializers: HashMap<SmolStr, Rc<dyn Serializer>, ahash::RandomState>,
}

impl SerializerRegistry {
    /// Register `serializer` under its name, returning the one it replaces.
    pub fn register(&mut self, serializer: Rc<dyn Serializer>) -> Option<Rc<dyn Serializer>> {
        let name = SmolStr::new(serializer.name());
        self.serializers.insert(name, serializer)
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn Serializer>> {
        self.serializers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.serializers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.serializers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.serializers.is_empty()
    }
}
