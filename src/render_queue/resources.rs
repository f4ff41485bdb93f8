//! State shared by every pass of a render queue: the texture cache and the data store.

use crate::texture::TextureRef;
use std::any::Any;
use std::collections::HashMap;

/// Maps logical output ids to the texture bound to them.
///
/// Entries are created lazily the first time a pass requests an id and live as
/// long as the owning [`RenderQueue`](super::RenderQueue). A bound texture is
/// resized in place on later use, never replaced by the queue itself.
#[derive(Default)]
pub struct ResourceCache {
    textures: HashMap<String, TextureRef>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&TextureRef> {
        self.textures.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.textures.contains_key(id)
    }

    /// Bind `texture` to `id`, returning the texture previously bound to it.
    pub fn insert(&mut self, id: impl Into<String>, texture: TextureRef) -> Option<TextureRef> {
        self.textures.insert(id.into(), texture)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.textures.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TextureRef)> {
        self.textures.iter().map(|(id, texture)| (id.as_str(), texture))
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.textures.iter().map(|(id, texture)| (id, texture.borrow().size())))
            .finish()
    }
}

/// Arbitrary values forwarded between passes and across runs.
#[derive(Default)]
pub struct DataStore {
    values: HashMap<String, Box<dyn Any>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value regardless of its type.
    pub fn insert<T: Any>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Typed read. `None` when the key is absent or holds a different type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|value| value.downcast_ref())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|value| value.downcast_mut())
    }

    /// Typed read that inserts `default()` first when the key is absent.
    ///
    /// Returns `None` only when the key already holds a value of another type.
    pub fn get_or_insert_with<T: Any>(&mut self, key: &str, default: impl FnOnce() -> T) -> Option<&mut T> {
        self.values
            .entry(key.to_owned())
            .or_insert_with(|| Box::new(default()))
            .downcast_mut()
    }

    pub fn remove(&mut self, key: &str) -> Option<Box<dyn Any>> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::Texture;
    use std::rc::Rc;

    #[test]
    fn data_store_is_typed() {
        let mut data = DataStore::new();
        data.insert("frame", 3u32);

        assert_eq!(data.get::<u32>("frame"), Some(&3));
        assert_eq!(data.get::<f32>("frame"), None);
        assert_eq!(data.get::<u32>("missing"), None);

        *data.get_mut::<u32>("frame").unwrap() += 1;
        assert_eq!(data.get::<u32>("frame"), Some(&4));
    }

    #[test]
    fn get_or_insert_with_respects_existing_type() {
        let mut data = DataStore::new();
        for _ in 0..2 {
            *data.get_or_insert_with("hits", || 0usize).unwrap() += 1;
        }
        assert_eq!(data.get::<usize>("hits"), Some(&2));

        assert!(data.get_or_insert_with("hits", || "text").is_none());
    }

    #[test]
    fn cache_insert_returns_previous_binding() {
        let mut cache = ResourceCache::new();
        let first = Texture::depth(8, 8).into_ref();
        let second = Texture::depth(8, 8).into_ref();

        assert!(cache.insert("depth", first.clone()).is_none());
        let previous = cache.insert("depth", second.clone()).unwrap();
        assert!(Rc::ptr_eq(&previous, &first));
        assert!(Rc::ptr_eq(cache.get("depth").unwrap(), &second));
        assert_eq!(cache.len(), 1);
    }
}
