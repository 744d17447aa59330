//! Descriptor-keyed reuse pools for backing objects.
//!
//! Freed objects are never returned to the device here; they sit on a
//! free-list keyed by their canonical descriptor, tagged with the frame that
//! freed them, until either a later frame reuses them or an explicit
//! `collect_garbage` destroys them.

use crate::{
    device::{BufferDesc, BufferId, Device, TextureDesc, TextureId, TextureViewId, TextureViewKey},
    node::ResourceTags,
    resource_state::ResourceState,
};
use fxhash::FxHashMap;
use std::{collections::VecDeque, hash::Hash};
use tracing::debug;

/// Descriptor acting as a pooling key for one class of device object.
pub(crate) trait PoolKey: Clone + Eq + Hash {
    type Id: Copy;

    fn create(&self, device: &dyn Device, name: &str) -> Self::Id;
    fn destroy(device: &dyn Device, id: Self::Id);
}

impl PoolKey for TextureDesc {
    type Id = TextureId;

    fn create(&self, device: &dyn Device, name: &str) -> TextureId {
        device.create_texture(name, self)
    }

    fn destroy(device: &dyn Device, id: TextureId) {
        device.destroy_texture(id);
    }
}

impl PoolKey for BufferDesc {
    type Id = BufferId;

    fn create(&self, device: &dyn Device, name: &str) -> BufferId {
        device.create_buffer(name, self)
    }

    fn destroy(device: &dyn Device, id: BufferId) {
        device.destroy_buffer(id);
    }
}

impl PoolKey for TextureViewKey {
    type Id = TextureViewId;

    fn create(&self, device: &dyn Device, _name: &str) -> TextureViewId {
        device.create_texture_view(self.texture, &self.desc)
    }

    fn destroy(device: &dyn Device, id: TextureViewId) {
        device.destroy_texture_view(id);
    }
}

struct PoolEntry<Id> {
    id: Id,
    /// Frame index during which the object was returned to the pool.
    frame_freed: u64,
    tags: ResourceTags,
    /// State the object was left in when freed; becomes the reuser's
    /// initial state.
    last_state: ResourceState,
}

pub(crate) struct ResourcePool<K: PoolKey> {
    free: FxHashMap<K, VecDeque<PoolEntry<K::Id>>>,
}

impl<K: PoolKey> Default for ResourcePool<K> {
    fn default() -> Self {
        ResourcePool {
            free: FxHashMap::default(),
        }
    }
}

impl<K: PoolKey> ResourcePool<K> {
    /// Pops a compatible freed object or creates a new one. Non-dynamic
    /// entries are only handed out once the frame that freed them has
    /// retired on the device; `DYNAMIC`-tagged entries may be reused the
    /// moment they are freed.
    pub(crate) fn allocate(
        &mut self,
        device: &dyn Device,
        key: &K,
        name: &str,
        latest_finished: u64,
    ) -> (K::Id, ResourceState) {
        if let Some(queue) = self.free.get_mut(key) {
            let reusable = queue
                .iter()
                .position(|e| e.tags.contains(ResourceTags::DYNAMIC) || e.frame_freed <= latest_finished);
            if let Some(index) = reusable {
                let entry = queue.remove(index).unwrap();
                return (entry.id, entry.last_state);
            }
        }
        debug!(name, "pool miss, creating a new device object");
        (key.create(device, name), ResourceState::UNDEFINED)
    }

    /// Returns an object to the pool, tagged with the frame that freed it.
    pub(crate) fn deallocate(&mut self, key: K, id: K::Id, last_state: ResourceState, tags: ResourceTags, frame: u64) {
        self.free.entry(key).or_default().push_back(PoolEntry {
            id,
            frame_freed: frame,
            tags,
            last_state,
        });
    }

    /// Destroys every pooled entry freed at or before `critical_frame` whose
    /// tags intersect `with_tags` and avoid `without_tags`. Returns the
    /// number of objects released to the device.
    pub(crate) fn collect_garbage(
        &mut self,
        device: &dyn Device,
        critical_frame: u64,
        with_tags: ResourceTags,
        without_tags: ResourceTags,
    ) -> usize {
        let mut freed = 0;
        for queue in self.free.values_mut() {
            queue.retain(|entry| {
                let matches = entry.frame_freed <= critical_frame
                    && entry.tags.intersects(with_tags)
                    && !entry.tags.intersects(without_tags);
                if matches {
                    K::destroy(device, entry.id);
                    freed += 1;
                }
                !matches
            });
        }
        self.free.retain(|_, queue| !queue.is_empty());
        freed
    }

    /// Destroys everything. Used when tearing the graph down.
    pub(crate) fn drain(&mut self, device: &dyn Device) {
        for (_, queue) in self.free.drain() {
            for entry in queue {
                K::destroy(device, entry.id);
            }
        }
    }
}
