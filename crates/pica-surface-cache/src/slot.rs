//! Generation-checked arena.
//!
//! Removing an entry bumps its slot generation, so an id kept past the
//! lifetime of its value no longer resolves instead of aliasing whatever
//! reuses the slot.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::ops::{Index, IndexMut};

pub struct SlotId<K> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> K>,
}

impl<K> SlotId<K> {
    /// Never handed out by a [`SlotVector`].
    pub const NULL: Self = Self {
        index: u32::MAX,
        generation: 0,
        _marker: PhantomData,
    };

    pub const fn is_null(&self) -> bool {
        self.generation == 0
    }

    pub const fn index(&self) -> u32 {
        self.index
    }
}

impl<K> Default for SlotId<K> {
    fn default() -> Self {
        Self::NULL
    }
}

impl<K> Clone for SlotId<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for SlotId<K> {}

impl<K> PartialEq for SlotId<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<K> Eq for SlotId<K> {}

impl<K> Hash for SlotId<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<K> fmt::Debug for SlotId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("SlotId(null)")
        } else {
            write!(f, "SlotId({}v{})", self.index, self.generation)
        }
    }
}

pub enum SurfaceSlot {}
pub enum SamplerSlot {}
pub enum FramebufferSlot {}

pub type SurfaceId = SlotId<SurfaceSlot>;
pub type SamplerId = SlotId<SamplerSlot>;
pub type FramebufferId = SlotId<FramebufferSlot>;

struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

pub struct SlotVector<K, T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
    _marker: PhantomData<fn() -> K>,
}

impl<K, T> Default for SlotVector<K, T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
            _marker: PhantomData,
        }
    }
}

impl<K, T> SlotVector<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, value: T) -> SlotId<K> {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.value = Some(value);
            return SlotId {
                index,
                generation: entry.generation,
                _marker: PhantomData,
            };
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 1,
            value: Some(value),
        });
        SlotId {
            index,
            generation: 1,
            _marker: PhantomData,
        }
    }

    pub fn remove(&mut self, id: SlotId<K>) -> Option<T> {
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1).max(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(value)
    }

    pub fn contains(&self, id: SlotId<K>) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: SlotId<K>) -> Option<&T> {
        let entry = self.entries.get(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.value.as_ref()
    }

    pub fn get_mut(&mut self, id: SlotId<K>) -> Option<&mut T> {
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.value.as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId<K>, &T)> + '_ {
        self.entries.iter().enumerate().filter_map(|(index, entry)| {
            entry.value.as_ref().map(|value| {
                (
                    SlotId {
                        index: index as u32,
                        generation: entry.generation,
                        _marker: PhantomData,
                    },
                    value,
                )
            })
        })
    }

    pub fn ids(&self) -> Vec<SlotId<K>> {
        self.iter().map(|(id, _)| id).collect()
    }
}

impl<K, T> Index<SlotId<K>> for SlotVector<K, T> {
    type Output = T;

    fn index(&self, id: SlotId<K>) -> &T {
        match self.get(id) {
            Some(value) => value,
            None => panic!("stale slot id {id:?}"),
        }
    }
}

impl<K, T> IndexMut<SlotId<K>> for SlotVector<K, T> {
    fn index_mut(&mut self, id: SlotId<K>) -> &mut T {
        match self.get_mut(id) {
            Some(value) => value,
            None => panic!("stale slot id {id:?}"),
        }
    }
}
