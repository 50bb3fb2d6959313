use serde::{Deserialize, Serialize};

/// Trait for entity references: typed `u32` indices into arenas.
pub trait EntityRef: Copy + Eq + std::hash::Hash + std::fmt::Debug {
    fn new(index: u32) -> Self;
    fn index(self) -> u32;
}

/// Define a typed entity reference (a newtype over `u32`).
///
/// ```ignore
/// define_entity!(TypeIndex);
/// ```
#[macro_export]
macro_rules! define_entity {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $crate::entity::EntityRef for $name {
            fn new(index: u32) -> Self {
                Self(index)
            }
            fn index(self) -> u32 {
                self.0
            }
        }

        impl $name {
            /// Slot 0, reserved for the null entry.
            pub const NULL: Self = Self(0);

            pub fn is_null(self) -> bool {
                self.0 == 0
            }

            pub fn as_usize(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

define_entity!(
    /// Index into a file's type table. Index 0 is the null type.
    TypeIndex
);

define_entity!(
    /// Index into a file's TagObject sequence. Index 0 is the null object.
    ObjectIndex
);

/// Raw integer stored in a pointer field inside DATA.
///
/// Only meaningful through [`crate::object::PointerTable::resolve`]; no
/// arithmetic is defined on it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointerLiteral(u64);

impl PointerLiteral {
    pub const NULL: Self = Self(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Indexed arena: append-only storage keyed by entity references.
///
/// Serializes as a plain `Vec<V>`; the key type is phantom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrimaryMap<K: EntityRef, V> {
    elems: Vec<V>,
    #[serde(skip)]
    _phantom: std::marker::PhantomData<K>,
}

impl<K: EntityRef, V> Default for PrimaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V> PrimaryMap<K, V> {
    pub fn new() -> Self {
        Self {
            elems: Vec::new(),
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            elems: Vec::with_capacity(cap),
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn push(&mut self, value: V) -> K {
        let key = K::new(self.elems.len() as u32);
        self.elems.push(value);
        key
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.elems.get(key.index() as usize)
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Whether `key` addresses an existing element.
    pub fn contains(&self, key: K) -> bool {
        (key.index() as usize) < self.elems.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.elems
            .iter()
            .enumerate()
            .map(|(i, v)| (K::new(i as u32), v))
    }

    pub fn as_slice(&self) -> &[V] {
        &self.elems
    }
}

impl<K: EntityRef, V> std::ops::Index<K> for PrimaryMap<K, V> {
    type Output = V;
    fn index(&self, key: K) -> &V {
        &self.elems[key.index() as usize]
    }
}

impl<K: EntityRef, V> std::ops::IndexMut<K> for PrimaryMap<K, V> {
    fn index_mut(&mut self, key: K) -> &mut V {
        &mut self.elems[key.index() as usize]
    }
}

/// Sparse side table keyed by entity references, e.g. per-object decode
/// results.
#[derive(Debug, Clone)]
pub struct SecondaryMap<K: EntityRef, V> {
    elems: Vec<Option<V>>,
    _phantom: std::marker::PhantomData<K>,
}

impl<K: EntityRef, V> Default for SecondaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V> SecondaryMap<K, V> {
    pub fn new() -> Self {
        Self {
            elems: Vec::new(),
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        let idx = key.index() as usize;
        if idx >= self.elems.len() {
            self.elems.resize_with(idx + 1, || None);
        }
        self.elems[idx] = Some(value);
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.elems
            .get(key.index() as usize)
            .and_then(|v| v.as_ref())
    }

    pub fn contains_key(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Present entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.elems
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (K::new(i as u32), v)))
    }

    /// Number of present entries.
    pub fn len(&self) -> usize {
        self.elems.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.iter().all(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_map_keys_follow_insertion() {
        let mut map: PrimaryMap<TypeIndex, &str> = PrimaryMap::new();
        assert_eq!(map.push("null"), TypeIndex::NULL);
        let leaf = map.push("Leaf");
        assert_eq!(leaf.as_usize(), 1);
        assert_eq!(map[leaf], "Leaf");
        assert!(!map.contains(TypeIndex::new(2)));
    }

    #[test]
    fn secondary_map_is_sparse() {
        let mut map: SecondaryMap<ObjectIndex, u8> = SecondaryMap::new();
        map.insert(ObjectIndex::new(3), 9);
        assert_eq!(map.len(), 1);
        assert!(!map.contains_key(ObjectIndex::new(1)));
        let present: Vec<_> = map.iter().collect();
        assert_eq!(present, vec![(ObjectIndex::new(3), &9)]);
    }

    #[test]
    fn entity_serializes_as_number() {
        let json = serde_json::to_string(&ObjectIndex::new(5)).unwrap();
        assert_eq!(json, "5");
    }
}
