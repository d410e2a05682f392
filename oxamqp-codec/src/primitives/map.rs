use std::{
    cmp::Ordering,
    hash::{Hash, Hasher},
    marker::PhantomData,
};

use bytes::BytesMut;
use indexmap::{Equivalent, IndexMap};
use serde::{de, ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};

pub use indexmap::map::{IntoIter, Iter, IterMut, Keys, Values};

use crate::encode::{CompoundKind, CompoundWriter, Encode};

/// A polymorphic mapping from distinct keys to values that keeps insertion order
///
/// Two maps compare equal only if they hold the same entries in the same order, which keeps
/// `Eq`, `Ord` and `Hash` consistent with each other.
#[derive(Debug, Clone)]
pub struct OrderedMap<K, V>(IndexMap<K, V>);

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self(IndexMap::new())
    }
}

impl<K, V> OrderedMap<K, V> {
    /// Creates an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterator over the entries in insertion order
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.0.iter()
    }

    /// Mutable iterator over the entries in insertion order
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        self.0.iter_mut()
    }

    /// Iterator over the keys
    pub fn keys(&self) -> Keys<'_, K, V> {
        self.0.keys()
    }

    /// Iterator over the values
    pub fn values(&self) -> Values<'_, K, V> {
        self.0.values()
    }

    /// Borrows the inner `IndexMap`
    pub fn as_inner(&self) -> &IndexMap<K, V> {
        &self.0
    }

    /// Consumes the wrapper and returns the inner `IndexMap`
    pub fn into_inner(self) -> IndexMap<K, V> {
        self.0
    }
}

impl<K: Hash + Eq, V> OrderedMap<K, V> {
    /// Inserts an entry, returning the previous value of the key
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.0.insert(key, value)
    }

    /// Looks up a value by key
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.0.get(key)
    }

    /// Whether the map holds `key`
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.0.contains_key(key)
    }

    /// Removes an entry, preserving the order of the remaining ones
    pub fn shift_remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.0.shift_remove(key)
    }
}

impl<K, V> From<IndexMap<K, V>> for OrderedMap<K, V> {
    fn from(map: IndexMap<K, V>) -> Self {
        Self(map)
    }
}

impl<K: Hash + Eq, V> FromIterator<(K, V)> for OrderedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<K, V> IntoIterator for OrderedMap<K, V> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for OrderedMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.0.iter().eq(other.0.iter())
    }
}

impl<K: Eq, V: Eq> Eq for OrderedMap<K, V> {}

impl<K: PartialOrd, V: PartialOrd> PartialOrd for OrderedMap<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.iter().partial_cmp(other.0.iter())
    }
}

impl<K: Ord, V: Ord> Ord for OrderedMap<K, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.iter().cmp(other.0.iter())
    }
}

impl<K: Hash, V: Hash> Hash for OrderedMap<K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.0.len());
        for (k, v) in &self.0 {
            k.hash(state);
            v.hash(state);
        }
    }
}

impl<K: Encode, V: Encode> Encode for OrderedMap<K, V> {
    fn encode(&self, buf: &mut BytesMut) {
        let writer = CompoundWriter::begin(buf, CompoundKind::Map);
        for (k, v) in &self.0 {
            k.encode(buf);
            v.encode(buf);
        }
        writer.finish(buf, (self.0.len() * 2) as u32);
    }
}

impl<K: Serialize, V: Serialize> Serialize for OrderedMap<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            state.serialize_entry(k, v)?;
        }
        state.end()
    }
}

struct Visitor<K, V>(PhantomData<(K, V)>);

impl<'de, K, V> de::Visitor<'de> for Visitor<K, V>
where
    K: Deserialize<'de> + Hash + Eq,
    V: Deserialize<'de>,
{
    type Value = OrderedMap<K, V>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("map")
    }

    fn visit_map<A: de::MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = IndexMap::with_capacity(access.size_hint().unwrap_or(0).min(4096));
        while let Some((k, v)) = access.next_entry()? {
            map.insert(k, v);
        }
        Ok(OrderedMap(map))
    }
}

impl<'de, K, V> Deserialize<'de> for OrderedMap<K, V>
where
    K: Deserialize<'de> + Hash + Eq,
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(Visitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{from_slice, primitives::Symbol, to_bytes, Error, Value};

    #[test]
    fn empty_map_encodes_compact() {
        let map: OrderedMap<Symbol, Value> = OrderedMap::new();
        assert_eq!(&to_bytes(&map).unwrap()[..], &[0xc1, 0x01, 0x00]);
    }

    #[test]
    fn order_is_preserved() {
        let mut map = OrderedMap::new();
        map.insert(Symbol::from("z"), Value::UInt(1));
        map.insert(Symbol::from("a"), Value::UInt(2));
        let decoded: OrderedMap<Symbol, Value> = from_slice(&to_bytes(&map).unwrap()).unwrap();
        let keys: Vec<_> = decoded.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, ["z", "a"]);
    }

    #[test]
    fn odd_count_is_rejected() {
        let buf = [0xc1, 0x02, 0x01, 0x40];
        let err = from_slice::<OrderedMap<Value, Value>>(&buf).unwrap_err();
        assert_eq!(err, Error::LengthMismatch { offset: 0 });
    }
}
