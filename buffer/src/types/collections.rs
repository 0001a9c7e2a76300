//! Codec implementations for sequences, maps and sets.
//!
//! Every collection is written as a `u32` element count followed by each element. Maps
//! write each entry as its key followed by its value. Counts are bounded by
//! [Limits::max_elements] and decoded maps and sets reject duplicate keys.

use crate::{
    codec::{read_len, write_len, LENGTH_PREFIX_SIZE},
    Buffer, EncodeSize, Error, Limits, Mode, Read, Write,
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, LinkedList, VecDeque},
    hash::{BuildHasher, Hash},
};

/// Writes a count prefix followed by every item.
#[inline]
fn write_seq<'i, T: Write + 'i, M: Mode>(
    buf: &mut Buffer<'_, M>,
    len: usize,
    items: impl IntoIterator<Item = &'i T>,
) -> Result<(), Error> {
    write_len(buf, len)?;
    for item in items {
        item.write_to(buf)?;
    }
    Ok(())
}

#[inline]
fn seq_size<'i, T: EncodeSize + 'i>(items: impl IntoIterator<Item = &'i T>) -> usize {
    LENGTH_PREFIX_SIZE + items.into_iter().map(EncodeSize::encode_size).sum::<usize>()
}

/// Reads a count prefix and returns a capacity hint that an attacker cannot inflate past
/// the bytes actually available.
#[inline]
fn read_count<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<(usize, usize), Error> {
    let len = read_len(buf, limits.max_elements)?;
    Ok((len, len.min(buf.data_size())))
}

impl<T: Write> Write for [T] {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        write_seq(buf, self.len(), self)
    }
}

impl<T: EncodeSize> EncodeSize for [T] {
    #[inline]
    fn encode_size(&self) -> usize {
        seq_size(self)
    }
}

// Vec implementation
impl<T: Write> Write for Vec<T> {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        self.as_slice().write_to(buf)
    }
}

impl<T: EncodeSize> EncodeSize for Vec<T> {
    #[inline]
    fn encode_size(&self) -> usize {
        self.as_slice().encode_size()
    }
}

impl<T: Read> Read for Vec<T> {
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
        let (len, hint) = read_count(buf, limits)?;
        let mut vec = Vec::with_capacity(hint);
        for _ in 0..len {
            vec.push(T::read_cfg(buf, limits)?);
        }
        Ok(vec)
    }
}

// VecDeque implementation
impl<T: Write> Write for VecDeque<T> {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        write_seq(buf, self.len(), self)
    }
}

impl<T: EncodeSize> EncodeSize for VecDeque<T> {
    #[inline]
    fn encode_size(&self) -> usize {
        seq_size(self)
    }
}

impl<T: Read> Read for VecDeque<T> {
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
        let (len, hint) = read_count(buf, limits)?;
        let mut deque = VecDeque::with_capacity(hint);
        for _ in 0..len {
            deque.push_back(T::read_cfg(buf, limits)?);
        }
        Ok(deque)
    }
}

// LinkedList implementation
impl<T: Write> Write for LinkedList<T> {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        write_seq(buf, self.len(), self)
    }
}

impl<T: EncodeSize> EncodeSize for LinkedList<T> {
    #[inline]
    fn encode_size(&self) -> usize {
        seq_size(self)
    }
}

impl<T: Read> Read for LinkedList<T> {
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
        let (len, _) = read_count(buf, limits)?;
        let mut list = LinkedList::new();
        for _ in 0..len {
            list.push_back(T::read_cfg(buf, limits)?);
        }
        Ok(list)
    }
}

// BTreeSet implementation
impl<T: Write> Write for BTreeSet<T> {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        write_seq(buf, self.len(), self)
    }
}

impl<T: EncodeSize> EncodeSize for BTreeSet<T> {
    #[inline]
    fn encode_size(&self) -> usize {
        seq_size(self)
    }
}

impl<T: Read + Ord> Read for BTreeSet<T> {
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
        let (len, _) = read_count(buf, limits)?;
        let mut set = BTreeSet::new();
        for _ in 0..len {
            if !set.insert(T::read_cfg(buf, limits)?) {
                return Err(Error::InvalidData("BTreeSet", "duplicate item"));
            }
        }
        Ok(set)
    }
}

// HashSet implementation
impl<T: Write, S> Write for HashSet<T, S> {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        write_seq(buf, self.len(), self)
    }
}

impl<T: EncodeSize, S> EncodeSize for HashSet<T, S> {
    #[inline]
    fn encode_size(&self) -> usize {
        seq_size(self)
    }
}

impl<T: Read + Eq + Hash, S: BuildHasher + Default> Read for HashSet<T, S> {
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
        let (len, hint) = read_count(buf, limits)?;
        let mut set = HashSet::with_capacity_and_hasher(hint, S::default());
        for _ in 0..len {
            if !set.insert(T::read_cfg(buf, limits)?) {
                return Err(Error::InvalidData("HashSet", "duplicate item"));
            }
        }
        Ok(set)
    }
}

// BTreeMap implementation
impl<K: Write, V: Write> Write for BTreeMap<K, V> {
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        write_len(buf, self.len())?;
        for (key, value) in self {
            key.write_to(buf)?;
            value.write_to(buf)?;
        }
        Ok(())
    }
}

impl<K: EncodeSize, V: EncodeSize> EncodeSize for BTreeMap<K, V> {
    fn encode_size(&self) -> usize {
        LENGTH_PREFIX_SIZE
            + self
                .iter()
                .map(|(key, value)| key.encode_size() + value.encode_size())
                .sum::<usize>()
    }
}

impl<K: Read + Ord, V: Read> Read for BTreeMap<K, V> {
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
        let (len, _) = read_count(buf, limits)?;
        let mut map = BTreeMap::new();
        for _ in 0..len {
            let key = K::read_cfg(buf, limits)?;
            let value = V::read_cfg(buf, limits)?;
            if map.insert(key, value).is_some() {
                return Err(Error::InvalidData("BTreeMap", "duplicate key"));
            }
        }
        Ok(map)
    }
}

// HashMap implementation
impl<K: Write, V: Write, S> Write for HashMap<K, V, S> {
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        write_len(buf, self.len())?;
        for (key, value) in self {
            key.write_to(buf)?;
            value.write_to(buf)?;
        }
        Ok(())
    }
}

impl<K: EncodeSize, V: EncodeSize, S> EncodeSize for HashMap<K, V, S> {
    fn encode_size(&self) -> usize {
        LENGTH_PREFIX_SIZE
            + self
                .iter()
                .map(|(key, value)| key.encode_size() + value.encode_size())
                .sum::<usize>()
    }
}

impl<K: Read + Eq + Hash, V: Read, S: BuildHasher + Default> Read for HashMap<K, V, S> {
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
        let (len, hint) = read_count(buf, limits)?;
        let mut map = HashMap::with_capacity_and_hasher(hint, S::default());
        for _ in 0..len {
            let key = K::read_cfg(buf, limits)?;
            let value = V::read_cfg(buf, limits)?;
            if map.insert(key, value).is_some() {
                return Err(Error::InvalidData("HashMap", "duplicate key"));
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Buffer, Decode, Encode, EncodeSize, Error, Limits};
    use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, LinkedList, VecDeque};

    #[test]
    fn test_vec() {
        for value in [vec![], vec![1u32], vec![1u32, 2, 3]] {
            let encoded = value.encode();
            assert_eq!(encoded.len(), 4 + 4 * value.len());
            assert_eq!(&encoded[..4], &(value.len() as u32).to_le_bytes());
            assert_eq!(Vec::<u32>::decode(&encoded).unwrap(), value);
        }
    }

    #[test]
    fn test_vec_too_long() {
        let value = vec![0u8; 65537];
        let err = Vec::<u8>::decode(&value.encode()).unwrap_err();
        assert_eq!(err, Error::LengthExceeded(65537, 65536));
        assert!(err.is_malformed());

        // A hostile count is rejected before any element is read
        let mut encoded = 65536u32.to_le_bytes().to_vec();
        encoded.push(1);
        assert!(matches!(
            Vec::<u64>::decode(&encoded),
            Err(Error::EndOfBuffer { .. })
        ));
    }

    #[test]
    fn test_nested_vec() {
        let value = vec![vec!["a".to_string()], vec![], vec!["b".into(), "cd".into()]];
        let encoded = value.encode();
        assert_eq!(encoded.len(), value.encode_size());
        assert_eq!(Vec::<Vec<String>>::decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_deque_and_list() {
        let deque: VecDeque<i16> = [-1, 0, 1].into_iter().collect();
        let encoded = deque.encode();
        assert_eq!(VecDeque::<i16>::decode(&encoded).unwrap(), deque);

        // Sequences share a wire format
        let list = LinkedList::<i16>::decode(&encoded).unwrap();
        assert_eq!(list.into_iter().collect::<Vec<_>>(), vec![-1, 0, 1]);
        assert_eq!(Vec::<i16>::decode(&encoded).unwrap(), vec![-1, 0, 1]);
    }

    #[test]
    fn test_maps() {
        let btree = BTreeMap::from([(1u8, "one".to_string()), (2, "two".to_string())]);
        let encoded = btree.encode();
        assert_eq!(encoded.len(), 4 + 2 * (1 + 4 + 3));
        assert_eq!(BTreeMap::<u8, String>::decode(&encoded).unwrap(), btree);

        let hash: HashMap<u8, String> = btree.clone().into_iter().collect();
        let encoded = hash.encode();
        assert_eq!(encoded.len(), hash.encode_size());
        assert_eq!(HashMap::<u8, String>::decode(&encoded).unwrap(), hash);
    }

    #[test]
    fn test_sets() {
        let btree = BTreeSet::from([5u64, 1, 3]);
        let encoded = btree.encode();
        assert_eq!(BTreeSet::<u64>::decode(&encoded).unwrap(), btree);

        let hash: HashSet<u64> = btree.iter().copied().collect();
        assert_eq!(HashSet::<u64>::decode(&hash.encode()).unwrap(), hash);
    }

    #[test]
    fn test_duplicate_keys() {
        let mut buf = Buffer::new(32);
        buf.write(&2u32).unwrap();
        buf.write(&(7u8, 1u8)).unwrap();
        buf.write(&(7u8, 2u8)).unwrap();
        let encoded = buf.into_vec();
        assert_eq!(
            BTreeMap::<u8, u8>::decode(&encoded),
            Err(Error::InvalidData("BTreeMap", "duplicate key"))
        );
        assert_eq!(
            HashMap::<u8, u8>::decode(&encoded),
            Err(Error::InvalidData("HashMap", "duplicate key"))
        );
        let duplicate_items = vec![4u16, 4].encode();
        assert!(BTreeSet::<u16>::decode(&duplicate_items).is_err());
        assert!(HashSet::<u16>::decode(&duplicate_items).is_err());
    }

    #[test]
    fn test_custom_limits() {
        let limits = Limits::new(8192, 2);
        let encoded = vec![1u8, 2, 3].encode();
        assert_eq!(
            Vec::<u8>::decode_cfg(&encoded, &limits),
            Err(Error::LengthExceeded(3, 2))
        );
        let mut buf = Buffer::wrap_read_only(&encoded).with_limits(limits);
        assert!(buf.read::<Vec<u8>>().is_err());
        assert_eq!(buf.rpos(), 0);
    }
}
