use crate::data::DataId;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::ops::Range;

/// A single relocation record. Offsets are relative to the start of the owning section, in terms
/// of the original input address space. The target is a back-reference into the external data
/// graph; `None` means the computed value is the addend alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Relocation {
    pub offset: u64,
    pub target: Option<DataId>,
    /// Format-specific relocation type tag. Opaque to this crate.
    pub kind: u32,
    pub addend: i64,
    /// Cached resolved value, if the caller has already computed it.
    pub value: Option<u64>,
}

impl Relocation {
    #[must_use]
    pub fn new(offset: u64, target: Option<DataId>, kind: u32, addend: i64) -> Self {
        Self {
            offset,
            target,
            kind,
            addend,
            value: None,
        }
    }
}

/// An offset-ordered collection of relocations. Multiple records may share an offset, e.g. when
/// different relocation kinds are stacked at one location. Records at the same offset keep their
/// insertion order.
#[derive(Clone, Debug, Default)]
pub struct RelocationStore {
    by_offset: BTreeMap<u64, SmallVec<[Relocation; 1]>>,
    len: usize,
}

impl RelocationStore {
    pub fn add(&mut self, relocation: Relocation) {
        self.by_offset
            .entry(relocation.offset)
            .or_default()
            .push(relocation);
        self.len += 1;
    }

    /// Returns the first record at exactly `offset`, if any.
    #[must_use]
    pub fn find_at(&self, offset: u64) -> Option<&Relocation> {
        self.by_offset.get(&offset).and_then(|bucket| bucket.first())
    }

    /// Removes all records at exactly `offset`. Returns whether any existed.
    pub fn remove_at(&mut self, offset: u64) -> bool {
        match self.by_offset.remove(&offset) {
            Some(bucket) => {
                self.len -= bucket.len();
                true
            }
            None => false,
        }
    }

    /// Removes and returns the single first record at exactly `offset`. Later records at the same
    /// offset are retained.
    pub fn take_at(&mut self, offset: u64) -> Option<Relocation> {
        let bucket = self.by_offset.get_mut(&offset)?;
        let relocation = bucket.remove(0);
        if bucket.is_empty() {
            self.by_offset.remove(&offset);
        }
        self.len -= 1;
        Some(relocation)
    }

    /// Iterates over all records in ascending offset order.
    pub fn iter(&self) -> impl Iterator<Item = &Relocation> {
        self.by_offset.values().flatten()
    }

    /// Iterates over records whose offset falls within `range`, in ascending offset order.
    pub fn range(&self, range: Range<u64>) -> impl Iterator<Item = &Relocation> {
        self.by_offset.range(range).flat_map(|(_, bucket)| bucket)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.by_offset.clear();
        self.len = 0;
    }
}

impl<'a> IntoIterator for &'a RelocationStore {
    type Item = &'a Relocation;
    type IntoIter = std::iter::Flatten<
        std::collections::btree_map::Values<'a, u64, SmallVec<[Relocation; 1]>>,
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.by_offset.values().flatten()
    }
}

impl FromIterator<Relocation> for RelocationStore {
    fn from_iter<T: IntoIterator<Item = Relocation>>(iter: T) -> Self {
        let mut store = RelocationStore::default();
        for relocation in iter {
            store.add(relocation);
        }
        store
    }
}
