//! Content fingerprinting for addressable data items. An item's representation may embed
//! references to other items through relocations, so the fingerprint recurses through the data
//! graph with a memo cache that doubles as the cycle breaker.

use crate::data::DataGraph;
use crate::data::DataId;
use crate::data::DataItem;
use crate::section::Section;
use ahash::AHashMap;
use std::hash::BuildHasher;
use std::hash::Hasher;

/// Memo cache mapping item identity to fingerprint. Caller-owned so that fingerprints computed
/// across many items of one section share work.
pub type FingerprintCache = AHashMap<DataId, u64>;

pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = foldhash::fast::FixedState::default().build_hasher();
    hasher.write(bytes);
    hasher.finish()
}

fn hash_combine(a: u64, b: u64) -> u64 {
    let mut hasher = foldhash::fast::FixedState::default().build_hasher();
    hasher.write_u64(a);
    hasher.write_u64(b);
    hasher.finish()
}

/// Computes a fingerprint of `item`'s byte representation within `section`. Bytes between
/// relocations are hashed directly; at each relocation the target item's fingerprint is
/// substituted, so two items with identical bytes but different targets hash differently.
///
/// The cache is consulted before recursing into a referenced item. An item that is already being
/// computed resolves to its seed value, so self-referential item graphs terminate with a
/// deterministic result.
pub fn fingerprint(
    section: &Section,
    graph: &impl DataGraph,
    item: DataItem,
    cache: &mut FingerprintCache,
) -> u64 {
    if let Some(&hash) = cache.get(&item.id) {
        return hash;
    }

    // Seed from the item's shape before recursing. Cycles back into this item observe the seed.
    let base = hash_combine(item.size, hash_bytes(section.name().as_bytes()));
    cache.insert(item.id, base);

    if !section.contains_range(item.address, item.size) {
        return base;
    }

    let start = item.address - section.address();
    let end = start + item.size;
    let contents = section.addressed_contents();
    // Virtual sections (and synthetic zero-padded tails) carry no bytes for the range.
    if (contents.len() as u64) < end {
        return base;
    }

    let mut hash = base;
    let mut pos = start as usize;
    for relocation in section.relocations().range(start..end) {
        hash = hash_combine(hash, hash_bytes(&contents[pos..relocation.offset as usize]));
        if let Some(target) = relocation.target {
            if let Some(target_item) = graph.item(target) {
                hash = hash_combine(hash, fingerprint(section, graph, target_item, cache));
            }
        }
        pos = relocation.offset as usize;
    }
    hash = hash_combine(hash, hash_bytes(&contents[pos..end as usize]));

    cache.insert(item.id, hash);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Alignment;
    use crate::elf::SectionFlags;
    use crate::elf::sht;
    use crate::relocation::Relocation;
    use crate::section::InputSectionInfo;
    use crate::section::SectionCounter;

    struct MapGraph(AHashMap<DataId, DataItem>);

    impl MapGraph {
        fn new(items: &[DataItem]) -> Self {
            Self(items.iter().map(|item| (item.id, *item)).collect())
        }
    }

    impl DataGraph for MapGraph {
        fn item(&self, id: DataId) -> Option<DataItem> {
            self.0.get(&id).copied()
        }
    }

    fn section_with_bytes(bytes: &'static [u8], counter: &mut SectionCounter) -> Section<'static> {
        let info = InputSectionInfo {
            name: ".data".to_owned(),
            address: 0x1000,
            size: bytes.len() as u64,
            alignment: 1,
            ty: sht::PROGBITS,
            flags: SectionFlags::for_section(false, false, true),
            file_offset: 0,
        };
        Section::from_input(info, counter, || Ok(bytes)).unwrap()
    }

    fn item(id: u32, address: u64, size: u64) -> DataItem {
        DataItem {
            id: DataId::new(id),
            address,
            size,
        }
    }

    #[test]
    fn identical_graphs_hash_identically() {
        let mut counter = SectionCounter::default();
        let a = section_with_bytes(&[1, 2, 3, 4, 5, 6, 7, 8], &mut counter);
        let b = section_with_bytes(&[1, 2, 3, 4, 5, 6, 7, 8], &mut counter);
        let graph = MapGraph::new(&[item(1, 0x1000, 8)]);

        let hash_a = fingerprint(&a, &graph, item(1, 0x1000, 8), &mut FingerprintCache::new());
        let hash_b = fingerprint(&b, &graph, item(1, 0x1000, 8), &mut FingerprintCache::new());
        assert_eq!(hash_a, hash_b);
    }

    #[test]
    fn byte_difference_changes_fingerprint() {
        let mut counter = SectionCounter::default();
        let a = section_with_bytes(&[1, 2, 3, 4, 5, 6, 7, 8], &mut counter);
        let b = section_with_bytes(&[1, 2, 3, 4, 5, 6, 7, 9], &mut counter);
        let graph = MapGraph::new(&[]);

        let hash_a = fingerprint(&a, &graph, item(1, 0x1000, 8), &mut FingerprintCache::new());
        let hash_b = fingerprint(&b, &graph, item(1, 0x1000, 8), &mut FingerprintCache::new());
        assert_ne!(hash_a, hash_b);
    }

    #[test]
    fn target_difference_changes_fingerprint() {
        let mut counter = SectionCounter::default();
        let mut a = section_with_bytes(&[0; 16], &mut counter);
        let mut b = section_with_bytes(&[0; 16], &mut counter);
        a.add_relocation(Relocation::new(4, Some(DataId::new(2)), 1, 0));
        b.add_relocation(Relocation::new(4, Some(DataId::new(3)), 1, 0));

        // The two targets differ only in size, which feeds their seed hashes.
        let graph = MapGraph::new(&[item(2, 0x2000, 8), item(3, 0x2000, 12)]);
        let hash_a = fingerprint(&a, &graph, item(1, 0x1000, 16), &mut FingerprintCache::new());
        let hash_b = fingerprint(&b, &graph, item(1, 0x1000, 16), &mut FingerprintCache::new());
        assert_ne!(hash_a, hash_b);
    }

    #[test]
    fn synthetic_sections_hash_their_owned_contents() {
        let mut counter = SectionCounter::default();
        let make = |bytes: Vec<u8>, counter: &mut SectionCounter| {
            Section::synthetic(
                ".synth",
                bytes,
                8,
                Alignment::new(1).unwrap(),
                sht::PROGBITS,
                SectionFlags::for_section(true, false, true),
                counter,
            )
        };
        let a = make(vec![1, 2, 3, 4, 5, 6, 7, 8], &mut counter);
        let b = make(vec![1, 2, 3, 4, 5, 6, 7, 9], &mut counter);
        let graph = MapGraph::new(&[]);

        let hash_a = fingerprint(&a, &graph, item(1, 0, 8), &mut FingerprintCache::new());
        let hash_b = fingerprint(&b, &graph, item(1, 0, 8), &mut FingerprintCache::new());
        assert_ne!(hash_a, hash_b);
    }

    #[test]
    fn virtual_sections_hash_by_shape_only() {
        let mut counter = SectionCounter::default();
        let info = InputSectionInfo {
            name: ".bss".to_owned(),
            address: 0x1000,
            size: 16,
            alignment: 1,
            ty: sht::NOBITS,
            flags: SectionFlags::for_section(false, false, true),
            file_offset: 0,
        };
        let section = Section::from_input(info, &mut counter, || Ok(&[])).unwrap();
        let graph = MapGraph::new(&[]);

        let first = fingerprint(&section, &graph, item(1, 0x1000, 8), &mut FingerprintCache::new());
        let second =
            fingerprint(&section, &graph, item(1, 0x1000, 8), &mut FingerprintCache::new());
        assert_eq!(first, second);
    }

    #[test]
    fn memo_cache_is_reused() {
        let mut counter = SectionCounter::default();
        let section = section_with_bytes(&[9; 8], &mut counter);
        let graph = MapGraph::new(&[]);
        let mut cache = FingerprintCache::new();

        let first = fingerprint(&section, &graph, item(1, 0x1000, 8), &mut cache);
        assert_eq!(cache.len(), 1);
        let second = fingerprint(&section, &graph, item(1, 0x1000, 8), &mut cache);
        assert_eq!(first, second);
    }

    #[test]
    fn cyclic_item_graph_terminates() {
        let mut counter = SectionCounter::default();
        let mut section = section_with_bytes(&[0; 16], &mut counter);
        // Item 1 covers [0x1000, 0x1008) and references item 2; item 2 covers [0x1008, 0x1010)
        // and references item 1.
        section.add_relocation(Relocation::new(0, Some(DataId::new(2)), 1, 0));
        section.add_relocation(Relocation::new(8, Some(DataId::new(1)), 1, 0));
        let graph = MapGraph::new(&[item(1, 0x1000, 8), item(2, 0x1008, 8)]);

        let first = fingerprint(&section, &graph, item(1, 0x1000, 8), &mut FingerprintCache::new());
        let second =
            fingerprint(&section, &graph, item(1, 0x1000, 8), &mut FingerprintCache::new());
        assert_eq!(first, second);
    }
}
