//! Handles for addressable data items. The graph of data items (symbols, jump tables, reordered
//! blobs) is owned by the surrounding rewriter; this crate only ever holds back-references into it
//! and reads item geometry through the `DataGraph` trait.

/// An identifier for an addressable data item in the externally owned data graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataId(u32);

impl DataId {
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Geometry of an addressable data item, in terms of the input address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataItem {
    pub id: DataId,
    /// Address in the input binary.
    pub address: u64,
    pub size: u64,
}

impl DataItem {
    #[must_use]
    pub fn end_address(&self) -> u64 {
        self.address.saturating_add(self.size)
    }
}

/// Read-only access to the addressable-data graph. Established before section mutation starts and
/// never modified through this crate.
pub trait DataGraph {
    fn item(&self, id: DataId) -> Option<DataItem>;
}
