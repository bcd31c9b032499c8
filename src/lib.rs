//! Section and relocation management for post-link binary rewriting.
//!
//! The surrounding rewriter parses the container format, resolves symbols and decides what to
//! patch; this crate owns the representation of each section of the image, the relocation and
//! patch bookkeeping against it, and the transition from input-mapped contents to finalised
//! output contents ready for layout and writing.

pub mod alignment;
pub mod data;
pub mod elf;
pub mod error;
pub mod hash;
pub mod ordering;
pub mod patch;
pub mod relocation;
pub mod reorder;
pub mod section;

pub use crate::alignment::Alignment;
pub use crate::data::DataGraph;
pub use crate::data::DataId;
pub use crate::data::DataItem;
pub use crate::elf::SectionFlags;
pub use crate::elf::SectionType;
pub use crate::patch::OverwritePatcher;
pub use crate::patch::Patch;
pub use crate::patch::Patcher;
pub use crate::relocation::Relocation;
pub use crate::relocation::RelocationStore;
pub use crate::reorder::reorder_contents;
pub use crate::section::CreationSequence;
pub use crate::section::InputSectionInfo;
pub use crate::section::Section;
pub use crate::section::SectionBytes;
pub use crate::section::SectionCounter;
