use crate::error::Result;
use anyhow::bail;
use smallvec::SmallVec;

/// A literal byte overwrite against a section's original input contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Patch {
    pub offset: u64,
    /// Most patches are a word or less, so keep the common case inline.
    pub bytes: SmallVec<[u8; 8]>,
}

impl Patch {
    #[must_use]
    pub fn new(offset: u64, bytes: &[u8]) -> Self {
        Self {
            offset,
            bytes: SmallVec::from_slice(bytes),
        }
    }

    #[must_use]
    pub fn end_offset(&self) -> u64 {
        self.offset + self.bytes.len() as u64
    }
}

/// Strategy for materialising a section's queued patches into concrete output bytes at
/// finalisation time. The section entity stores the queue and the strategy handle, but patch
/// application semantics live entirely behind this trait.
pub trait Patcher {
    /// Produces the output bytes for a section whose original contents were `input`. Must fail if
    /// a patch falls outside the section.
    fn materialise(&mut self, input: &[u8], patches: &[Patch]) -> Result<Vec<u8>>;
}

/// The default strategy: apply each overwrite in queue order, later patches winning on overlap.
#[derive(Debug, Default)]
pub struct OverwritePatcher;

impl Patcher for OverwritePatcher {
    fn materialise(&mut self, input: &[u8], patches: &[Patch]) -> Result<Vec<u8>> {
        let mut out = input.to_vec();
        for patch in patches {
            let start = patch.offset as usize;
            let end = start + patch.bytes.len();
            if end > out.len() {
                bail!(
                    "Patch [0x{start:x}, 0x{end:x}) is out of range for section of size 0x{:x}",
                    out.len()
                );
            }
            out[start..end].copy_from_slice(&patch.bytes);
        }
        Ok(out)
    }
}
