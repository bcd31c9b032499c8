//! The section entity. A `Section` aggregates the identity, geometry and format bits of one
//! section of the input binary (or a synthetic one), the relocations and byte patches applied to
//! it, and the transition from input-mapped contents to finalised output contents.

use crate::alignment::Alignment;
use crate::data::DataId;
use crate::elf::SectionFlags;
use crate::elf::SectionType;
use crate::elf::shf;
use crate::elf::sht;
use crate::error::Result;
use crate::patch::OverwritePatcher;
use crate::patch::Patch;
use crate::patch::Patcher;
use crate::relocation::Relocation;
use crate::relocation::RelocationStore;
use anyhow::Context as _;
use anyhow::bail;
use std::fmt::Display;
use std::io::Read as _;
use std::io::Write;
use std::sync::Arc;

/// A view of section contents. The variant records who owns the memory, so release behaviour is
/// decided by the type rather than by pointer comparisons: dropping `Input` releases nothing,
/// dropping `Owned` frees the buffer once the last alias is gone.
#[derive(Clone, Debug)]
pub enum SectionBytes<'data> {
    /// Aliases memory mapped from the input file.
    Input(&'data [u8]),
    /// An independently owned buffer. The `Arc` is shared when a derived section aliases another
    /// section's finalised contents.
    Owned(Arc<[u8]>),
}

impl std::ops::Deref for SectionBytes<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self {
            SectionBytes::Input(bytes) => bytes,
            SectionBytes::Owned(bytes) => bytes,
        }
    }
}

/// Order in which a section was created. Used only as the final ordering tie-break.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CreationSequence(u64);

/// Allocates creation sequence numbers. Owned by whatever context constructs sections, so that
/// ordering tie-breaks don't depend on process-global state.
#[derive(Debug, Default)]
pub struct SectionCounter {
    next: u64,
}

impl SectionCounter {
    pub fn next_sequence(&mut self) -> CreationSequence {
        self.next += 1;
        CreationSequence(self.next)
    }
}

/// Geometry and format bits of a section as supplied by the container-format reader.
#[derive(Clone, Debug)]
pub struct InputSectionInfo {
    pub name: String,
    /// Address of the section in the input binary. May be 0.
    pub address: u64,
    pub size: u64,
    /// Raw alignment from the section header. 0 is accepted and means unconstrained.
    pub alignment: u64,
    pub ty: SectionType,
    pub flags: SectionFlags,
    /// Byte offset of the section's contents within the input file.
    pub file_offset: u64,
}

pub struct Section<'data> {
    name: String,
    output_name: String,
    address: u64,
    size: u64,
    input_file_offset: u64,
    alignment: Alignment,
    ty: SectionType,
    flags: SectionFlags,
    is_relro: bool,
    /// Whether the section came from a region of the input file, as opposed to being synthesised
    /// or derived from another section.
    from_input: bool,
    input_contents: SectionBytes<'data>,

    /// Relocations emitted with the section. Offsets are relative to the original section
    /// address and size.
    relocations: RelocationStore,
    /// Post-load relocations, also addressed against the original section.
    dynamic_relocations: RelocationStore,
    /// Deferred relocations against original input bytes, drained once by
    /// `flush_pending_relocations`.
    pending_relocations: Vec<Relocation>,

    patches: Vec<Patch>,
    patcher: Option<Box<dyn Patcher>>,

    is_finalised: bool,
    output_contents: Option<SectionBytes<'data>>,
    /// Size of the section in the rewritten binary. Can exceed the output contents, in which case
    /// the writer emits trailing zeros.
    output_size: u64,
    output_address: u64,
    output_file_offset: u64,
    /// Section index in the output file. 0 until assigned.
    index: u32,
    /// Opaque label used for address mapping by the memory-layout subsystem. Set at most once.
    section_id: Option<String>,
    creation_sequence: CreationSequence,
    is_reordered: bool,
    /// Excluded from the output name table.
    is_anonymous: bool,
    /// Excluded from the output file entirely.
    is_link_only: bool,
}

impl<'data> Section<'data> {
    /// Constructs a section from a region of the input file. `read_contents` is only invoked for
    /// sections that occupy file bytes; a read failure is unrecoverable and propagates to the
    /// caller so that no downstream logic ever sees undefined bytes.
    pub fn from_input(
        info: InputSectionInfo,
        counter: &mut SectionCounter,
        read_contents: impl FnOnce() -> Result<&'data [u8]>,
    ) -> Result<Self> {
        let contents: &'data [u8] = if info.ty == sht::NOBITS {
            &[]
        } else {
            let contents = read_contents()
                .with_context(|| format!("Cannot read contents of section `{}`", info.name))?;
            if contents.len() as u64 != info.size {
                bail!(
                    "Section `{}` has size 0x{:x} but 0x{:x} bytes of contents",
                    info.name,
                    info.size,
                    contents.len()
                );
            }
            contents
        };
        let alignment = Alignment::from_input(info.alignment)
            .with_context(|| format!("Section `{}`", info.name))?;

        tracing::debug!(section = %info.name, size = info.size, "load input section");

        Ok(Section {
            output_name: info.name.clone(),
            name: info.name,
            address: info.address,
            size: info.size,
            input_file_offset: info.file_offset,
            alignment,
            ty: info.ty,
            flags: info.flags,
            is_relro: false,
            from_input: true,
            input_contents: SectionBytes::Input(contents),
            relocations: RelocationStore::default(),
            dynamic_relocations: RelocationStore::default(),
            pending_relocations: Vec::new(),
            patches: Vec::new(),
            patcher: None,
            is_finalised: false,
            output_contents: None,
            output_size: 0,
            output_address: 0,
            output_file_offset: 0,
            index: 0,
            section_id: None,
            creation_sequence: counter.next_sequence(),
            is_reordered: false,
            is_anonymous: false,
            is_link_only: false,
        })
    }

    /// Constructs a synthetic section with no backing file region. The section is immediately
    /// finalised with `data` as its output contents. `size` may exceed the data length, in which
    /// case the writer pads with zeros (e.g. for zero-initialised growth).
    pub fn synthetic(
        name: impl Into<String>,
        data: Vec<u8>,
        size: u64,
        alignment: Alignment,
        ty: SectionType,
        flags: SectionFlags,
        counter: &mut SectionCounter,
    ) -> Self {
        let name = name.into();
        debug_assert!(size >= data.len() as u64);
        Section {
            output_name: name.clone(),
            name,
            address: 0,
            size,
            input_file_offset: 0,
            alignment,
            ty,
            flags,
            is_relro: false,
            from_input: false,
            input_contents: SectionBytes::Input(&[]),
            relocations: RelocationStore::default(),
            dynamic_relocations: RelocationStore::default(),
            pending_relocations: Vec::new(),
            patches: Vec::new(),
            patcher: None,
            is_finalised: true,
            output_contents: Some(SectionBytes::Owned(Arc::from(data))),
            output_size: size,
            output_address: 0,
            output_file_offset: 0,
            index: 0,
            section_id: None,
            creation_sequence: counter.next_sequence(),
            is_reordered: false,
            is_anonymous: false,
            is_link_only: false,
        }
    }

    /// Constructs a new section derived from an existing one, e.g. to relocate a note section
    /// under a new name. Contents are aliased, not copied; static and pending relocations carry
    /// over, dynamic relocations and layout state do not.
    pub fn derived(
        name: impl Into<String>,
        source: &Section<'data>,
        counter: &mut SectionCounter,
    ) -> Self {
        let name = name.into();
        Section {
            output_name: name.clone(),
            name,
            address: source.address,
            size: source.size,
            input_file_offset: 0,
            alignment: source.alignment,
            ty: source.ty,
            flags: source.flags,
            is_relro: false,
            from_input: false,
            input_contents: source.effective_contents().clone(),
            relocations: source.relocations.clone(),
            dynamic_relocations: RelocationStore::default(),
            pending_relocations: source.pending_relocations.clone(),
            patches: Vec::new(),
            patcher: None,
            is_finalised: false,
            output_contents: None,
            output_size: 0,
            output_address: 0,
            output_file_offset: 0,
            index: 0,
            section_id: None,
            creation_sequence: counter.next_sequence(),
            is_reordered: false,
            is_anonymous: false,
            is_link_only: false,
        }
    }

    /// The view a derived section should alias: finalised output if there is one, otherwise the
    /// input view.
    fn effective_contents(&self) -> &SectionBytes<'data> {
        self.output_contents.as_ref().unwrap_or(&self.input_contents)
    }

    /// The bytes addressed by the section's geometry: the input view for file-backed sections,
    /// the owned data for synthetic and derived ones. Virtual sections yield an empty slice.
    pub fn addressed_contents(&self) -> &[u8] {
        if self.from_input {
            &self.input_contents
        } else {
            self.effective_contents()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn set_output_name(&mut self, name: impl Into<String>) {
        self.output_name = name.into();
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    /// One past the last address of the section. Saturates rather than wrapping, since geometry
    /// comes straight from untrusted section headers.
    pub fn end_address(&self) -> u64 {
        self.address.saturating_add(self.size)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn input_file_offset(&self) -> u64 {
        self.input_file_offset
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    pub fn set_alignment(&mut self, alignment: Alignment) {
        self.alignment = alignment;
    }

    pub fn ty(&self) -> SectionType {
        self.ty
    }

    pub fn flags(&self) -> SectionFlags {
        self.flags
    }

    pub fn creation_sequence(&self) -> CreationSequence {
        self.creation_sequence
    }

    pub fn is_from_input(&self) -> bool {
        self.from_input
    }

    /// The section's contents as read from the input file. Empty for virtual sections and for
    /// synthetic ones.
    pub fn contents(&self) -> &[u8] {
        &self.input_contents
    }

    pub fn is_text(&self) -> bool {
        self.flags.contains(shf::EXECINSTR)
    }

    pub fn is_data(&self) -> bool {
        self.ty == sht::PROGBITS && self.flags.contains(shf::ALLOC.with(shf::WRITE))
    }

    pub fn is_bss(&self) -> bool {
        self.ty == sht::NOBITS && self.flags.contains(shf::ALLOC.with(shf::WRITE))
    }

    pub fn is_tls(&self) -> bool {
        self.flags.contains(shf::TLS)
    }

    pub fn is_tbss(&self) -> bool {
        self.is_bss() && self.is_tls()
    }

    /// Whether the section occupies no space in the input file.
    pub fn is_virtual(&self) -> bool {
        self.ty == sht::NOBITS
    }

    pub fn is_rela(&self) -> bool {
        self.ty == sht::RELA
    }

    pub fn is_relr(&self) -> bool {
        self.ty == sht::RELR
    }

    pub fn is_writable(&self) -> bool {
        self.flags.contains(shf::WRITE)
    }

    /// Whether the section occupies address space at load time. TLS BSS is the exception: the
    /// format marks it allocatable, but it consumes neither file bytes nor ordinary address
    /// space, so we treat it as not allocatable for layout purposes.
    pub fn is_allocatable(&self) -> bool {
        self.flags.contains(shf::ALLOC) && !self.is_tbss()
    }

    pub fn is_note(&self) -> bool {
        self.ty == sht::NOTE
    }

    pub fn is_relro(&self) -> bool {
        self.is_relro
    }

    pub fn set_relro(&mut self) {
        self.is_relro = true;
    }

    pub fn is_reordered(&self) -> bool {
        self.is_reordered
    }

    pub(crate) fn mark_reordered(&mut self) {
        self.is_reordered = true;
    }

    pub fn is_anonymous(&self) -> bool {
        self.is_anonymous
    }

    pub fn set_anonymous(&mut self, anonymous: bool) {
        self.is_anonymous = anonymous;
    }

    pub fn is_link_only(&self) -> bool {
        self.is_link_only
    }

    pub fn set_link_only(&mut self) {
        self.is_link_only = true;
    }

    /// Whether this section contains `address`, in terms of the original mapped binary. A
    /// zero-size section contains exactly its own start address, so that symbols can anchor at
    /// section boundaries.
    pub fn contains_address(&self, address: u64) -> bool {
        (self.address <= address && address < self.end_address())
            || (self.size == 0 && self.address == address)
    }

    /// Whether this section contains the range `[address, address + size)`, in terms of the
    /// original mapped binary. A range whose end overflows the address space is never contained.
    pub fn contains_range(&self, address: u64, size: u64) -> bool {
        match address.checked_add(size) {
            Some(end) => self.contains_address(address) && end <= self.end_address(),
            None => false,
        }
    }

    /// Adds a relocation to emit with the section.
    pub fn add_relocation(&mut self, relocation: Relocation) {
        assert!(
            relocation.offset < self.size,
            "relocation offset 0x{:x} not within section `{}` of size 0x{:x}",
            relocation.offset,
            self.name,
            self.size
        );
        self.relocations.add(relocation);
    }

    /// Adds a post-load relocation, addressed against the original section.
    pub fn add_dynamic_relocation(&mut self, relocation: Relocation) {
        assert!(
            relocation.offset < self.size,
            "relocation offset 0x{:x} not within section `{}` of size 0x{:x}",
            relocation.offset,
            self.name,
            self.size
        );
        self.dynamic_relocations.add(relocation);
    }

    /// Queues a relocation to be applied against the original contents of this section by
    /// `flush_pending_relocations`.
    pub fn add_pending_relocation(&mut self, relocation: Relocation) {
        self.pending_relocations.push(relocation);
    }

    pub fn relocations(&self) -> &RelocationStore {
        &self.relocations
    }

    pub fn dynamic_relocations(&self) -> &RelocationStore {
        &self.dynamic_relocations
    }

    pub fn has_relocations(&self) -> bool {
        !self.relocations.is_empty()
    }

    pub fn has_pending_relocations(&self) -> bool {
        !self.pending_relocations.is_empty()
    }

    pub fn relocation_at(&self, offset: u64) -> Option<&Relocation> {
        self.relocations.find_at(offset)
    }

    pub fn dynamic_relocation_at(&self, offset: u64) -> Option<&Relocation> {
        self.dynamic_relocations.find_at(offset)
    }

    /// Removes all non-pending relocations at `offset`. Returns whether any existed.
    pub fn remove_relocation_at(&mut self, offset: u64) -> bool {
        self.relocations.remove_at(offset)
    }

    /// Removes and returns the dynamic relocation at `offset`, if any.
    pub fn take_dynamic_relocation_at(&mut self, offset: u64) -> Option<Relocation> {
        self.dynamic_relocations.take_at(offset)
    }

    pub fn clear_relocations(&mut self) {
        self.relocations.clear();
    }

    /// Wholesale replacement of the static relocations. Only the reordering engine is allowed to
    /// shift relocation offsets, so this stays crate-private.
    pub(crate) fn replace_relocations(&mut self, relocations: RelocationStore) {
        self.relocations = relocations;
    }

    /// Queues a patch against the original input bytes of this section.
    pub fn add_patch(&mut self, offset: u64, bytes: &[u8]) {
        self.patches.push(Patch::new(offset, bytes));
    }

    /// Registers the patcher strategy for this section, replacing any previous one.
    pub fn register_patcher(&mut self, patcher: Box<dyn Patcher>) {
        self.patcher = Some(patcher);
    }

    pub fn patcher_mut(&mut self) -> Option<&mut (dyn Patcher + 'static)> {
        self.patcher.as_deref_mut()
    }

    /// Materialises the queued patches against the original input bytes and finalises the result
    /// as the section's output contents. Patch application semantics belong to the registered
    /// strategy; if none was registered, the plain overwrite strategy is used.
    pub fn finalise_patches(&mut self) -> Result {
        let patches = std::mem::take(&mut self.patches);
        let input: &[u8] = &self.input_contents;
        let output = match self.patcher.as_deref_mut() {
            Some(patcher) => patcher.materialise(input, &patches),
            None => OverwritePatcher.materialise(input, &patches),
        }
        .with_context(|| format!("Failed to patch section `{}`", self.name))?;
        self.update_contents(output);
        Ok(())
    }

    pub fn is_finalised(&self) -> bool {
        self.is_finalised
    }

    /// Replaces the section's output contents and finalises it. A previously owned output buffer
    /// that nothing else aliases is released here; input-backed views and buffers shared with
    /// derived sections are left alone, which falls naturally out of the ownership tag on
    /// `SectionBytes`.
    pub fn update_contents(&mut self, data: Vec<u8>) {
        self.output_size = data.len() as u64;
        self.output_contents = Some(SectionBytes::Owned(Arc::from(data)));
        self.is_finalised = true;
    }

    /// Replaces contents together with alignment and format bits, for sections whose shape
    /// changes entirely during rewriting.
    pub fn update(
        &mut self,
        data: Vec<u8>,
        alignment: Alignment,
        ty: SectionType,
        flags: SectionFlags,
    ) {
        self.alignment = alignment;
        self.ty = ty;
        self.flags = flags;
        self.update_contents(data);
    }

    /// Grows `output_size` by `padding` bytes without touching the contents. The writer emits
    /// zeros for the difference.
    pub fn add_padding(&mut self, padding: u64) {
        self.output_size += padding;
    }

    /// The section's finalised contents if it has been finalised, otherwise the input view.
    pub fn output_contents(&self) -> &[u8] {
        match &self.output_contents {
            Some(bytes) => bytes,
            None => &self.input_contents,
        }
    }

    pub fn output_size(&self) -> u64 {
        self.output_size
    }

    pub fn output_address(&self) -> u64 {
        self.output_address
    }

    pub fn output_file_offset(&self) -> u64 {
        self.output_file_offset
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn has_valid_index(&self) -> bool {
        self.index != 0
    }

    pub fn section_id(&self) -> Option<&str> {
        self.section_id.as_deref()
    }

    pub fn set_output_address(&mut self, address: u64) {
        self.output_address = address;
    }

    pub fn set_output_file_offset(&mut self, offset: u64) {
        self.output_file_offset = offset;
    }

    pub fn set_index(&mut self, index: u32) {
        self.index = index;
    }

    pub fn set_section_id(&mut self, id: impl Into<String>) {
        assert!(
            self.section_id.is_none(),
            "section id for `{}` set twice",
            self.name
        );
        self.section_id = Some(id.into());
    }

    /// Streams the finalised contents followed by zero padding up to `output_size`. Returns the
    /// number of bytes written, which always equals `output_size`.
    pub fn write(&self, out: &mut impl Write) -> Result<u64> {
        let contents = match &self.output_contents {
            Some(bytes) => &bytes[..],
            None => &[],
        };
        let padding = self
            .output_size
            .checked_sub(contents.len() as u64)
            .with_context(|| {
                format!("Output size of `{}` is smaller than its contents", self.name)
            })?;
        out.write_all(contents)?;
        std::io::copy(&mut std::io::repeat(0).take(padding), out)?;
        Ok(self.output_size)
    }

    /// Patches queued raw patches and pending relocations directly into `out`, the byte buffer
    /// for the whole output image, at the section's original file offset. Used for sections that
    /// keep their input contents rather than being re-emitted. Pending relocations are stored as
    /// 64-bit little-endian absolute values computed as `resolver(target) + addend`; the queues
    /// are drained, so this runs at most once per section.
    pub fn flush_pending_relocations(
        &mut self,
        out: &mut [u8],
        resolver: impl Fn(DataId) -> u64,
    ) -> Result {
        if self.pending_relocations.is_empty() && self.patches.is_empty() {
            return Ok(());
        }
        let name = self.name.clone();
        let file_offset = self.input_file_offset as usize;

        for patch in self.patches.drain(..) {
            let start = file_offset + patch.offset as usize;
            let end = start + patch.bytes.len();
            out.get_mut(start..end)
                .with_context(|| {
                    format!("Patch at offset 0x{:x} of `{name}` is out of range", patch.offset)
                })?
                .copy_from_slice(&patch.bytes);
        }

        for relocation in self.pending_relocations.drain(..) {
            let value = relocation
                .target
                .map_or(0, &resolver)
                .wrapping_add(relocation.addend as u64);
            let start = file_offset + relocation.offset as usize;
            out.get_mut(start..start + 8)
                .with_context(|| {
                    format!(
                        "Pending relocation at offset 0x{:x} of `{name}` is out of range",
                        relocation.offset
                    )
                })?
                .copy_from_slice(&value.to_le_bytes());
            tracing::trace!(section = %name, offset = relocation.offset, value, "flush pending relocation");
        }
        Ok(())
    }
}

/// Equality over the immutable input properties only. Output state is deliberately ignored, so a
/// finalised section still compares equal to its pre-finalisation self.
impl PartialEq for Section<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.address == other.address
            && self.size == other.size
            && self.contents() == other.contents()
            && self.alignment == other.alignment
            && self.ty == other.ty
            && self.flags == other.flags
    }
}

impl Eq for Section<'_> {}

impl std::fmt::Debug for Section<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Section")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("size", &self.size)
            .field("alignment", &self.alignment)
            .field("ty", &self.ty)
            .field("flags", &self.flags)
            .field("is_finalised", &self.is_finalised)
            .finish_non_exhaustive()
    }
}

impl Display for Section<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at 0x{:x}, size 0x{:x}, align {}, flags {}",
            self.name, self.address, self.size, self.alignment, self.flags
        )?;
        if self.is_finalised {
            write!(f, " -> 0x{:x}, output size 0x{:x}", self.output_address, self.output_size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataId;

    pub(crate) fn progbits_info(name: &str, address: u64, size: u64) -> InputSectionInfo {
        InputSectionInfo {
            name: name.to_owned(),
            address,
            size,
            alignment: 4,
            ty: sht::PROGBITS,
            flags: shf::ALLOC.with(shf::WRITE),
            file_offset: address,
        }
    }

    #[test]
    fn synthetic_round_trip() {
        let mut counter = SectionCounter::default();
        let bytes = vec![0xde, 0xad, 0xbe, 0xef];
        let section = Section::synthetic(
            ".made-up",
            bytes.clone(),
            4,
            Alignment::new(4).unwrap(),
            sht::PROGBITS,
            SectionFlags::for_section(true, false, true),
            &mut counter,
        );
        assert!(section.is_finalised());
        assert!(section.contents().is_empty());
        assert_eq!(section.output_contents(), bytes);
        let mut sink = Vec::new();
        assert_eq!(section.write(&mut sink).unwrap(), 4);
        assert_eq!(sink, bytes);
    }

    #[test]
    fn unreadable_contents_fail_construction() {
        let mut counter = SectionCounter::default();
        let result = Section::from_input(progbits_info(".data", 0x1000, 8), &mut counter, || {
            anyhow::bail!("truncated input file")
        });
        assert!(result.is_err());
    }

    #[test]
    fn short_read_fails_construction() {
        let mut counter = SectionCounter::default();
        let result =
            Section::from_input(progbits_info(".data", 0x1000, 8), &mut counter, || Ok(&[1; 4]));
        assert!(result.is_err());
    }

    #[test]
    fn virtual_sections_never_read_contents() {
        let mut counter = SectionCounter::default();
        let mut info = progbits_info(".bss", 0x2000, 64);
        info.ty = sht::NOBITS;
        let section = Section::from_input(info, &mut counter, || {
            anyhow::bail!("must not be called for NOBITS")
        })
        .unwrap();
        assert!(section.is_bss());
        assert!(section.contents().is_empty());
    }

    #[test]
    fn update_contents_and_padding() {
        let mut counter = SectionCounter::default();
        let mut section =
            Section::from_input(progbits_info(".data", 0x1000, 8), &mut counter, || Ok(&[1; 8]))
                .unwrap();
        section.update_contents(vec![7; 6]);
        assert!(section.is_finalised());
        assert_eq!(section.output_size(), 6);
        section.add_padding(10);
        assert_eq!(section.output_size(), 16);
        assert_eq!(section.output_contents(), &[7; 6]);

        let mut sink = Vec::new();
        assert_eq!(section.write(&mut sink).unwrap(), 16);
        assert_eq!(&sink[..6], &[7; 6]);
        assert_eq!(&sink[6..], &[0; 10]);
    }

    #[test]
    fn tbss_is_not_allocatable() {
        let mut counter = SectionCounter::default();
        let mut info = progbits_info(".tbss", 0x3000, 32);
        info.ty = sht::NOBITS;
        info.flags = shf::ALLOC.with(shf::WRITE).with(shf::TLS);
        let section = Section::from_input(info, &mut counter, || Ok(&[])).unwrap();
        assert!(section.is_tbss());
        assert!(section.is_tls());
        assert!(!section.is_allocatable());
    }

    #[test]
    fn zero_size_section_contains_its_start() {
        let mut counter = SectionCounter::default();
        let section =
            Section::from_input(progbits_info(".empty", 0x4000, 0), &mut counter, || Ok(&[]))
                .unwrap();
        assert!(section.contains_address(0x4000));
        assert!(!section.contains_address(0x4001));
        assert!(section.contains_range(0x4000, 0));
    }

    #[test]
    fn hostile_geometry_does_not_overflow() {
        let mut counter = SectionCounter::default();
        let mut info = progbits_info(".bad", u64::MAX - 4, 16);
        info.ty = sht::NOBITS;
        let section = Section::from_input(info, &mut counter, || Ok(&[])).unwrap();
        assert_eq!(section.end_address(), u64::MAX);
        assert!(section.contains_address(u64::MAX - 1));
        assert!(!section.contains_range(u64::MAX - 4, u64::MAX));
        assert!(!section.contains_range(0, u64::MAX));
    }

    #[test]
    #[should_panic(expected = "set twice")]
    fn section_id_can_only_be_set_once() {
        let mut counter = SectionCounter::default();
        let mut section =
            Section::from_input(progbits_info(".data", 0, 8), &mut counter, || Ok(&[0; 8]))
                .unwrap();
        section.set_section_id("a");
        section.set_section_id("b");
    }

    #[test]
    #[should_panic(expected = "not within section")]
    fn out_of_bounds_relocation_is_rejected() {
        let mut counter = SectionCounter::default();
        let mut section =
            Section::from_input(progbits_info(".data", 0, 8), &mut counter, || Ok(&[0; 8]))
                .unwrap();
        section.add_relocation(Relocation::new(8, None, 1, 0));
    }

    #[test]
    fn derived_section_aliases_contents() {
        let mut counter = SectionCounter::default();
        let mut source =
            Section::from_input(progbits_info(".note", 0x100, 4), &mut counter, || {
                Ok(&[1, 2, 3, 4])
            })
            .unwrap();
        source.add_relocation(Relocation::new(0, Some(DataId::new(1)), 2, 0));
        source.update_contents(vec![5, 6, 7, 8]);

        let derived = Section::derived(".note.moved", &source, &mut counter);
        assert_eq!(derived.name(), ".note.moved");
        assert_eq!(derived.contents(), &[5, 6, 7, 8]);
        assert!(!derived.is_from_input());
        assert!(!derived.is_finalised());
        assert!(derived.relocation_at(0).is_some());
        assert!(derived.creation_sequence() > source.creation_sequence());
    }

    #[test]
    fn flush_pending_relocations_patches_image() {
        let mut counter = SectionCounter::default();
        let mut info = progbits_info(".data", 0x1000, 16);
        info.file_offset = 32;
        let mut section =
            Section::from_input(info, &mut counter, || Ok(&[0; 16])).unwrap();
        section.add_patch(0, &[0xaa, 0xbb]);
        section.add_pending_relocation(Relocation::new(8, Some(DataId::new(3)), 1, 0x10));

        let mut image = vec![0u8; 64];
        section
            .flush_pending_relocations(&mut image, |_| 0x4000)
            .unwrap();
        assert_eq!(&image[32..34], &[0xaa, 0xbb]);
        assert_eq!(&image[40..48], &0x4010u64.to_le_bytes());
        assert!(!section.has_pending_relocations());

        // The queues drain, so a second flush is a no-op.
        let mut image2 = vec![0u8; 64];
        section
            .flush_pending_relocations(&mut image2, |_| 0x4000)
            .unwrap();
        assert_eq!(image2, vec![0u8; 64]);
    }

    #[test]
    fn registered_patcher_handles_finalisation() {
        struct FillPatcher(u8);

        impl Patcher for FillPatcher {
            fn materialise(&mut self, input: &[u8], patches: &[Patch]) -> Result<Vec<u8>> {
                let mut out = input.to_vec();
                for patch in patches {
                    out[patch.offset as usize..patch.end_offset() as usize].fill(self.0);
                }
                Ok(out)
            }
        }

        let mut counter = SectionCounter::default();
        let mut section =
            Section::from_input(progbits_info(".data", 0, 8), &mut counter, || Ok(&[0; 8]))
                .unwrap();
        section.register_patcher(Box::new(FillPatcher(0xcc)));
        assert!(section.patcher_mut().is_some());
        section.add_patch(2, &[1, 2, 3]);
        section.finalise_patches().unwrap();
        assert_eq!(section.output_contents(), &[0, 0, 0xcc, 0xcc, 0xcc, 0, 0, 0]);
    }

    // The end-to-end shape of the finalise-then-write path: patch, finalise, lay out, write.
    #[test]
    fn patch_finalise_and_write_scenario() {
        let mut counter = SectionCounter::default();
        let input = [0x11u8; 16];
        let mut section =
            Section::from_input(progbits_info("A", 0, 16), &mut counter, || Ok(&input)).unwrap();

        section.add_relocation(Relocation::new(4, Some(DataId::new(1)), 1, 0));
        section.add_patch(8, &[1, 2, 3, 4]);
        section.finalise_patches().unwrap();

        section.set_output_address(0x1000);
        assert_eq!(section.output_address(), 0x1000);

        let mut sink = Vec::new();
        assert_eq!(section.write(&mut sink).unwrap(), 16);
        let mut expected = input.to_vec();
        expected[8..12].copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(sink, expected);

        // The patch did not disturb the relocation.
        let relocation = section.relocation_at(4).unwrap();
        assert_eq!(relocation.kind, 1);
        assert_eq!(relocation.addend, 0);
    }

    #[test]
    fn sections_compare_by_immutable_properties() {
        let mut counter = SectionCounter::default();
        let a = Section::from_input(progbits_info(".data", 0, 8), &mut counter, || Ok(&[0; 8]))
            .unwrap();
        let mut b =
            Section::from_input(progbits_info(".data", 0, 8), &mut counter, || Ok(&[0; 8]))
                .unwrap();
        assert_eq!(a, b);
        b.update_contents(vec![1; 8]);
        assert_eq!(a, b);
    }
}
