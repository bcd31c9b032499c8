//! ELF section types, flags and note encoding. The `object` crate supplies the raw constants;
//! the newtypes here keep the rest of the crate from passing bare integers around.

/// Section flag bit values.
pub mod shf {
    use super::SectionFlags;

    pub const WRITE: SectionFlags = SectionFlags::from_u32(object::elf::SHF_WRITE);
    pub const ALLOC: SectionFlags = SectionFlags::from_u32(object::elf::SHF_ALLOC);
    pub const EXECINSTR: SectionFlags = SectionFlags::from_u32(object::elf::SHF_EXECINSTR);
    pub const MERGE: SectionFlags = SectionFlags::from_u32(object::elf::SHF_MERGE);
    pub const STRINGS: SectionFlags = SectionFlags::from_u32(object::elf::SHF_STRINGS);
    pub const INFO_LINK: SectionFlags = SectionFlags::from_u32(object::elf::SHF_INFO_LINK);
    pub const LINK_ORDER: SectionFlags = SectionFlags::from_u32(object::elf::SHF_LINK_ORDER);
    pub const GROUP: SectionFlags = SectionFlags::from_u32(object::elf::SHF_GROUP);
    pub const TLS: SectionFlags = SectionFlags::from_u32(object::elf::SHF_TLS);
    pub const COMPRESSED: SectionFlags = SectionFlags::from_u32(object::elf::SHF_COMPRESSED);
    pub const EXCLUDE: SectionFlags = SectionFlags::from_u32(object::elf::SHF_EXCLUDE);
}

/// Section type values.
pub mod sht {
    use super::SectionType;

    pub const NULL: SectionType = SectionType::from_u32(object::elf::SHT_NULL);
    pub const PROGBITS: SectionType = SectionType::from_u32(object::elf::SHT_PROGBITS);
    pub const SYMTAB: SectionType = SectionType::from_u32(object::elf::SHT_SYMTAB);
    pub const STRTAB: SectionType = SectionType::from_u32(object::elf::SHT_STRTAB);
    pub const RELA: SectionType = SectionType::from_u32(object::elf::SHT_RELA);
    pub const HASH: SectionType = SectionType::from_u32(object::elf::SHT_HASH);
    pub const DYNAMIC: SectionType = SectionType::from_u32(object::elf::SHT_DYNAMIC);
    pub const NOTE: SectionType = SectionType::from_u32(object::elf::SHT_NOTE);
    pub const NOBITS: SectionType = SectionType::from_u32(object::elf::SHT_NOBITS);
    pub const REL: SectionType = SectionType::from_u32(object::elf::SHT_REL);
    pub const DYNSYM: SectionType = SectionType::from_u32(object::elf::SHT_DYNSYM);
    pub const INIT_ARRAY: SectionType = SectionType::from_u32(object::elf::SHT_INIT_ARRAY);
    pub const FINI_ARRAY: SectionType = SectionType::from_u32(object::elf::SHT_FINI_ARRAY);
    pub const RELR: SectionType = SectionType::from_u32(object::elf::SHT_RELR);
    pub const GNU_HASH: SectionType = SectionType::from_u32(object::elf::SHT_GNU_HASH);
    pub const GNU_VERDEF: SectionType = SectionType::from_u32(object::elf::SHT_GNU_VERDEF);
    pub const GNU_VERNEED: SectionType = SectionType::from_u32(object::elf::SHT_GNU_VERNEED);
    pub const GNU_VERSYM: SectionType = SectionType::from_u32(object::elf::SHT_GNU_VERSYM);
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SectionFlags(u32);

impl SectionFlags {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn from_u32(raw: u32) -> SectionFlags {
        SectionFlags(raw)
    }

    #[must_use]
    pub fn contains(self, flag: SectionFlags) -> bool {
        self.0 & flag.0 != 0
    }

    /// Returns self with the specified flags set.
    #[must_use]
    pub const fn with(self, flags: SectionFlags) -> SectionFlags {
        SectionFlags(self.0 | flags.0)
    }

    /// Returns self with the specified flags cleared.
    #[must_use]
    pub const fn without(self, flags: SectionFlags) -> SectionFlags {
        SectionFlags(self.0 & !flags.0)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0 as u64
    }

    /// Builds the flags for a synthetic section from basic properties.
    #[must_use]
    pub fn for_section(read_only: bool, text: bool, allocatable: bool) -> SectionFlags {
        let mut flags = SectionFlags::empty();
        if allocatable {
            flags |= shf::ALLOC;
        }
        if !read_only {
            flags |= shf::WRITE;
        }
        if text {
            flags |= shf::EXECINSTR;
        }
        flags
    }
}

impl From<u64> for SectionFlags {
    fn from(value: u64) -> Self {
        Self(value as u32)
    }
}

impl std::fmt::Display for SectionFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (flag, ch) in [
            (shf::WRITE, "W"),
            (shf::ALLOC, "A"),
            (shf::EXECINSTR, "X"),
            (shf::MERGE, "M"),
            (shf::STRINGS, "S"),
            (shf::INFO_LINK, "I"),
            (shf::LINK_ORDER, "L"),
            (shf::GROUP, "G"),
            (shf::TLS, "T"),
            (shf::COMPRESSED, "C"),
            (shf::EXCLUDE, "E"),
        ] {
            if self.contains(flag) {
                f.write_str(ch)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SectionFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self, f)
    }
}

impl std::ops::BitOr for SectionFlags {
    type Output = SectionFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for SectionFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::ops::BitAnd for SectionFlags {
    type Output = SectionFlags;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SectionType(u32);

impl SectionType {
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn from_u32(raw: u32) -> Self {
        Self(raw)
    }
}

/// Note type tag for the address translation table emitted by the rewriter.
pub const NT_ADDRESS_TRANSLATION: u32 = 1;

/// Note type tag for instrumentation runtime tables.
pub const NT_INSTRUMENTATION_TABLES: u32 = 2;

/// Encodes an ELF note record: a 12-byte header (name size, descriptor size, type), the
/// NUL-terminated producer name, then the descriptor bytes, with both variable-length fields padded
/// to 4-byte boundaries.
#[must_use]
pub fn encode_note(name: &str, desc: &[u8], note_type: u32) -> Vec<u8> {
    let name_size = name.len() as u32 + 1;
    let desc_size = desc.len() as u32;
    let mut out = Vec::with_capacity(12 + name_size.next_multiple_of(4) as usize + desc.len());
    out.extend_from_slice(&name_size.to_le_bytes());
    out.extend_from_slice(&desc_size.to_le_bytes());
    out.extend_from_slice(&note_type.to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    while out.len() % 4 != 0 {
        out.push(0);
    }
    out.extend_from_slice(desc);
    while out.len() % 4 != 0 {
        out.push(0);
    }
    out
}
