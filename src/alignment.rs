use crate::error::Result;
use anyhow::bail;
use std::fmt::Debug;
use std::fmt::Display;

/// An alignment. Always a power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Alignment {
    pub(crate) exponent: u8,
}

/// The minimum alignment that we support. This is also the default for sections that don't
/// declare one.
pub const MIN: Alignment = Alignment { exponent: 0 };

/// The maximum alignment that we support. Sections requesting more than this are almost
/// certainly corrupt.
pub const MAX: Alignment = Alignment { exponent: 32 };

impl Alignment {
    pub fn new(raw: u64) -> Result<Self> {
        if !raw.is_power_of_two() {
            bail!("Invalid alignment 0x{raw:x}");
        }
        let exponent = raw.trailing_zeros();
        if exponent > u32::from(MAX.exponent) {
            bail!("Unsupported alignment 0x{raw:x}");
        }
        Ok(Alignment {
            exponent: exponent as u8,
        })
    }

    /// Like `new`, but maps the 0 that ELF uses for "no constraint" to an alignment of 1.
    pub fn from_input(raw: u64) -> Result<Self> {
        if raw == 0 { Ok(MIN) } else { Self::new(raw) }
    }

    pub fn value(self) -> u64 {
        1 << self.exponent
    }

    pub fn mask(self) -> u64 {
        self.value() - 1
    }

    pub fn align_up(self, value: u64) -> u64 {
        value.next_multiple_of(self.value())
    }

    pub fn align_up_usize(self, value: usize) -> usize {
        value.next_multiple_of(self.value() as usize)
    }

    pub fn align_down(self, value: u64) -> u64 {
        value & !self.mask()
    }
}

impl Default for Alignment {
    fn default() -> Self {
        MIN
    }
}

impl Display for Alignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.value(), f)
    }
}

#[test]
fn test_new() {
    assert_eq!(Alignment::new(1).unwrap(), MIN);
    assert_eq!(Alignment::new(16).unwrap().value(), 16);
    assert!(Alignment::new(0).is_err());
    assert!(Alignment::new(24).is_err());
    assert_eq!(Alignment::from_input(0).unwrap(), MIN);
}

#[test]
fn test_align_up() {
    assert_eq!(Alignment::new(16).unwrap().align_up(16), 16);
    assert_eq!(Alignment::new(16).unwrap().align_up(15), 16);
    assert_eq!(Alignment::new(16).unwrap().align_up(1), 16);
    assert_eq!(Alignment::new(16).unwrap().align_up(0), 0);
    assert_eq!(Alignment::new(16).unwrap().align_up(31), 32);
}

#[test]
fn test_align_down() {
    assert_eq!(Alignment::new(16).unwrap().align_down(16), 16);
    assert_eq!(Alignment::new(16).unwrap().align_down(17), 16);
    assert_eq!(Alignment::new(16).unwrap().align_down(32), 32);
    assert_eq!(Alignment::new(16).unwrap().align_down(0), 0);
    assert_eq!(Alignment::new(16).unwrap().align_down(1), 0);
}
