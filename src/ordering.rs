//! The placement order for sections in the output image: a cascade of tie-breaks ending in the
//! creation sequence, which is unique, so distinct sections never compare equal.

use crate::section::Section;
use std::cmp::Ordering;

pub fn output_order(a: &Section, b: &Section) -> Ordering {
    let both_input = a.is_from_input() && b.is_from_input();

    // Allocatable sections go first.
    b.is_allocatable()
        .cmp(&a.is_allocatable())
        // Sections sourced from the input file take precedence over synthetic ones.
        .then(b.is_from_input().cmp(&a.is_from_input()))
        // Input sections sort by their input address.
        .then_with(|| {
            if both_input {
                a.address().cmp(&b.address())
            } else {
                Ordering::Equal
            }
        })
        // With equal nonzero addresses, smaller sections first.
        .then_with(|| {
            if both_input && a.address() != 0 {
                a.size().cmp(&b.size())
            } else {
                Ordering::Equal
            }
        })
        // Code before data.
        .then_with(|| b.is_text().cmp(&a.is_text()))
        // Read-only before writable.
        .then_with(|| a.is_writable().cmp(&b.is_writable()))
        // BSS at the end.
        .then_with(|| a.is_bss().cmp(&b.is_bss()))
        // Otherwise, preserve the order of creation.
        .then_with(|| a.creation_sequence().cmp(&b.creation_sequence()))
}
