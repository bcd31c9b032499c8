//! Reorders a section's contents according to a caller-supplied permutation of addressable
//! sub-ranges. This is the only place allowed to bulk-rewrite relocation offsets; everything else
//! must leave offsets untouched.

use crate::data::DataItem;
use crate::relocation::Relocation;
use crate::relocation::RelocationStore;
use crate::section::Section;

struct Move {
    old_start: u64,
    size: u64,
    new_start: u64,
}

/// Rewrites `section` so that the sub-ranges in `order` are laid out back to back, in the given
/// order, at the start of the section. In in-place mode the full-size buffer is rewritten and
/// bytes past the packed ranges keep their original values; in copy mode the new contents hold
/// only the reordered data and relocations outside the moved ranges are discarded with it.
///
/// Every sub-range must lie within the section. Relocations inside a moved range shift by exactly
/// the range's displacement, preserving their relative position. Pending relocations reference
/// original input bytes and cannot survive a reorder, so none may be queued.
pub fn reorder_contents(section: &mut Section, order: &[DataItem], in_place: bool) {
    debug_assert!(!section.has_pending_relocations());

    let mut moves = Vec::with_capacity(order.len());
    let new_contents = {
        let contents = section.addressed_contents();
        let mut buffer = if in_place {
            contents.to_vec()
        } else {
            Vec::with_capacity(order.iter().map(|item| item.size as usize).sum())
        };

        let mut cursor = 0u64;
        for item in order {
            assert!(
                section.contains_range(item.address, item.size),
                "sub-range [0x{:x}, 0x{:x}) not within section `{}`",
                item.address,
                item.end_address(),
                section.name()
            );
            let old_start = item.address - section.address();
            moves.push(Move {
                old_start,
                size: item.size,
                new_start: cursor,
            });
            let bytes = &contents[old_start as usize..(old_start + item.size) as usize];
            if in_place {
                buffer[cursor as usize..cursor as usize + bytes.len()].copy_from_slice(bytes);
            } else {
                buffer.extend_from_slice(bytes);
            }
            cursor += item.size;
        }
        buffer
    };

    // Moves are searched by original offset, independent of the permutation order.
    moves.sort_by_key(|m| m.old_start);

    // Relocations come out of the store in ascending original offset order, which makes the
    // rewrite deterministic for identical inputs.
    let relocations = section
        .relocations()
        .iter()
        .filter_map(|relocation| rewrite_relocation(relocation, &moves, in_place))
        .collect::<RelocationStore>();

    tracing::debug!(
        section = %section.name(),
        ranges = order.len(),
        in_place,
        "reorder section contents"
    );

    section.replace_relocations(relocations);
    section.update_contents(new_contents);
    section.mark_reordered();
}

fn rewrite_relocation(
    relocation: &Relocation,
    moves: &[Move],
    in_place: bool,
) -> Option<Relocation> {
    let idx = moves
        .partition_point(|m| m.old_start <= relocation.offset)
        .checked_sub(1)?;
    let m = &moves[idx];
    if relocation.offset < m.old_start + m.size {
        let mut moved = *relocation;
        moved.offset = m.new_start + (relocation.offset - m.old_start);
        return Some(moved);
    }
    // Not inside any moved range: retained as-is in in-place mode, dropped with the bytes in copy
    // mode.
    in_place.then_some(*relocation)
}
