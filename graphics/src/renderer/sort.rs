//! Draw call ordering.
//!
//! Keys pack `layer:4 | opaque:1 | command:1 | material:25` so a descending
//! sort draws higher layers first, opaque meshes before commands and
//! commands before blended meshes, and batches equal materials together.

use std::cmp::Ordering;

use crate::device::BlendMode;
use crate::scene::DrawCall;

const MATERIAL_MASK: u32 = 0x1ff_ffff;

/// Pack the draw order of one draw call.
pub fn sort_key(layer: u32, blend: BlendMode, command: bool, material_id: u32) -> u32 {
    ((layer & 0xf) << 27)
        | (u32::from(!command && !blend.is_blended()) << 26)
        | (u32::from(command) << 25)
        | (material_id & MATERIAL_MASK)
}

/// Sort key of a draw call.
pub fn draw_call_key(call: &DrawCall) -> u32 {
    match call {
        DrawCall::Mesh(instance) => sort_key(
            instance.layer,
            instance.material.blend(),
            false,
            instance.material.id(),
        ),
        DrawCall::Command(command) => sort_key(command.layer, BlendMode::None, true, 0),
    }
}

/// One visible draw call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SortEntry {
    pub index: usize,
    pub key: u32,
    /// Squared camera distance, zero unless the draw is depth sorted.
    pub distance: f32,
}

fn compare(a: &SortEntry, b: &SortEntry) -> Ordering {
    (b.key >> 25)
        .cmp(&(a.key >> 25))
        .then_with(|| b.distance.total_cmp(&a.distance))
        .then_with(|| b.key.cmp(&a.key))
}

/// Order entries for submission. Blended draws in a group go back to front.
pub(crate) fn sort_entries(entries: &mut [SortEntry]) {
    entries.sort_by(compare);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{LAYER_HUD, LAYER_WORLD};

    fn entry(index: usize, key: u32, distance: f32) -> SortEntry {
        SortEntry {
            index,
            key,
            distance,
        }
    }

    #[test]
    fn test_layers_then_opaque_first() {
        let world_opaque = sort_key(LAYER_WORLD, BlendMode::None, false, 4);
        let world_blended = sort_key(LAYER_WORLD, BlendMode::Normal, false, 4);
        let hud_opaque = sort_key(LAYER_HUD, BlendMode::None, false, 4);
        assert!(world_opaque > world_blended);
        assert!(world_blended > hud_opaque);
    }

    #[test]
    fn test_blended_back_to_front() {
        let key = sort_key(LAYER_WORLD, BlendMode::Normal, false, 9);
        let mut entries = [entry(0, key, 1.0), entry(1, key, 25.0), entry(2, key, 4.0)];
        sort_entries(&mut entries);
        let order: Vec<_> = entries.iter().map(|e| e.index).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_opaque_grouped_by_material() {
        let a = sort_key(LAYER_WORLD, BlendMode::None, false, 1);
        let b = sort_key(LAYER_WORLD, BlendMode::None, false, 2);
        let mut entries = [entry(0, a, 0.0), entry(1, b, 0.0), entry(2, a, 0.0), entry(3, b, 0.0)];
        sort_entries(&mut entries);
        let order: Vec<_> = entries.iter().map(|e| e.index).collect();
        assert_eq!(order, vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_commands_between_opaque_and_blended() {
        let opaque = sort_key(LAYER_WORLD, BlendMode::None, false, 1);
        let command = sort_key(LAYER_WORLD, BlendMode::None, true, 0);
        let blended = sort_key(LAYER_WORLD, BlendMode::Additive, false, 1);
        assert!(opaque > command && command > blended);
    }

    #[test]
    fn test_material_id_is_masked() {
        let key = sort_key(LAYER_HUD, BlendMode::None, false, u32::MAX);
        assert_eq!(key >> 25, 0b10);
    }
}
