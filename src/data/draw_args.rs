//! `DrawArgs`: the indirect draw-call argument record the
//! `set_draw_args` pass fills in and the draw-submission stage consumes
//! directly as `wgpu::util::DrawIndexedIndirectArgs`-compatible storage.

use bytemuck::{Pod, Zeroable};

/// Five-`u32` indexed-indirect-draw argument record, GPU ABI.
///
/// Field order matches `wgpu`'s indexed-indirect layout so the buffer can
/// be bound directly as `draw_indexed_indirect` source without a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DrawArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub index_start: u32,
    pub base_vertex: u32,
    pub instance_start: u32,
}

impl DrawArgs {
    /// A draw args entry with `instance_count` zeroed — the `set_draw_args`
    /// pass writes this before compaction runs so an unreached bin draws
    /// nothing rather than stale data from a previous frame.
    #[must_use]
    pub const fn empty(index_count: u32, index_start: u32, base_vertex: u32) -> Self {
        Self {
            index_count,
            instance_count: 0,
            index_start,
            base_vertex,
            instance_start: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_zero_instance_count() {
        let args = DrawArgs::empty(36, 0, 0);
        assert_eq!(args.instance_count, 0);
        assert_eq!(args.index_count, 36);
    }

    #[test]
    fn is_pod_sized_as_five_u32() {
        assert_eq!(std::mem::size_of::<DrawArgs>(), 5 * 4);
    }
}
