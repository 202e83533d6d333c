//! Grow-only GPU storage buffer.
//!
//! Mirrors the donor's `DynamicBuffer` (`renderer/dynamic_buffer.rs`):
//! double capacity on overflow, recreate the buffer, and hand back a
//! fresh [`ResourceId`] so dependent bind groups know to rebuild
//! (`renderer/core/resources/resource_ids.rs`).

use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one buffer allocation. Changes whenever the backing
/// `wgpu::Buffer` is recreated, so a bind group built against a stale ID
/// is known-stale without comparing buffer handles directly.
pub type ResourceId = u64;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

fn next_resource_id() -> ResourceId {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A storage buffer that grows to fit its contents, 2x at a time.
pub struct GrowBuffer {
    label: String,
    usage: wgpu::BufferUsages,
    buffer: wgpu::Buffer,
    resource_id: ResourceId,
    /// Capacity in elements, not bytes.
    capacity: u32,
    element_size: u32,
}

impl GrowBuffer {
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        element_size: u32,
        initial_capacity: u32,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let capacity = initial_capacity.max(1);
        let buffer = Self::alloc(device, label, element_size, capacity, usage);
        Self {
            label: label.to_string(),
            usage,
            buffer,
            resource_id: next_resource_id(),
            capacity,
            element_size,
        }
    }

    fn alloc(
        device: &wgpu::Device,
        label: &str,
        element_size: u32,
        capacity: u32,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: u64::from(element_size) * u64::from(capacity),
            usage,
            mapped_at_creation: false,
        })
    }

    #[must_use]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Ensures room for `required_count` elements, recreating the buffer
    /// (and bumping its [`ResourceId`]) if the current capacity falls
    /// short. Returns `true` if the buffer was recreated.
    pub fn ensure_capacity(&mut self, device: &wgpu::Device, required_count: u32) -> bool {
        if required_count <= self.capacity {
            return false;
        }
        let new_capacity = (self.capacity * 2).max(required_count);
        log::info!(
            "growing GPU buffer '{}': {} -> {} elements",
            self.label,
            self.capacity,
            new_capacity
        );
        self.buffer = Self::alloc(device, &self.label, self.element_size, new_capacity, self.usage);
        self.resource_id = next_resource_id();
        self.capacity = new_capacity;
        true
    }

    pub fn write(&self, queue: &wgpu::Queue, offset_elements: u32, data: &[u8]) {
        queue.write_buffer(&self.buffer, u64::from(offset_elements) * u64::from(self.element_size), data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_ids_are_distinct_across_instances() {
        let a = next_resource_id();
        let b = next_resource_id();
        assert_ne!(a, b);
    }
}
