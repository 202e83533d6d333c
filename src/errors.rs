//! Error Types
//!
//! This module defines the error types returned by the renderer's
//! registration and setup APIs.
//!
//! # Overview
//!
//! Per the error-handling design, the GPU compute passes (cull, sort,
//! compact, set-draw-args) never fail at the instance level — a bad
//! instance is culled, not errored. [`RendererError`] therefore only
//! appears at registration boundaries (mesh/material/animation-set
//! registration, instance-type allocation) and at renderer init.

use thiserror::Error;

/// Which capacity limit was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityKind {
    /// `instance_count_total <= 2^20`.
    InstanceCount,
    /// `instance_type_count <= 2^12`.
    InstanceTypeCount,
    /// `lod_count <= 5`.
    LodCount,
    /// `submeshes_per_instance <= 5`.
    SubmeshCount,
}

impl std::fmt::Display for CapacityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CapacityKind::InstanceCount => "instance count",
            CapacityKind::InstanceTypeCount => "instance type count",
            CapacityKind::LodCount => "LOD count",
            CapacityKind::SubmeshCount => "submesh count",
        };
        f.write_str(s)
    }
}

/// The error type returned by the renderer's public API.
#[derive(Error, Debug)]
pub enum RendererError {
    /// A registration would cross a fixed capacity boundary. The
    /// offending call is rejected; the renderer continues with the
    /// state it had before the call.
    #[error("capacity exceeded: {kind} requested {requested}, limit {limit}")]
    Capacity {
        kind: CapacityKind,
        limit: u32,
        requested: u32,
    },

    /// The platform lacks a capability the renderer requires
    /// (compute, indirect draw, or instancing). The renderer disables
    /// itself; every subsequent register/draw call becomes a no-op.
    #[error("platform unsupported, missing: {}", .missing.join(", "))]
    PlatformUnsupported { missing: Vec<&'static str> },

    /// The bake artifact handed to a register call is malformed
    /// (non-positive animation length, texture region out of bounds,
    /// non-triangle-list topology, or non-16-bit indices).
    #[error("malformed bake artifact: {0}")]
    MalformedBakeArtifact(String),

    /// A GPU buffer allocation failed. The renderer disables itself
    /// for the current frame and retries on the next registration.
    #[error("GPU resource exhausted: {0}")]
    ResourceExhausted(String),
}

/// Alias for `Result<T, RendererError>`.
pub type Result<T> = std::result::Result<T, RendererError>;
