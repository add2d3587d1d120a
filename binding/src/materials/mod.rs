//! Material resource binding.
//!
//! This module provides a two-level material abstraction:
//!
//! - [`Material`] - pipeline, material set layout and the name maps of its
//!   uniform members and samplers (created by the device)
//! - [`MaterialInstance`] - per-frame-slot descriptor sets and dynamic uniform
//!   buffers holding the actual parameter values
//!
//! # Frame slots
//!
//! An instance keeps `N` copies of its parameters, one per frame in flight.
//! Every uniform buffer binding of the material set is turned into a dynamic
//! uniform buffer, so all `N` copies live in one buffer and are selected by a
//! dynamic offset at bind time. Writes only touch the current slot and mark
//! the binding dirty in every other slot; [`MaterialInstance::update_uniforms`]
//! copies the value forward lazily when a dirty slot becomes current.
//!
//! The caller is responsible for waiting on the fence of a slot before writing
//! to it again; nothing here blocks.

mod instance;
mod material;

pub use instance::{FrameContext, MaterialInstance, OuterSet};
pub use material::{Material, MaterialDescriptor, UniformMember, aligned_block_size};
