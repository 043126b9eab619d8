//! Seamflux reconciles face-centered vector-field fluxes across the
//! refinement-level boundaries of a block-structured, adaptively refined
//! mesh. Fluxes are computed independently on each block; at an interface
//! where two blocks meet at different refinement levels, the fine side's
//! restricted fluxes must replace the coarse side's so that conserved
//! quantities stay consistent across the seam. The crate packs restricted
//! flux data into per-neighbor buffers, routes it by same-process copy or
//! asynchronous message, tracks completion explicitly, and unpacks it at
//! the resolved indices, without ever blocking while a phase drains. The
//! mesh topology itself (which blocks abut which, and at what level) is
//! consumed as an opaque per-block neighbor table produced elsewhere.

pub mod buffer;
pub mod driver;
pub mod edge_field;
pub mod error;
pub mod exchange;
pub mod geometry;
pub mod mesh;
pub mod message;
