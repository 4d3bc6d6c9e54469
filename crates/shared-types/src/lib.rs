//! # Shared Types Crate
//!
//! Chain and networking entities used across the workspace.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Cross-crate types are defined here.
//! - **No Live Pointers**: Blocks are referred to by `BlockRef` (hash + height),
//!   never by a handle into another component's storage.

pub mod entities;

pub use entities::*;
