//! Core math modules.

pub mod distribution;
pub mod grid;
pub mod kernel;
pub mod mmd;
pub mod robust;
pub mod simplex;
pub mod stable;
