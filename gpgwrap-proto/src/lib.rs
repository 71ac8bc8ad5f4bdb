//! Shared text-level definitions for `GpgWrap`: armor framing, tool output
//! line handling and host-style command word splitting.

pub mod armor;
pub mod lines;
pub mod words;
