//! `GpgWrap`: OpenPGP message wrapper for IRC-style chat clients.

pub mod config;
pub mod console;
pub mod gpg;
pub mod host;
pub mod inbound;
pub mod outbound;
pub mod plugin;
pub mod pool;
