//! # scp-push
//!
//! Sink-mode SCP client that speaks the legacy `scp -t` protocol directly
//! over an already-established SSH channel:
//!   • One-byte acknowledgement handshake with reason-line decoding
//!   • `C` / `D` / `E` control-line encoding
//!   • Single-file push from any `Read` source
//!   • Recursive directory-tree push with enter/exit bracketing
//!   • Injectable diagnostic sink for transfer events
//!   • ssh2 channel adapter

pub mod scp;
