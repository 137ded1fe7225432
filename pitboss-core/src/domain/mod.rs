//! Domain types
//!
//! Core entities shared between the supervision engine and the server.

pub mod worker;
