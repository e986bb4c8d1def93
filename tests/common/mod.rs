//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.

#![allow(dead_code)]

mod fixtures;
mod server;

pub use fixtures::*;
pub use server::{StubServer, StubState};
