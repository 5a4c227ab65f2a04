//! Shared utilities for the resolver and its frontends.

mod info;
pub use info::*;
