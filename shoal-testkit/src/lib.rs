//! Test fixtures for shoal.
//!
//! Scripted topology views, recording listeners, in-memory job stores, and
//! swappable configuration sources, shared by shoal's integration tests and
//! available to downstream consumers testing against the same contracts.

pub mod config;
pub mod mock;
pub mod store;
pub mod view;

pub use config::*;
pub use mock::*;
pub use store::*;
pub use view::*;
