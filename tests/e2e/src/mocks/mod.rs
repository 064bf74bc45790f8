//! Test fixtures.

mod fixtures;

pub use fixtures::TestDataFactory;
