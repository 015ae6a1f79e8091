#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

#[cfg(any(test, feature = "test-util"))]
pub use test_utils::*;
