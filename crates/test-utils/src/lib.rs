//! Shared test utilities for the station map workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Station fixtures around central Paris
//! - An in-memory `FakeRepository` with scripted latency and failures
//! - Approximate floating-point assertions
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, FakeRepository};
//! ```

pub mod fake_repository;
pub mod fixtures;

pub use fake_repository::{CallKind, FakeRepository, RepoCall, FAKE_PASSWORD, FAKE_USERNAME};
pub use fixtures::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Approximate equality of two positions, compared as (latitude, longitude).
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_point_approx_eq;
///
/// assert_point_approx_eq!(station.position(), GeoPoint::new(48.8566, 2.3522), 1e-6);
/// ```
#[macro_export]
macro_rules! assert_point_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left = $left;
        let right = $right;
        $crate::assert_approx_eq!(left.latitude, right.latitude, $epsilon);
        $crate::assert_approx_eq!(left.longitude, right.longitude, $epsilon);
    }};
}
