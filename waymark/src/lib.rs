//! Waymark: a small HTTP server layer over Axum.
//!
//! This facade crate re-exports `waymark-core` through a single dependency.
//! Import everything you need with:
//!
//! ```ignore
//! use waymark::prelude::*;
//! ```
//!
//! # Feature flags
//!
//! | Feature      | Default | Crate          |
//! |--------------|---------|----------------|
//! | `test-utils` | no      | `waymark-test` |

pub extern crate waymark_core;

// Re-export everything from waymark-core at the top level for convenience.
pub use waymark_core::*;

#[cfg(feature = "test-utils")]
pub use waymark_test;

pub mod prelude {
    //! Re-exports the core prelude.
    pub use waymark_core::prelude::*;

    #[cfg(feature = "test-utils")]
    pub use waymark_test::{TestApp, TestResponse};
}
