//! Discovery and GATT profiling
//!
//! This module covers the core pipeline:
//! - time-bounded advertisement collection
//! - target selection by address or name
//! - connect-and-walk of the attribute hierarchy
//! - payload normalization and document output

pub mod builder;
pub mod collector;
pub mod normalize;
pub mod selector;
pub mod types;
pub mod writer;

// Re-export commonly used items
pub use builder::{ProfileBuilder, ProfileOptions};
pub use collector::{collect, AdvertisementStore};
pub use normalize::{normalize, Key, NormalizeError, Payload};
pub use selector::{select, Target};
pub use types::*;
pub use writer::{to_bytes, write_document};
