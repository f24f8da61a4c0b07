//! HEIC to JPG converter for cloud-stored photo collections
//!
//! Lists HEIC images in a remote file store, converts each one to a
//! size- and quality-bounded JPG for web publication, and reports the
//! space saved. A durable ledger keyed by remote id keeps repeated runs
//! idempotent.

pub mod codec;
pub mod error;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod resize;
pub mod store;

pub use error::{Error, Result};
