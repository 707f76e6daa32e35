//! Weight loading.
//!
//! Weights are stored in a single file: an 8-byte little-endian header
//! length, a UTF-8 JSON header describing every tensor, and the raw
//! payload. Names are resolved once against a [`crate::schedule::Schedule`]
//! so the runtime only handles tensor indices.

pub mod format;
mod resolve;
mod weight_file;
mod writer;

pub use format::{Dtype, TensorMetadata, WeightHeader};
pub use resolve::ResolvedWeights;
pub use weight_file::{WeightFile, WeightView};
pub use writer::WeightWriter;
