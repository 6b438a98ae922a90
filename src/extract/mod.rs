//! Archive extraction via an external decompression backend

pub mod backend;
pub mod pipeline;

pub use backend::select_entry_point;
pub use pipeline::Extractor;
