//! Resumable network transfer engine

pub mod engine;
pub mod sidecar;

pub use engine::{transfer, TransferOptions};
pub use sidecar::{sidecar_path, Sidecar, SIDECAR_EXT};
