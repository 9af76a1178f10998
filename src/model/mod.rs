//! # Model Resource Management
//!
//! Everything around the single accelerator-resident speech model: the
//! catalog of known variants, device resolution, the loading seam, the
//! slot manager that arbitrates acquisition across jobs, and best-effort
//! coordination with the sibling service competing for the same memory.

pub mod catalog;
pub mod device;
pub mod loader;
pub mod manager;
pub mod sibling;

pub use catalog::ModelSize;
pub use loader::{LoadedModel, ModelLoader, ProcessModelLoader};
pub use manager::{ModelHandle, ModelResourceManager, ModelStatus};
