//! # glint-core
//!
//! Core types shared across the Glint shader pipeline crates:
//! error and diagnostic records, pipeline configuration, target profiles,
//! and content hashing of emitted source.

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod hash;
pub mod profile;

pub use config::{HookPosition, PipelineConfig, TransformSpec};
pub use diagnostic::{Diagnostic, Diagnostics, Severity, Stage};
pub use error::{GlintError, GlintResult};
pub use hash::{hash_source, ContentHash};
pub use profile::{Capability, TargetProfile};
