//! Deployment stack tooling.
//!
//! # Data Flow
//! ```text
//! render::standard(options)
//!     → StackManifest (typed, in memory)
//!     → render::to_yaml → stack file on disk
//!
//! stack file on disk
//!     → render::from_yaml (strict: unknown fields rejected)
//!     → verify::verify(manifest, env lookup)
//!     → Vec<StackIssue> (errors fail the deploy check)
//! ```
//!
//! # Design Decisions
//! - The manifest is a typed model of the runtime's schema subset the
//!   stack uses; string forms (`ip:host:container`) stay on the wire
//! - Secrets never appear in rendered output, only `${VAR}` references
//! - Verification is pure over an injected environment lookup

pub mod manifest;
pub mod render;
pub mod verify;

pub use manifest::{
    PortBinding, RestartPolicy, ServiceSpec, StackManifest, VolumeDecl, VolumeMount,
};
pub use render::{from_yaml, standard, to_yaml, StackOptions};
pub use verify::{parse_env_file, verify, Severity, StackIssue};
