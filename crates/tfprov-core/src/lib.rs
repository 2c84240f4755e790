//! Domain model for tfprov.
//!
//! Everything here is pure: workspace specs, the run status classifier shared
//! by every polling phase, output filtering, and the `tfvars` template
//! renderer. Remote I/O lives in `tfprov-pipeline`.

pub mod error;
pub mod outputs;
pub mod spec;
pub mod status;
pub mod template;

pub use error::CoreError;
pub use outputs::{OutputSet, StateOutput, StateSnapshotRef};
pub use spec::{RunMode, VcsBinding, WorkspaceSpec};
pub use status::{ConfigurationStatus, RunPhase, RunStatus, Verdict};
pub use template::{RenderedTemplate, VarValue, Variables};
