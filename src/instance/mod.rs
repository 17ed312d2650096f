//! Instance management.
//!
//! Layout under the instances root:
//! - `{name}/` - one directory per instance, named after it
//! - `{name}/.ddev/config.yaml` - tool descriptor; its presence marks an instance
//! - `{name}/.devsite.env` - flat key/value summary for other consumers
//! - `.{name}.lock` - held while `{name}` is being created

mod create;
mod lifecycle;
mod registry;
mod status;
mod types;

pub use create::CreationPipeline;
pub use lifecycle::InstanceLifecycle;
pub use registry::InstanceRegistry;
pub use status::{map_status, parse_describe, ToolReport};
pub use types::{
    CreationProgress, CreationRequest, CreationState, CreationStep, Instance, InstanceStatus,
};

use crate::error::{AppError, Result};

/// Run blocking file-system work off the async worker threads.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::other(format!("Blocking task failed: {e}")))?
}
