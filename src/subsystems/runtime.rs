//! Component runtime — runs a subsystem's channels as sibling tasks.
//!
//! A [`Component`] is an independently-runnable unit (a comms channel such
//! as the PTY console). It captures its shared state at construction time
//! and is handed to [`run_components`].
//!
//! Any component error or panic cancels the shared [`CancellationToken`] so
//! sibling components stop cooperatively.

use std::future::Future;
use std::pin::Pin;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::AppError;

/// A boxed, owned future returned by [`Component::run`].
pub type ComponentFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

pub trait Component: Send + 'static {
    /// Stable identifier used in log messages.
    fn id(&self) -> &str;

    /// Consume the component and return its run-loop. The future should
    /// finish once `shutdown` is cancelled or its input is exhausted.
    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture;
}

/// Run every component as its own Tokio task until all have exited.
///
/// The first error or panic cancels `shutdown` and is returned once the
/// remaining components have drained.
pub async fn run_components(
    components: Vec<Box<dyn Component>>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let mut set = JoinSet::new();
    for component in components {
        debug!(component = %component.id(), "spawning component");
        set.spawn(component.run(shutdown.clone()));
    }

    let mut first_err = None;
    while let Some(res) = set.join_next().await {
        let err = match res {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(e) => AppError::Comms(format!("component panicked: {e}")),
        };
        error!("component failed: {err}");
        shutdown.cancel();
        first_err.get_or_insert(err);
    }

    first_err.map_or(Ok(()), Err)
}
