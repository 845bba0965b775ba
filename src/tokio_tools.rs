use std::future::Future;
use std::io;

use tokio::task::JoinHandle;
use tracing::Instrument;

/// Spawns a background task under a named span; with `tokio_unstable` the
/// runtime task carries the name too, so it shows up in tokio-console.
pub fn spawn_named_task<F, S>(name: S, future: F) -> io::Result<JoinHandle<F::Output>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
    S: Into<String>,
{
    let name = name.into();
    let span = tracing::info_span!("task", task_name = %name);
    let future = future.instrument(span);

    #[cfg(tokio_unstable)]
    {
        tokio::task::Builder::new().name(&name).spawn(future)
    }
    #[cfg(not(tokio_unstable))]
    {
        Ok(tokio::spawn(future))
    }
}
