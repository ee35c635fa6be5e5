//! Spawned tasks as shutdownable components
//!
//! `TaskComponent` owns a background task that watches a `ShutdownSignal`.
//! Stopping it fires the signal and waits for the task to return.

use async_trait::async_trait;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::coordinator::{ComponentError, Shutdown};
use super::shutdown::{shutdown_channel, ShutdownController, ShutdownSignal};

pub struct TaskComponent {
    name: String,
    controller: ShutdownController,
    handle: Mutex<Option<JoinHandle<Result<(), ComponentError>>>>,
}

impl TaskComponent {
    /// Spawn `run` with a fresh shutdown signal
    ///
    /// `run` must return once the signal fires.
    pub fn spawn<F, Fut, E>(name: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<ComponentError> + Send + 'static,
    {
        let (controller, signal) = shutdown_channel();
        let task = run(signal);
        let handle: JoinHandle<Result<(), ComponentError>> =
            tokio::spawn(async move { task.await.map_err(Into::into) });

        Self {
            name: name.into(),
            controller,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// True once the task has returned (or has already been stopped)
    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }
}

#[async_trait]
impl Shutdown for TaskComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn shutdown(&self, _deadline: Instant) -> Result<(), ComponentError> {
        self.controller.shutdown();

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };

        match handle.await {
            Ok(result) => result,
            Err(e) => Err(ComponentError::Panicked(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let component = TaskComponent::spawn("worker", |signal| async move {
            signal.recv().await;
            Ok::<(), ComponentError>(())
        });
        assert_eq!(component.name(), "worker");
        assert!(!component.is_finished());

        let deadline = Instant::now() + Duration::from_secs(1);
        component.shutdown(deadline).await.unwrap();

        assert!(component.is_finished());
    }

    #[tokio::test]
    async fn test_task_error_is_returned() {
        let component = TaskComponent::spawn("listener", |signal| async move {
            signal.recv().await;
            Err::<(), _>(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                "address in use",
            ))
        });

        let err = component
            .shutdown(Instant::now() + Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, ComponentError::Io(_)));
    }

    #[tokio::test]
    async fn test_second_shutdown_is_noop() {
        let component = TaskComponent::spawn("worker", |signal| async move {
            signal.recv().await;
            Ok::<(), ComponentError>(())
        });
        let deadline = Instant::now() + Duration::from_secs(1);

        component.shutdown(deadline).await.unwrap();
        component.shutdown(deadline).await.unwrap();
    }
}
