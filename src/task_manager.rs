//! Manages the lifecycle of the server tasks spawned by the application.
use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type NamedHandle = (&'static str, JoinHandle<()>);

/// A centralized manager for all spawned tasks.
///
/// This struct is responsible for:
/// - Spawning tasks and keeping track of their `JoinHandle`s.
/// - Providing a graceful shutdown mechanism by awaiting all tasks.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<NamedHandle>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    /// Creates a new `TaskManager`.
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    /// Spawns a new task and adds its handle to the manager.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name, handle));
    }

    /// Returns a clone of the shutdown receiver.
    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// The number of tasks currently tracked.
    pub fn task_count(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Waits for all managed tasks to complete.
    pub async fn shutdown(self) {
        let handles: Vec<NamedHandle> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        info!(
            "TaskManager shutting down. Waiting for {} tasks to complete...",
            handles.len()
        );

        let (task_names, joins): (Vec<&'static str>, Vec<JoinHandle<()>>) =
            handles.into_iter().unzip();
        debug!(tasks = ?task_names, "Awaiting all tasks.");

        let results = join_all(joins).await;

        let mut panicked = Vec::new();
        for (task_name, result) in task_names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name, "Task shut down gracefully."),
                Err(e) => {
                    error!(task_name, error = %e, "Task panicked during shutdown.");
                    panicked.push(task_name);
                }
            }
        }

        if panicked.is_empty() {
            info!("All tasks shut down gracefully.");
        } else {
            error!(
                "{} tasks panicked during shutdown: {:?}",
                panicked.len(),
                panicked
            );
        }
    }
}
