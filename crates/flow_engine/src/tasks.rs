use std::future::Future;
use std::sync::Mutex;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::sync::lock_or_recover;

/// Spawns fire-and-forget work from notification handlers and keeps the
/// handles so panics are observed and logged instead of vanishing.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl BackgroundTasks {
    pub fn spawn<F>(&self, name: &'static str, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(error) => {
                error!(task = name, error = %error, "background_task_without_runtime");
                return false;
            }
        };
        let join = handle.spawn(future);
        let mut handles = lock_or_recover(&self.handles, "tasks.spawn");
        handles.retain(|(_, existing)| !existing.is_finished());
        handles.push((name, join));
        debug!(task = name, outstanding = handles.len(), "background_task_spawned");
        true
    }

    pub fn outstanding(&self) -> usize {
        lock_or_recover(&self.handles, "tasks.outstanding")
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    /// Awaits every spawned task, including ones spawned while draining.
    pub async fn drain(&self) -> usize {
        let mut failures = 0usize;
        loop {
            let batch = std::mem::take(&mut *lock_or_recover(&self.handles, "tasks.drain"));
            if batch.is_empty() {
                return failures;
            }
            for (name, handle) in batch {
                if let Err(join_error) = handle.await {
                    failures += 1;
                    error!(task = name, error = %join_error, "background_task_failed");
                }
            }
        }
    }
}
