// Task execution with timeout and panic isolation

use crate::application::panic_guard::panic_message;
use crate::domain::{JobArgs, RegisteredTask, TaskFn};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Run one attempt of a task. `Err` carries the message recorded on the job.
///
/// The attempt runs on its own tokio task so a panic cannot reach the
/// worker. On timeout async tasks are aborted; blocking tasks cannot be
/// pre-empted and finish in the background.
pub(crate) async fn execute(task: &RegisteredTask, args: JobArgs) -> Result<Value, String> {
    let handle: JoinHandle<_> = match &task.func {
        TaskFn::Blocking(func) => {
            let func = Arc::clone(func);
            tokio::task::spawn_blocking(move || func(args))
        }
        TaskFn::Async(func) => tokio::spawn(func(args)),
    };
    let abort = handle.abort_handle();

    match tokio::time::timeout(task.timeout, handle).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(task_error))) => Err(task_error.to_string()),
        Ok(Err(join_error)) if join_error.is_panic() => Err(format!(
            "Task panicked: {}",
            panic_message(join_error.into_panic().as_ref())
        )),
        Ok(Err(_)) => Err("Task was cancelled".to_string()),
        Err(_) => {
            abort.abort();
            Err(format!("Task timed out after {:?}", task.timeout))
        }
    }
}
