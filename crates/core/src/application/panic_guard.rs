// Panic isolation for handlers and tasks
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Human-readable text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Await a future, turning a panic into `Err(message)`.
///
/// A panicking handler must not take down the publisher or its siblings.
pub async fn catch_panic<F: Future>(future: F) -> Result<F::Output, String> {
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(payload.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catch_panic_returns_message() {
        let result = catch_panic(async { panic!("handler exploded") }).await;
        assert_eq!(result, Err::<(), _>("handler exploded".to_string()));
    }

    #[tokio::test]
    async fn test_catch_panic_passes_output_through() {
        assert_eq!(catch_panic(async { 7 }).await, Ok(7));
    }

    #[test]
    fn test_formatted_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("code {}", 42)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "code 42");
    }
}
