//! Loading / error / data tracking around a single async API call.
//!
//! A `RequestSlot` owns one operation and the state of its latest run.
//! Front ends read `state()` or watch `subscribe()` to render a spinner,
//! the result, or a ready-to-display error message.

use std::future::Future;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use tracing::debug;

use crate::api::ApiError;

type Operation<P, T> = Box<dyn Fn(P) -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

/// State of the latest run. Once settled, `data` and `error` are never both set.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestState<T> {
    pub data: Option<T>,
    pub error: Option<String>,
    pub is_loading: bool,
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
        }
    }
}

pub struct RequestSlot<P, T> {
    op: Operation<P, T>,
    state: watch::Sender<RequestState<T>>,
}

impl<P, T> RequestSlot<P, T>
where
    T: Clone,
{
    pub fn new<F, Fut>(op: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let (state, _) = watch::channel(RequestState::default());
        Self {
            op: Box::new(move |params| op(params).boxed()),
            state,
        }
    }

    pub fn state(&self) -> RequestState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState<T>> {
        self.state.subscribe()
    }

    /// Run the operation. Data from the previous run stays visible while
    /// loading. Errors are recorded as display text and returned unchanged.
    /// Overlapping runs are not guarded against; whichever settles last wins.
    pub async fn trigger(&self, params: P) -> Result<T, ApiError> {
        self.state.send_modify(|state| {
            state.is_loading = true;
            state.error = None;
        });

        match (self.op)(params).await {
            Ok(data) => {
                self.state.send_replace(RequestState {
                    data: Some(data.clone()),
                    error: None,
                    is_loading: false,
                });
                Ok(data)
            }
            Err(e) => {
                let message = e.user_message();
                debug!(error = %message, "Request failed");
                self.state.send_replace(RequestState {
                    data: None,
                    error: Some(message),
                    is_loading: false,
                });
                Err(e)
            }
        }
    }

    /// Back to the initial idle state
    pub fn reset(&self) {
        self.state.send_replace(RequestState::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::GENERIC_ERROR_MESSAGE;
    use std::time::Duration;

    fn sleeper() -> RequestSlot<(u32, u64), u32> {
        RequestSlot::new(|(value, millis): (u32, u64)| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok::<_, ApiError>(value)
        })
    }

    #[tokio::test]
    async fn test_success_sets_data() {
        let slot = RequestSlot::new(|n: u32| async move { Ok::<_, ApiError>(n * 2) });
        assert_eq!(slot.state(), RequestState::default());

        assert_eq!(slot.trigger(21).await.expect("trigger"), 42);
        assert_eq!(
            slot.state(),
            RequestState {
                data: Some(42),
                error: None,
                is_loading: false,
            }
        );
    }

    #[tokio::test]
    async fn test_error_uses_server_message_and_is_reraised() {
        let slot = RequestSlot::new(|fail: bool| async move {
            if fail {
                Err(ApiError::from_status(400, br#"{"success":false,"message":"Vehicle already booked"}"#))
            } else {
                Ok("booked".to_string())
            }
        });

        slot.trigger(false).await.expect("first run succeeds");
        let err = slot.trigger(true).await.unwrap_err();
        assert_eq!(err.status(), Some(400));

        let state = slot.state();
        assert_eq!(state.error.as_deref(), Some("Vehicle already booked"));
        assert_eq!(state.data, None);
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_error_without_server_message_uses_display_text() {
        let slot: RequestSlot<(), ()> =
            RequestSlot::new(|_| async { Err(ApiError::InvalidResponse("truncated body".to_string())) });
        assert!(slot.trigger(()).await.is_err());

        let message = slot.state().error.expect("error recorded");
        assert!(message.contains("truncated body"));
        assert_ne!(message, GENERIC_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_stale_data_visible_while_loading() {
        let slot = sleeper();
        slot.trigger((1, 0)).await.expect("first run");

        let observe = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            slot.state()
        };
        let (result, during) = tokio::join!(slot.trigger((2, 100)), observe);

        assert!(during.is_loading);
        assert_eq!(during.data, Some(1));
        assert_eq!(during.error, None);
        assert_eq!(result.expect("second run"), 2);
        assert_eq!(slot.state().data, Some(2));
    }

    #[tokio::test]
    async fn test_overlapping_runs_last_settled_wins() {
        let slot = sleeper();
        let (slow, fast) = tokio::join!(slot.trigger((1, 80)), slot.trigger((2, 10)));
        assert_eq!(slow.expect("slow"), 1);
        assert_eq!(fast.expect("fast"), 2);
        assert_eq!(slot.state().data, Some(1));
        assert!(!slot.state().is_loading);
    }

    #[tokio::test]
    async fn test_subscribe_and_reset() {
        let slot = RequestSlot::new(|n: u32| async move { Ok::<_, ApiError>(n) });
        let mut rx = slot.subscribe();

        slot.trigger(7).await.expect("trigger");
        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(rx.borrow_and_update().data, Some(7));

        slot.reset();
        assert_eq!(slot.state(), RequestState::default());
    }
}
