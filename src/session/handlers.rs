//! Event handler plumbing for the session.
//!
//! Handlers are plain async functions taking a context and the shared
//! application state; the blanket impl lets callers pass closures or fn
//! items directly to the builder.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::types::ServerContent;

/// Context for a remote-requested navigation.
#[derive(Debug, Clone)]
pub struct NavigateContext {
    /// Path the model asked to open, e.g. `/medications`. Passed through
    /// unvalidated; routing is the embedder's concern.
    pub page: String,
}

/// Context delivered for every server content frame (text parts,
/// transcription, turn signals).
#[derive(Debug, Clone)]
pub struct ServerContentContext {
    pub content: ServerContent,
}

pub trait EventHandler<C, S>: Send + Sync {
    fn handle(&self, ctx: C, state: Arc<S>) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

impl<F, Fut, C, S> EventHandler<C, S> for F
where
    F: Fn(C, Arc<S>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
    C: Send + 'static,
    S: Send + Sync + 'static,
{
    fn handle(&self, ctx: C, state: Arc<S>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(self(ctx, state))
    }
}

/// Handler set registered through the builder.
pub(crate) struct Handlers<S> {
    pub(crate) on_navigate: Option<Arc<dyn EventHandler<NavigateContext, S>>>,
    pub(crate) on_server_content: Option<Arc<dyn EventHandler<ServerContentContext, S>>>,
}

impl<S> Default for Handlers<S> {
    fn default() -> Self {
        Self {
            on_navigate: None,
            on_server_content: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn closures_satisfy_the_handler_trait() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handler: Arc<dyn EventHandler<NavigateContext, AtomicUsize>> =
            Arc::new(|ctx: NavigateContext, state: Arc<AtomicUsize>| async move {
                assert_eq!(ctx.page, "/dashboard");
                state.fetch_add(1, Ordering::SeqCst);
            });
        handler
            .handle(
                NavigateContext {
                    page: "/dashboard".to_string(),
                },
                Arc::clone(&counter),
            )
            .await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
