use crate::message::Message;

use std::error::Error as StdError;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Marker trait for handler errors.
pub trait SubscriptionHandlerError: StdError + Send + Sync + 'static {}

/// Processes messages delivered to a subscription or durable consumer.
#[async_trait]
pub trait SubscriptionHandler
where
    Self: Clone + Send + Sync + 'static,
{
    /// The error type for the handler.
    type Error: SubscriptionHandlerError;

    /// Handles one message. For durable consumers `Ok` acknowledges it.
    async fn handle(&self, message: Message) -> Result<(), Self::Error>;
}

/// Error returned by closure handlers.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct FnHandlerError(Box<dyn StdError + Send + Sync>);

impl SubscriptionHandlerError for FnHandlerError {}

/// Handler backed by an async closure.
pub struct FnHandler<F> {
    f: Arc<F>,
}

impl<F> Clone for FnHandler<F> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<F> Debug for FnHandler<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Wraps an async closure as a [`SubscriptionHandler`].
pub fn handler_fn<F, Fut, E>(f: F) -> FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync>> + Send + 'static,
{
    FnHandler { f: Arc::new(f) }
}

#[async_trait]
impl<F, Fut, E> SubscriptionHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<Box<dyn StdError + Send + Sync>> + Send + 'static,
{
    type Error = FnHandlerError;

    async fn handle(&self, message: Message) -> Result<(), Self::Error> {
        (self.f)(message)
            .await
            .map_err(|e| FnHandlerError(e.into()))
    }
}
