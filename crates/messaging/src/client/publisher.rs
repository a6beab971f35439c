use super::{Client, wrap};
use crate::ack::AckFuture;
use crate::connection::Connection;
use crate::context::StreamContext;
use crate::error::{BrokerError, Error, ErrorKind};
use crate::message::Message;
use crate::subject::validate_publish_subject;

use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

impl<C> Client<C>
where
    C: Connection,
{
    /// Sends a message without waiting for any acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when the client is closed or disconnected, `InvalidSubject`
    /// for wildcard or empty subjects and `Publish` when the broker refuses the message.
    pub async fn publish(&self, subject: &str, payload: impl Into<Bytes>) -> Result<(), Error> {
        self.ensure_connected()?;
        validate_publish_subject(subject)?;

        self.connection
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| {
                wrap(e, |source| Error::Publish {
                    subject: subject.to_string(),
                    source,
                })
            })?;

        debug!(subject = %subject, "message published");

        Ok(())
    }

    /// Requests durable storage of a message and returns its acknowledgement future at once.
    ///
    /// The acknowledgement is awaited in the background for at most `ack_wait`.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when the client is closed or disconnected, `InvalidSubject`
    /// for wildcard or empty subjects and `Publish` when the broker refuses the request.
    pub async fn publish_async(
        &self,
        subject: &str,
        payload: impl Into<Bytes>,
    ) -> Result<AckFuture, Error> {
        self.ensure_connected()?;
        validate_publish_subject(subject)?;

        let pending = self
            .streams
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| {
                wrap(e, |source| Error::Publish {
                    subject: subject.to_string(),
                    source,
                })
            })?;

        Ok(AckFuture::watch(
            subject.to_string(),
            pending,
            self.config.ack_wait,
        ))
    }

    /// Sends a request and waits up to `timeout` for the first reply.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when the client is closed or disconnected, `RequestTimeout`
    /// when no reply arrives in time and `Request` for any other broker failure.
    pub async fn request(
        &self,
        subject: &str,
        payload: impl Into<Bytes>,
        timeout: Duration,
    ) -> Result<Message, Error> {
        self.ensure_connected()?;
        validate_publish_subject(subject)?;

        self.connection
            .request(subject.to_string(), payload.into(), timeout)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::TimedOut => Error::RequestTimeout {
                    subject: subject.to_string(),
                    timeout,
                },
                _ => wrap(e, |source| Error::Request {
                    subject: subject.to_string(),
                    source,
                }),
            })
    }
}
