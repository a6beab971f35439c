use crate::Error;
use crate::context::PublishAck;

use std::fmt::Display;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, warn};

/// Resolved outcome of a durable publish.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AckOutcome {
    /// The broker stored the message.
    Acknowledged(PublishAck),

    /// The broker reported an error.
    Rejected(String),

    /// No outcome arrived within the client-side bound.
    TimedOut,
}

/// In-flight outcome of a durably published message.
///
/// A monitor task races the broker acknowledgement against the client-side bound,
/// logs the result and records it here. The task always finishes within the bound.
/// Timing out does not cancel the publish itself.
#[derive(Debug)]
pub struct AckFuture {
    subject: String,
    outcome: watch::Receiver<Option<AckOutcome>>,
}

impl AckFuture {
    pub(crate) fn watch<F, E>(subject: String, pending: F, ack_wait: Duration) -> Self
    where
        F: Future<Output = Result<PublishAck, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (sender, outcome) = watch::channel(None);
        let monitored_subject = subject.clone();

        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(ack_wait, pending).await {
                Ok(Ok(ack)) => {
                    debug!(
                        subject = %monitored_subject,
                        stream = %ack.stream,
                        seq = ack.sequence,
                        "message acknowledged"
                    );
                    AckOutcome::Acknowledged(ack)
                }
                Ok(Err(e)) => {
                    error!(subject = %monitored_subject, error = %e, "error publishing message");
                    AckOutcome::Rejected(e.to_string())
                }
                Err(_) => {
                    warn!(subject = %monitored_subject, "timeout waiting for message acknowledgement");
                    AckOutcome::TimedOut
                }
            };

            sender.send_replace(Some(outcome));
        }
        .in_current_span());

        Self { subject, outcome }
    }

    /// Subject the message was published to.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The outcome, if it has resolved.
    #[must_use]
    pub fn outcome(&self) -> Option<AckOutcome> {
        self.outcome.borrow().clone()
    }

    /// Waits for the outcome.
    pub async fn wait_outcome(&mut self) -> Option<AckOutcome> {
        self.outcome
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| outcome.clone())
    }
}

impl IntoFuture for AckFuture {
    type Output = Result<PublishAck, Error>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(mut self) -> Self::IntoFuture {
        async move {
            match self.wait_outcome().await {
                Some(AckOutcome::Acknowledged(ack)) => Ok(ack),
                Some(AckOutcome::Rejected(reason)) => Err(Error::AckRejected {
                    subject: self.subject,
                    reason,
                }),
                Some(AckOutcome::TimedOut) => Err(Error::AckTimeout {
                    subject: self.subject,
                }),
                None => Err(Error::AckLost {
                    subject: self.subject,
                }),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;

    use tracing_test::traced_test;

    fn ack(sequence: u64) -> PublishAck {
        PublishAck {
            stream: "MESSAGES".to_string(),
            sequence,
            duplicate: false,
        }
    }

    #[tokio::test]
    async fn test_acknowledged() {
        let future = AckFuture::watch(
            "orders.created".to_string(),
            async { Ok::<_, io::Error>(ack(7)) },
            Duration::from_secs(5),
        );

        assert_eq!(future.await.unwrap(), ack(7));
    }

    #[tokio::test]
    async fn test_rejected_is_distinct_from_timeout() {
        let future = AckFuture::watch(
            "orders.created".to_string(),
            async { Err::<PublishAck, _>(io::Error::other("no stream")) },
            Duration::from_secs(5),
        );

        let error = future.await.unwrap_err();
        assert!(matches!(error, Error::AckRejected { ref reason, .. } if reason == "no stream"));
        assert!(!error.is_timeout());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_timeout_when_broker_never_answers() {
        let mut future = AckFuture::watch(
            "orders.created".to_string(),
            futures::future::pending::<Result<PublishAck, io::Error>>(),
            Duration::from_millis(50),
        );

        assert_eq!(future.outcome(), None);
        assert_eq!(future.wait_outcome().await, Some(AckOutcome::TimedOut));
        assert_eq!(future.outcome(), Some(AckOutcome::TimedOut));

        let error = future.await.unwrap_err();
        assert!(matches!(error, Error::AckTimeout { .. }));
        assert!(error.is_timeout());
        assert!(logs_contain("timeout waiting for message acknowledgement"));
    }

    #[tokio::test]
    async fn test_monitor_finishes_without_a_waiter() {
        let future = AckFuture::watch(
            "orders.created".to_string(),
            futures::future::pending::<Result<PublishAck, io::Error>>(),
            Duration::from_millis(20),
        );
        let mut outcome = future.outcome.clone();
        drop(future);

        tokio::time::timeout(Duration::from_secs(1), outcome.wait_for(Option::is_some))
            .await
            .expect("monitor task outlived its bound")
            .unwrap();
    }
}
