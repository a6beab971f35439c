use crate::Error;

use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use courier_messaging::connection::Connection;
use courier_messaging::stream::StreamConfig;
use courier_messaging::subject::{
    FULL_WILDCARD, durable_stream_subjects, validate_publish_subject,
};
use courier_messaging::{
    Client, ConsumerOf, DurableSubscription, Message, SubscriptionHandle, handler_fn,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Subjects logged at info level by the listener.
pub const NOTIFICATIONS_SUBJECT: &str = "notifications.*";

/// Stream capturing every subject for the listener's durable consumer.
pub const ALL_MESSAGES_STREAM: &str = "ALL_MESSAGES";

/// Stream that durable publishes are stored in.
pub const MESSAGES_STREAM: &str = "MESSAGES";

const MESSAGES_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Acknowledgement details printed after a durable publish.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Receipt {
    /// Stream that stored the message.
    pub stream: String,

    /// Sequence assigned within the stream.
    pub sequence: u64,

    /// Subject the message was published to.
    pub subject: String,
}

/// Subscriptions held by a running listener.
#[derive(Debug)]
pub struct Listener<C>
where
    C: Connection,
{
    /// Subscription to every subject.
    pub all: SubscriptionHandle,

    /// Subscription to [`NOTIFICATIONS_SUBJECT`], if it could be established.
    pub notifications: Option<SubscriptionHandle>,

    /// Durable consumer on [`ALL_MESSAGES_STREAM`], if it could be established.
    pub durable: Option<DurableSubscription<ConsumerOf<C>>>,
}

/// Starts the global listener.
///
/// [`ALL_MESSAGES_STREAM`] is created or updated to capture every subject before its durable
/// consumer starts. Only the all-subjects subscription is required; the notifications
/// subscription and the durable consumer are logged as warnings when they fail.
///
/// # Errors
///
/// Returns an error if the all-subjects subscription cannot be established.
pub async fn start_listener<C>(client: &Client<C>) -> Result<Listener<C>, Error>
where
    C: Connection,
{
    let all = client
        .subscribe_to_all(handler_fn(|message: Message| async move {
            debug!(subject = %message.subject, data = %message.payload_lossy(), "received message");
            Ok::<(), Infallible>(())
        }))
        .await?;

    let notifications = client
        .subscribe_to_subject(
            NOTIFICATIONS_SUBJECT,
            handler_fn(|message: Message| async move {
                info!(subject = %message.subject, data = %message.payload_lossy(), "received notification");
                Ok::<(), Infallible>(())
            }),
        )
        .await
        .inspect_err(|e| warn!(error = %e, "failed to subscribe to notifications"))
        .ok();

    if let Err(e) = client
        .create_stream(StreamConfig::new(
            ALL_MESSAGES_STREAM,
            vec![FULL_WILDCARD.to_string()],
        ))
        .await
    {
        warn!(stream = ALL_MESSAGES_STREAM, error = %e, "failed to configure stream");
    }

    let durable = client
        .subscribe_to_all_jetstream(
            ALL_MESSAGES_STREAM,
            handler_fn(|message: Message| async move {
                let seq = message.delivery.as_ref().map(|delivery| delivery.stream_sequence);
                debug!(subject = %message.subject, seq, "stored message");
                Ok::<(), Infallible>(())
            }),
        )
        .await
        .inspect_err(|e| warn!(error = %e, "failed to start durable listener"))
        .ok();

    info!(
        notifications = notifications.is_some(),
        durable = durable.is_some(),
        "listener started"
    );

    Ok(Listener {
        all,
        notifications,
        durable,
    })
}

/// Stores `payload` on `subject` in the [`MESSAGES_STREAM`] and waits for the acknowledgement.
///
/// # Errors
///
/// Returns an error if the subject is invalid, the stream cannot be provisioned, or the
/// broker rejects or does not acknowledge the message in time.
pub async fn publish_durably<C>(
    client: &Client<C>,
    subject: &str,
    payload: Bytes,
) -> Result<Receipt, Error>
where
    C: Connection,
{
    validate_publish_subject(subject)?;

    client
        .ensure_stream_with(
            StreamConfig::new(MESSAGES_STREAM, durable_stream_subjects(subject))
                .with_max_age(MESSAGES_MAX_AGE),
        )
        .await?;

    let ack = client.publish_async(subject, payload).await?.await?;

    Ok(Receipt {
        stream: ack.stream,
        sequence: ack.sequence,
        subject: subject.to_string(),
    })
}
