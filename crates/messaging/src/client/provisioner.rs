use super::{Client, StreamOf, wrap};
use crate::connection::Connection;
use crate::context::StreamContext;
use crate::error::{BrokerError, Error, ErrorKind};
use crate::stream::{Stream, StreamConfig};

use tracing::{debug, info};

impl<C> Client<C>
where
    C: Connection,
{
    /// Looks a stream up by name.
    ///
    /// # Errors
    ///
    /// Returns `GetStream` if the stream does not exist or the lookup fails.
    pub async fn get_stream(&self, name: &str) -> Result<StreamOf<C>, Error> {
        self.ensure_connected()?;

        self.streams.get_stream(name).await.map_err(|e| {
            wrap(e, |source| Error::GetStream {
                stream: name.to_string(),
                source,
            })
        })
    }

    /// Creates the stream, or updates its configuration if it already exists.
    ///
    /// # Errors
    ///
    /// Returns `CreateStream` if the broker rejects the configuration.
    pub async fn create_stream(&self, config: StreamConfig) -> Result<StreamOf<C>, Error> {
        self.ensure_connected()?;

        let name = config.name.clone();
        let subjects = config.subjects.clone();

        let stream = self.streams.create_stream(config).await.map_err(|e| {
            wrap(e, |source| Error::CreateStream {
                stream: name.clone(),
                source,
            })
        })?;

        info!(stream = %stream.name(), subjects = ?subjects, "stream created");

        Ok(stream)
    }

    /// Returns the stream named `name`, creating a memory stream for `subjects` if absent.
    ///
    /// An existing stream is returned unchanged even if its subjects differ.
    ///
    /// # Errors
    ///
    /// Returns `GetStream` if the lookup fails for any reason other than absence and
    /// `CreateStream` if creation is rejected.
    pub async fn ensure_stream<S>(&self, name: &str, subjects: &[S]) -> Result<StreamOf<C>, Error>
    where
        S: AsRef<str>,
    {
        let subjects = subjects.iter().map(|s| s.as_ref().to_string()).collect();

        self.ensure_stream_with(StreamConfig::new(name, subjects))
            .await
    }

    /// Like [`Client::ensure_stream`] with a caller-supplied configuration for the create path.
    ///
    /// # Errors
    ///
    /// Returns `GetStream` if the lookup fails for any reason other than absence and
    /// `CreateStream` if creation is rejected.
    pub async fn ensure_stream_with(&self, config: StreamConfig) -> Result<StreamOf<C>, Error> {
        self.ensure_connected()?;

        match self.streams.get_stream(&config.name).await {
            Ok(stream) => {
                debug!(stream = %config.name, "stream already exists");
                return Ok(stream);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(wrap(e, |source| Error::GetStream {
                    stream: config.name.clone(),
                    source,
                }));
            }
        }

        self.create_stream(config).await
    }
}
