use std::sync::Arc;

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{Instrument, info_span};

use crate::{
    config::SyncConfig,
    errors::Error,
    io::sink::SurfaceFactory,
    models::session_params::SessionParameters,
    providers::{FeedProvider, HistoricalProvider},
    sync::{
        driver::{Command, Driver},
        status::SessionStatus,
    },
};

const COMMAND_BUFFER: usize = 32;

/// Everything a synchronizer needs before it starts.
pub struct Synchronizer {
    config: SyncConfig,
    historical: Arc<dyn HistoricalProvider>,
    feed: Arc<dyn FeedProvider>,
    surface: Arc<dyn SurfaceFactory>,
}

impl Synchronizer {
    pub fn new(
        config: SyncConfig,
        historical: Arc<dyn HistoricalProvider>,
        feed: Arc<dyn FeedProvider>,
        surface: Arc<dyn SurfaceFactory>,
    ) -> Self {
        Self {
            config,
            historical,
            feed,
            surface,
        }
    }

    /// Starts the driver task. Must be called inside a tokio runtime.
    ///
    /// Nothing is loaded until the first [`SynchronizerHandle::set_params`].
    pub fn spawn(self) -> SynchronizerHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());

        let driver = Driver::new(
            self.config,
            self.historical,
            self.feed,
            self.surface,
            commands_rx,
            status_tx,
        );
        let task = tokio::spawn(driver.run().instrument(info_span!("synchronizer")));

        SynchronizerHandle {
            commands: commands_tx,
            status: status_rx,
            task,
        }
    }
}

/// Control side of a running synchronizer.
///
/// Dropping the handle without [`SynchronizerHandle::shutdown`] still stops the driver
/// and closes the session, just without waiting for it.
pub struct SynchronizerHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
    task: JoinHandle<()>,
}

impl SynchronizerHandle {
    /// Replaces the active session with one for `params`.
    pub async fn set_params(&self, params: SessionParameters) -> Result<(), Error> {
        self.commands
            .send(Command::SetParams(params))
            .await
            .map_err(|_| Error::Stopped)
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn snapshot(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Waits until the published status satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionStatus) -> bool,
    ) -> Result<SessionStatus, Error> {
        let mut status = self.status.clone();
        let matched = status
            .wait_for(predicate)
            .await
            .map_err(|_| Error::Stopped)?;
        Ok(matched.clone())
    }

    /// Closes the active session and waits for the driver to exit.
    pub async fn shutdown(self) -> Result<(), Error> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        self.task.await.map_err(|_| Error::Stopped)
    }
}
