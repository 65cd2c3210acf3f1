use crate::domain::StatusView;
use crate::reconciler::reconciler::{Credentials, Reconciler};
use thiserror::Error;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

#[derive(Debug)]
pub enum ReconcilerCommand {
    Track(Vec<String>),
    Credentials(Option<Credentials>),
    Dispose,
}

#[derive(Error, Debug)]
#[error("the reconciler is no longer running")]
pub struct ReconcilerStopped;

/// Owning side of a running reconciler. Dropping it tears the reconciler down.
#[derive(Debug)]
pub struct ReconcilerHandle {
    commands: Sender<ReconcilerCommand>,
    status: watch::Receiver<StatusView>,
    task: JoinHandle<()>,
}

pub fn spawn(reconciler: Reconciler, buffer_size: usize) -> ReconcilerHandle {
    let (commands, rx) = mpsc::channel(buffer_size);
    let status = reconciler.watch();
    let task = tokio::spawn(run(reconciler, rx));

    ReconcilerHandle { commands, status, task }
}

impl ReconcilerHandle {
    pub fn status(&self) -> watch::Receiver<StatusView> {
        self.status.clone()
    }

    pub async fn track(&self, phone_ids: Vec<String>) -> Result<(), ReconcilerStopped> {
        self.send(ReconcilerCommand::Track(phone_ids)).await
    }

    pub async fn set_credentials(&self, credentials: Option<Credentials>) -> Result<(), ReconcilerStopped> {
        self.send(ReconcilerCommand::Credentials(credentials)).await
    }

    /// Tears the reconciler down and waits for its task to finish.
    pub async fn dispose(self) {
        self.commands.send(ReconcilerCommand::Dispose).await.unwrap_or_default();
        if let Err(e) = self.task.await {
            debug!("Reconciler task ended abnormally: {}", e);
        }
    }

    async fn send(&self, command: ReconcilerCommand) -> Result<(), ReconcilerStopped> {
        self.commands.send(command).await.map_err(|_| ReconcilerStopped)
    }
}

#[instrument(skip_all)]
async fn run(mut reconciler: Reconciler, mut rx: Receiver<ReconcilerCommand>) {
    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(ReconcilerCommand::Track(phone_ids)) => reconciler.set_requested(phone_ids),
                Some(ReconcilerCommand::Credentials(credentials)) => reconciler.set_credentials(credentials),
                Some(ReconcilerCommand::Dispose) | None => {
                    reconciler.teardown();
                    return;
                }
            },
            Some(event) = reconciler.next_event() => reconciler.handle_event(event),
        }
    }
}
