use super::messages::{BackendCommand, BackendEvent};
use super::orchestrator::Orchestrator;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Long-lived dispatch surface in front of the Orchestrator.
///
/// Downloads and probes run on their own worker tasks so the command loop
/// (and anyone polling `Orchestrator::progress`) stays responsive while a
/// helper process is running.
pub struct BackendActor {
    receiver: mpsc::Receiver<BackendCommand>,
    sender: mpsc::Sender<BackendEvent>,
    orchestrator: Orchestrator,
}

impl BackendActor {
    pub fn new(
        orchestrator: Orchestrator,
        receiver: mpsc::Receiver<BackendCommand>,
        sender: mpsc::Sender<BackendEvent>,
    ) -> Self {
        Self {
            receiver,
            sender,
            orchestrator,
        }
    }

    pub async fn run(mut self) {
        info!("BackendActor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                BackendCommand::ExtractInfo { url } => {
                    let orchestrator = self.orchestrator.clone();
                    let sender = self.sender.clone();
                    tokio::spawn(extract_info(orchestrator, sender, url));
                }
                BackendCommand::StartDownload(request) => {
                    let _ = self
                        .sender
                        .send(BackendEvent::DownloadStarted {
                            url: request.url.clone(),
                        })
                        .await;

                    let orchestrator = self.orchestrator.clone();
                    let sender = self.sender.clone();
                    tokio::spawn(async move {
                        let result = orchestrator.download(request).await;
                        if sender.send(BackendEvent::DownloadFinished(result)).await.is_err() {
                            warn!("Download finished but no one is listening");
                        }
                    });
                }
                BackendCommand::SetFolder(folder) => {
                    self.handle_set_folder(folder).await;
                }
                BackendCommand::Shutdown => {
                    info!("BackendActor shutting down");
                    break;
                }
            }
        }
    }

    async fn handle_set_folder(&self, folder: PathBuf) {
        let result = self
            .orchestrator
            .set_folder(folder.clone())
            .map(|_| folder)
            .map_err(|e| e.to_string());
        let _ = self.sender.send(BackendEvent::FolderChanged(result)).await;
    }
}

async fn extract_info(orchestrator: Orchestrator, sender: mpsc::Sender<BackendEvent>, url: String) {
    let result = orchestrator.probe(&url).await.map_err(|e| e.to_string());
    let _ = sender.send(BackendEvent::ExtractionCompleted(result)).await;
}
