pub mod builder;
pub mod handle;
pub mod handlers;
pub mod tools;

mod capture;
mod connection;

pub use builder::VoiceSessionBuilder;
pub use capture::CaptureLevels;
pub use handle::VoiceSession;
pub use handlers::{EventHandler, NavigateContext, ServerContentContext};
pub use tools::ToolInvocation;

use std::collections::HashSet;
use std::sync::Mutex as StdMutex;

use tokio::sync::watch;
use tracing::info;

use crate::audio::PlaybackScheduler;
use crate::types::GroundingSource;

/// Lifecycle of one live session. There is no reconnection: an error is
/// terminal and recovery means starting a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Connected,
    Error(String),
    Closed,
}

/// State shared between the connection task, the capture pipeline and the
/// session handle. All playback mutation funnels through the scheduler
/// mutex; status and sources are append/replace only.
pub(crate) struct SessionShared {
    status_tx: watch::Sender<SessionStatus>,
    pub(crate) scheduler: StdMutex<PlaybackScheduler>,
    sources: StdMutex<SourceLog>,
}

#[derive(Default)]
struct SourceLog {
    seen_uris: HashSet<String>,
    entries: Vec<GroundingSource>,
}

impl SessionShared {
    pub(crate) fn new(scheduler: PlaybackScheduler) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Connecting);
        Self {
            status_tx,
            scheduler: StdMutex::new(scheduler),
            sources: StdMutex::new(SourceLog::default()),
        }
    }

    pub(crate) fn set_status(&self, status: SessionStatus) {
        info!(?status, "session status changed");
        self.status_tx.send_replace(status);
    }

    pub(crate) fn status(&self) -> SessionStatus {
        self.status_tx.borrow().clone()
    }

    pub(crate) fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Records grounding sources, dropping any URI already seen this session.
    /// Returns the number of new entries.
    pub(crate) fn add_sources(&self, sources: impl IntoIterator<Item = GroundingSource>) -> usize {
        let mut log = self.sources.lock().expect("source log poisoned");
        let mut added = 0;
        for source in sources {
            if log.seen_uris.insert(source.uri.clone()) {
                log.entries.push(source);
                added += 1;
            }
        }
        added
    }

    pub(crate) fn sources_snapshot(&self) -> Vec<GroundingSource> {
        self.sources.lock().expect("source log poisoned").entries.clone()
    }
}
