use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Base subscriber that logs events to stdout.
///
/// Enabled via the `logging` feature. Useful for demos and debugging.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::JobFinished => {
                println!("[job-finished] job={:?}", e.name);
            }
            EventKind::Progress => {
                if let Some(p) = e.progress {
                    println!("[progress] {p}%");
                }
            }
            EventKind::Finished => {
                println!("[finished]");
            }
            EventKind::Stopped => {
                println!("[stopped]");
            }
            EventKind::Failed => {
                println!("[failed] error={:?}", e.error.map(|err| err.as_label()));
            }
            EventKind::SessionFinished => {
                println!("[session-finished] session={:?}", e.session);
            }
            EventKind::SessionProgress => {
                if let Some(p) = e.progress {
                    println!("[session-progress] {p}%");
                }
            }
            EventKind::SessionStopped => {
                println!("[session-stopped] session={:?}", e.session);
            }
            EventKind::SessionFailed => {
                println!(
                    "[session-failed] session={:?} error={:?}",
                    e.session,
                    e.error.map(|err| err.as_label())
                );
            }
            EventKind::AllSessionsFinished => {
                println!("[all-sessions-finished]");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
