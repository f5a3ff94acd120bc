use crossbeam::channel::{bounded, select, tick, Sender};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::search_index::SearchIndex;

/// Background thread refreshing one index on a fixed period. Holds only a weak
/// reference, so dropping the index ends the loop.
pub struct Refresher {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Refresher {
    pub fn spawn(index: Weak<SearchIndex>, interval: Duration) -> Result<Self> {
        let (stop, stopped) = bounded::<()>(1);
        let name = index.upgrade().map(|i| i.name().to_string()).unwrap_or_default();

        let handle = thread::Builder::new()
            .name(format!("refresh-{}", name))
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(stopped) -> _ => break,
                        recv(ticker) -> _ => {
                            let Some(index) = index.upgrade() else { break };
                            if index.refresh_if_needed() {
                                trace!(index = %index.name(), "scheduled refresh");
                            }
                        }
                    }
                }
                debug!(index = %name, "refresher stopped");
            })
            .map_err(|e| Error::new(ErrorKind::Internal, format!("failed to spawn refresher: {}", e)))?;

        Ok(Refresher {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            // The last strong reference may be released on the refresher thread itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
