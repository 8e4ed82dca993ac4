//! Detached cache population. Responses handed to the writer are stored on a
//! dedicated thread so callers never wait on storage I/O.

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::cache::Cache;
use crate::error::is_stale_generation;
use crate::http::RequestKey;
use crate::io::Response;
use crate::{log_debug, log_error, Result};

enum Job {
    Store {
        generation: String,
        key: RequestKey,
        response: Response,
    },
    Flush(Sender<()>),
}

pub struct BackgroundWriter {
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWriter {
    pub fn spawn<C: Cache + Send + Sync + 'static>(storage: Arc<C>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name("swcache-writer".to_string())
            .spawn(move || {
                for job in receiver {
                    match job {
                        Job::Store {
                            generation,
                            key,
                            response,
                        } => match storage.set(&generation, &key, &response) {
                            Ok(()) => log_debug!("Cached {} in {}", key, generation),
                            Err(err) if is_stale_generation(&err) => {
                                log_debug!("Dropped write for {}, {} was swept", key, generation)
                            }
                            Err(err) => log_error!("Cache put failed for {}: {:#}", key, err),
                        },
                        Job::Flush(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
            })?;
        Ok(BackgroundWriter {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Queue a write. Never blocks and never reports failure to the caller.
    pub fn store(&self, generation: String, key: RequestKey, response: Response) {
        let job = Job::Store {
            generation,
            key,
            response,
        };
        if let Some(sender) = &self.sender {
            if sender.send(job).is_err() {
                log_error!("Background cache writer is gone, dropping write");
            }
        }
    }

    /// Blocks until every write queued before this call has been attempted.
    pub fn flush(&self) {
        let (ack, done) = mpsc::channel();
        if let Some(sender) = &self.sender {
            if sender.send(Job::Flush(ack)).is_ok() {
                let _ = done.recv();
            }
        }
    }
}

impl Drop for BackgroundWriter {
    fn drop(&mut self) {
        // Closing the channel lets the thread drain pending writes and exit.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
