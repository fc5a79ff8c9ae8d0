//! Background thread copying PTY output into a tab's transcript.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::terminal::Transcript;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Output captured from one PTY.
#[derive(Debug)]
pub struct Capture {
    /// Interpreted output.
    pub transcript: Transcript,

    /// Last read error, if the pump stopped because of one.
    pub error: Option<String>,
}

/// Reader thread feeding a shared [`Capture`].
pub struct OutputPump {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl OutputPump {
    /// Start pumping `source` into `capture`.
    pub fn spawn(mut source: Box<dyn Read + Send>, capture: Arc<Mutex<Capture>>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let (thread_shutdown, thread_closed) = (shutdown.clone(), closed.clone());

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 4096];

            while !thread_shutdown.load(Ordering::Relaxed) {
                match source.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let mut capture = capture.lock().unwrap_or_else(|e| e.into_inner());
                        capture.transcript.process(&buf[..n]);
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(10));
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        // Linux reports EIO once the slave side has closed.
                        if e.raw_os_error() != Some(libc::EIO) {
                            let mut capture = capture.lock().unwrap_or_else(|e| e.into_inner());
                            capture.error = Some(e.to_string());
                        }
                        break;
                    }
                }
            }

            thread_closed.store(true, Ordering::Release);
            tracing::debug!("pty output pump stopped");
        });

        Self {
            handle: Some(handle),
            shutdown,
            closed,
        }
    }

    /// Whether the PTY has closed, which happens when the shell exits.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Ask the thread to stop after its current read.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Drop for OutputPump {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            // A blocked read only returns once the PTY closes; detach rather than wait forever.
            let start = Instant::now();
            while !handle.is_finished() && start.elapsed() < Duration::from_millis(100) {
                std::thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                tracing::debug!("pty output pump still blocked, detaching");
            }
        }
    }
}

impl std::fmt::Debug for OutputPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputPump")
            .field("closed", &self.is_closed())
            .finish()
    }
}
