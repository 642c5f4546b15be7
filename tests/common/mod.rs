use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use clipcast::backends::scripted::{Event, Journal, ScriptedBackend};
use clipcast::{MediaSource, SourceOpts};

/// Cloneable in-memory sink, so a test can read back what a boxed writer received.
#[derive(Debug, Clone, Default)]
pub struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self
            .0
            .lock()
            .map_err(|_| io::Error::other("sink poisoned"))?;
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn source_for(backend: ScriptedBackend) -> (MediaSource, Journal) {
    source_with_opts(backend, SourceOpts::default())
}

pub fn source_with_opts(backend: ScriptedBackend, opts: SourceOpts) -> (MediaSource, Journal) {
    let journal = backend.journal();
    (MediaSource::new(Arc::new(backend), "movie.mp4", opts), journal)
}

/// Index of the first event matching `pred`.
pub fn position_of(events: &[Event], pred: impl Fn(&Event) -> bool) -> Option<usize> {
    events.iter().position(pred)
}
