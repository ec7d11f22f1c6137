use std::sync::{Arc, Mutex};

/// Counters accumulated over one archiver operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub files: u64,
    pub dirs: u64,
    pub trees: u64,
    pub blobs: u64,
    pub bytes: u64,
    pub errors: u64,
}

impl Stat {
    pub fn add(&mut self, other: Stat) {
        self.files += other.files;
        self.dirs += other.dirs;
        self.trees += other.trees;
        self.blobs += other.blobs;
        self.bytes += other.bytes;
        self.errors += other.errors;
    }
}

type UpdateFn = dyn Fn(&Stat) + Send + Sync;

/// Shareable progress reporter.
///
/// Workers poke it with per-event deltas; the optional callback observes
/// the running totals. Reporting has no influence on archiver semantics.
#[derive(Clone, Default)]
pub struct Progress {
    inner: Arc<ProgressInner>,
}

#[derive(Default)]
struct ProgressInner {
    totals: Mutex<Stat>,
    on_update: Option<Box<UpdateFn>>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(f: impl Fn(&Stat) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(ProgressInner {
                totals: Mutex::new(Stat::default()),
                on_update: Some(Box::new(f)),
            }),
        }
    }

    /// Add `delta` to the running totals and notify the callback.
    pub fn report(&self, delta: Stat) {
        let totals = {
            let mut totals = self.inner.totals.lock().unwrap();
            totals.add(delta);
            *totals
        };
        if let Some(cb) = &self.inner.on_update {
            cb(&totals);
        }
    }

    /// Snapshot of the current totals.
    pub fn current(&self) -> Stat {
        *self.inner.totals.lock().unwrap()
    }
}
