use basedrop::{Collector, Handle};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

static WAIT_INTERVAL: Duration = Duration::from_millis(10);

/// Owns the thread that deallocates retired schedule generations and
/// process contexts.
///
/// Freeing heap memory is not a realtime-safe operation, so nothing is
/// dropped on the audio thread. Retired allocations queue up inside
/// `basedrop` until the audio thread has released its references, and
/// this thread frees them at a regular interval.
pub(crate) struct GarbageCollector {
    handle: Handle,
    run: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl GarbageCollector {
    pub fn new(interval: Duration) -> Self {
        let collector = Collector::new();
        let handle = collector.handle();

        let run = Arc::new(AtomicBool::new(true));
        let run_clone = Arc::clone(&run);

        let thread =
            std::thread::spawn(move || run_garbage_collector(collector, interval, run_clone));

        Self { handle, run, thread: Some(thread) }
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }
}

impl Drop for GarbageCollector {
    fn drop(&mut self) {
        self.run.store(false, Ordering::Relaxed);

        if let Some(thread) = self.thread.take() {
            if let Err(e) = thread.join() {
                log::error!("Failed to join garbage collector thread: {:?}", &e);
            }
        }
    }
}

fn run_garbage_collector(mut collector: Collector, interval: Duration, run: Arc<AtomicBool>) {
    let mut last_collect = Instant::now();

    while run.load(Ordering::Relaxed) {
        if last_collect.elapsed() >= interval {
            collector.collect();

            last_collect = Instant::now();

            log::trace!("Garbage collected");
        }

        std::thread::sleep(WAIT_INTERVAL);
    }

    collector.collect();

    if collector.try_cleanup().is_err() {
        log::error!(
            "Garbage collector was stopped while shared handles still exist. The remaining allocations will leak."
        );
    }
}
