use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};

use crate::engine::audio_thread::EngineAudioThread;
use crate::engine::events::from_engine::EngineEvent;
use crate::engine::events::to_engine::EngineRequest;
use crate::engine::main_thread::{EngineMainThread, EngineSettings};

/// Spawns the engine on its own thread and talks to it over channels.
///
/// Returns the receiving end of the engine's event stream and the audio
/// thread counterpart; send the [`EngineAudioThread`] to your realtime
/// audio thread. Dropping the handle shuts the engine thread down and
/// joins it.
pub struct EngineHandle {
    to_engine_tx: Sender<EngineRequest>,

    engine_thread: Option<JoinHandle<()>>,
    run_engine_thread: Arc<AtomicBool>,
}

impl EngineHandle {
    pub fn new(settings: EngineSettings) -> (Self, Receiver<EngineEvent>, EngineAudioThread) {
        let (event_tx, event_rx) = unbounded::<EngineEvent>();
        let (to_engine_tx, to_engine_rx) = unbounded::<EngineRequest>();

        let (engine, audio_thread) = EngineMainThread::new(settings);

        let run_engine_thread = Arc::new(AtomicBool::new(true));
        let run_engine_thread_clone = Arc::clone(&run_engine_thread);

        let engine_thread =
            thread::spawn(move || engine.run(to_engine_rx, event_tx, run_engine_thread_clone));

        (
            Self { to_engine_tx, engine_thread: Some(engine_thread), run_engine_thread },
            event_rx,
            audio_thread,
        )
    }

    /// Send a request to the engine.
    ///
    /// Note that the engine may decide to ignore invalid requests.
    pub fn send(&mut self, request: EngineRequest) {
        if self.to_engine_tx.send(request).is_err() {
            log::error!("Engine thread is no longer running");
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.run_engine_thread.store(false, Ordering::Relaxed);

        if let Some(engine_thread) = self.engine_thread.take() {
            if let Err(e) = engine_thread.join() {
                log::error!("Failed to join engine thread: {:?}", &e);
            }
        }
    }
}
