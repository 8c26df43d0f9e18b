use bluestem::{
    DataKind, EngineHandle, EngineMainThread, EngineRequest, EngineSettings, EngineEvent,
    GainProcessor, NoteEvent, PortConfig, PortId, ProcessContext, Processor, ProcessorConfig,
    ProjectUpdate, ToneGeneratorProcessor,
};
use std::time::Duration;

const SAMPLE_RATE: f64 = 44_100.0;

/// Interleaved stereo scratch buffer for `frames` frames.
fn stereo_buffer(frames: usize) -> Vec<f32> {
    vec![0.0; frames * 2]
}

fn left_channel(interleaved: &[f32]) -> impl Iterator<Item = f32> + '_ {
    interleaved.iter().copied().step_by(2)
}

fn count_zero_crossings(samples: impl Iterator<Item = f32>) -> usize {
    let mut crossings = 0;
    let mut previous_negative = None;

    for sample in samples {
        let negative = sample < 0.0;
        if let Some(previous) = previous_negative {
            if previous != negative {
                crossings += 1;
            }
        }
        previous_negative = Some(negative);
    }

    crossings
}

fn max_abs(samples: impl Iterator<Item = f32>) -> f32 {
    samples.fold(0.0, |max, s| max.max(s.abs()))
}

#[test]
fn compiled_graph_renders_a_sine_into_the_master_output() {
    let (mut engine, mut audio_thread) = EngineMainThread::new(EngineSettings::default());
    let master = engine.master_output_node_id();

    let tone = engine.add_node(Box::new(ToneGeneratorProcessor::new()));
    engine.connect(PortId::audio_out(tone, 0), PortId::audio_in(master, 0)).unwrap();
    engine.compile_processing_graph().unwrap();

    let mut out = stereo_buffer(128);
    audio_thread.process_interleaved(&mut out, 2);

    // 440Hz at 0.125 amplitude, phase starting at zero.
    let mut phase: f64 = 0.0;
    for frame in 0..128 {
        let expected = 0.125 * (std::f32::consts::TAU * phase as f32).sin();

        let left = out[frame * 2];
        let right = out[frame * 2 + 1];

        assert!(
            (left - expected).abs() < 1e-3,
            "frame {}: expected {}, got {}",
            frame,
            expected,
            left,
        );
        assert_eq!(left, right);

        phase = (phase + 440.0 / SAMPLE_RATE).fract();
    }

    assert!((out[0]).abs() < 1e-6, "the first sample of the first block is sin(0)");
}

#[test]
fn disconnecting_the_oscillator_silences_the_master_output() {
    let (mut engine, mut audio_thread) = EngineMainThread::new(EngineSettings::default());
    let master = engine.master_output_node_id();

    let tone = engine.add_node(Box::new(ToneGeneratorProcessor::new()));
    let connection =
        engine.connect(PortId::audio_out(tone, 0), PortId::audio_in(master, 0)).unwrap();
    engine.compile_processing_graph().unwrap();

    let mut out = stereo_buffer(512);
    audio_thread.process_interleaved(&mut out, 2);
    assert!(max_abs(out.iter().copied()) > 0.05);

    engine.disconnect(connection).unwrap();
    engine.compile_processing_graph().unwrap();

    audio_thread.process_interleaved(&mut out, 2);
    assert!(out.iter().all(|s| *s == 0.0));
}

#[test]
fn note_events_override_the_frequency_parameter() {
    let (mut engine, mut audio_thread) = EngineMainThread::new(EngineSettings::default());
    let master = engine.master_output_node_id();

    let tone = engine.add_node(Box::new(ToneGeneratorProcessor::new()));
    engine.connect(PortId::audio_out(tone, 0), PortId::audio_in(master, 0)).unwrap();
    engine.compile_processing_graph().unwrap();

    // 0.1 seconds per buffer. A sine of frequency f crosses zero about
    // 2 * f * 0.1 times in one buffer.
    let frames = 4_410;
    let mut out = stereo_buffer(frames);

    engine.set_parameter_value(tone, 0, 880.0).unwrap();

    // First buffer absorbs the parameter ramp, second is settled.
    audio_thread.process_interleaved(&mut out, 2);
    audio_thread.process_interleaved(&mut out, 2);
    let crossings = count_zero_crossings(left_channel(&out));
    assert!((160..=190).contains(&crossings), "expected ~176 crossings, got {}", crossings);

    // A4 overrides the parameter for as long as the note is held.
    engine.send_note_event(tone, 0, NoteEvent::NoteOn { pitch: 69, velocity: 0.8 }).unwrap();
    audio_thread.process_interleaved(&mut out, 2);
    let crossings = count_zero_crossings(left_channel(&out));
    assert!((80..=96).contains(&crossings), "expected ~88 crossings, got {}", crossings);

    // Note off hands control back to the (still 880Hz) parameter.
    engine.send_note_event(tone, 0, NoteEvent::NoteOff { pitch: 69 }).unwrap();
    audio_thread.process_interleaved(&mut out, 2);
    let crossings = count_zero_crossings(left_channel(&out));
    assert!((160..=190).contains(&crossings), "expected ~176 crossings, got {}", crossings);
}

/// Emits a note-on for A5 at the start of every block. Used to exercise
/// note event flow across a connection.
struct NotePulseProcessor {
    config: ProcessorConfig,
}

impl NotePulseProcessor {
    fn new() -> Self {
        let mut config = ProcessorConfig::new("NotePulse");
        config.add_note_event_output(PortConfig::new(DataKind::NoteEvent, 0));
        Self { config }
    }
}

impl Processor for NotePulseProcessor {
    fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    fn process(&mut self, context: &ProcessContext, _frames: usize) {
        context.note_event_output(0).push(NoteEvent::NoteOn { pitch: 81, velocity: 1.0 });
    }
}

#[test]
fn note_events_flow_across_connections() {
    let (mut engine, mut audio_thread) = EngineMainThread::new(EngineSettings::default());
    let master = engine.master_output_node_id();

    let pulse = engine.add_node(Box::new(NotePulseProcessor::new()));
    let tone = engine.add_node(Box::new(ToneGeneratorProcessor::new()));

    engine.connect(PortId::note_out(pulse, 0), PortId::note_in(tone, 0)).unwrap();
    engine.connect(PortId::audio_out(tone, 0), PortId::audio_in(master, 0)).unwrap();
    engine.compile_processing_graph().unwrap();

    // A5 is 880Hz, double the oscillator's 440Hz default.
    let mut out = stereo_buffer(4_410);
    audio_thread.process_interleaved(&mut out, 2);

    let crossings = count_zero_crossings(left_channel(&out));
    assert!((160..=190).contains(&crossings), "expected ~176 crossings, got {}", crossings);
}

#[test]
fn fan_in_connections_sum_into_the_destination_port() {
    let (mut engine, mut audio_thread) = EngineMainThread::new(EngineSettings::default());
    let master = engine.master_output_node_id();

    let tone_a = engine.add_node(Box::new(ToneGeneratorProcessor::new()));
    let tone_b = engine.add_node(Box::new(ToneGeneratorProcessor::new()));

    engine.connect(PortId::audio_out(tone_a, 0), PortId::audio_in(master, 0)).unwrap();
    engine.connect(PortId::audio_out(tone_b, 0), PortId::audio_in(master, 0)).unwrap();
    engine.compile_processing_graph().unwrap();

    let mut out = stereo_buffer(4_410);
    audio_thread.process_interleaved(&mut out, 2);

    // Two phase-aligned oscillators at 0.125 amplitude sum to 0.25.
    let peak = max_abs(out.iter().copied());
    assert!(peak > 0.2, "expected the two oscillators to sum, peak was {}", peak);
    assert!(peak < 0.3);
}

#[test]
fn failed_compile_keeps_the_previous_generation_running() {
    let (mut engine, mut audio_thread) = EngineMainThread::new(EngineSettings::default());
    let master = engine.master_output_node_id();

    let tone = engine.add_node(Box::new(ToneGeneratorProcessor::new()));
    engine.connect(PortId::audio_out(tone, 0), PortId::audio_in(master, 0)).unwrap();
    engine.compile_processing_graph().unwrap();

    // Introduce a cycle, which must fail to compile.
    let gain_a = engine.add_node(Box::new(GainProcessor::new()));
    let gain_b = engine.add_node(Box::new(GainProcessor::new()));
    engine.connect(PortId::audio_out(gain_a, 0), PortId::audio_in(gain_b, 0)).unwrap();
    engine.connect(PortId::audio_out(gain_b, 0), PortId::audio_in(gain_a, 0)).unwrap();

    assert!(engine.compile_processing_graph().is_err());

    // The oscillator from the last good generation is still audible.
    let mut out = stereo_buffer(4_410);
    audio_thread.process_interleaved(&mut out, 2);

    let crossings = count_zero_crossings(left_channel(&out));
    assert!((80..=96).contains(&crossings), "expected ~88 crossings, got {}", crossings);
}

#[test]
fn recompiling_under_load_does_not_disturb_the_audio_thread() {
    let (mut engine, mut audio_thread) = EngineMainThread::new(EngineSettings::default());
    let master = engine.master_output_node_id();

    let tone = engine.add_node(Box::new(ToneGeneratorProcessor::new()));
    engine.connect(PortId::audio_out(tone, 0), PortId::audio_in(master, 0)).unwrap();
    engine.compile_processing_graph().unwrap();

    let audio = std::thread::spawn(move || {
        let mut out = stereo_buffer(512);
        for _ in 0..400 {
            audio_thread.process_interleaved(&mut out, 2);
        }
        out
    });

    // Hammer the control thread with recompiles while the audio thread
    // renders blocks against whichever generation is current.
    for _ in 0..60 {
        let gain = engine.add_node(Box::new(GainProcessor::new()));
        engine.connect(PortId::audio_out(gain, 0), PortId::audio_in(master, 0)).unwrap();
        engine.compile_processing_graph().unwrap();

        engine.remove_node(gain).unwrap();
        engine.compile_processing_graph().unwrap();
    }

    let out = audio.join().unwrap();
    assert!(out.iter().all(|s| s.is_finite()));
}

#[test]
fn project_model_updates_are_reflected_into_the_topology() {
    let (mut engine, mut audio_thread) = EngineMainThread::new(EngineSettings::default());

    let id = engine
        .load_project(r#"{"id": 42, "song": {"tracks": [{"id": 1, "name": "Lead"}]}}"#)
        .unwrap();
    assert_eq!(id, 42);

    // A malformed model is rejected and the previous project survives.
    assert!(engine.load_project("{this is not json").is_err());
    assert_eq!(engine.project().unwrap().id, 42);

    engine.update_project(&ProjectUpdate::AddToneGenerator { track_id: 1 }).unwrap();

    let track = engine.project().unwrap().track(1).unwrap();
    assert!(track.generator_node.is_some());
    assert!(engine.dump_topology().contains("ToneGenerator"));

    engine.compile_processing_graph().unwrap();

    let mut out = stereo_buffer(4_410);
    audio_thread.process_interleaved(&mut out, 2);
    assert!(max_abs(out.iter().copied()) > 0.05);
}

#[test]
fn engine_handle_round_trip() {
    let (mut handle, event_rx, _audio_thread) = EngineHandle::new(EngineSettings::default());

    handle.send(EngineRequest::CompileProcessingGraph);

    match event_rx.recv_timeout(Duration::from_secs(5)).unwrap() {
        EngineEvent::GraphCompiled { generation } => assert!(generation >= 2),
        event => panic!("expected GraphCompiled, got {:?}", event),
    }

    handle.send(EngineRequest::DumpSchedule);

    match event_rx.recv_timeout(Duration::from_secs(5)).unwrap() {
        EngineEvent::ScheduleDump(dump) => {
            assert!(dump.contains("ProcessNodeTask(MasterOutput"), "unexpected dump: {}", dump)
        }
        event => panic!("expected ScheduleDump, got {:?}", event),
    }
}
