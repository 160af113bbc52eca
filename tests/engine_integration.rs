//! End-to-end scenarios driving [`vortex_core::Engine`] the way a real
//! frontend would: spawn coroutine work, submit render commands, wire
//! up a graph, and tick frames against a [`NullBackend`].

use std::time::Duration;

use vortex_core::{BackendKind, Engine, NullBackend, RenderPassSpec, RendererBackend};

fn backend() -> NullBackend {
    NullBackend::new()
}

#[test]
fn tasks_submitted_before_a_frame_are_resumed_during_process_frame() {
    let mut engine = Engine::default();
    let mut backend = backend();

    let counter = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    for _ in 0..4 {
        let counter = counter.clone();
        engine.scheduler.spawn(move |_cx| async move {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
    }

    let (tasks_resumed, _) = engine.process_frame(1.0 / 60.0, Duration::from_millis(8), &mut backend);
    assert!(tasks_resumed > 0);
    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 4);
}

#[test]
fn queued_render_commands_are_drained_against_the_backend_each_frame() {
    let mut engine = Engine::default();
    let mut backend = backend();

    engine.render_queue.submit_set_viewport(0, 0, 1920, 1080);
    engine.render_queue.submit_clear(
        vx_render::ClearFlags::COLOR | vx_render::ClearFlags::DEPTH,
        [0.0, 0.0, 0.0, 1.0],
        1.0,
        0,
    );

    let (_, commands_executed) = engine.process_frame(1.0 / 60.0, Duration::from_millis(8), &mut backend);
    assert_eq!(commands_executed, 2);
    assert_eq!(engine.render_queue.stats().processed, 2);
}

#[test]
fn a_graph_with_two_passes_executes_both_every_frame() {
    let mut engine = Engine::default();
    let mut backend = backend();

    assert!(engine.graph.add_pass(RenderPassSpec::new("opaque")));
    assert!(engine.graph.add_pass(RenderPassSpec::new("ui")));

    for _ in 0..3 {
        engine.process_frame(1.0 / 60.0, Duration::from_millis(8), &mut backend);
    }

    assert_eq!(engine.frame_count(), 3);
    assert_eq!(backend.kind(), BackendKind::Null);
}

#[test]
fn shutdown_mid_flight_still_drains_the_render_queue_without_executing_it() {
    let mut engine = Engine::default();

    engine.render_queue.submit_set_viewport(0, 0, 64, 64);
    engine.shutdown();

    assert!(!engine.scheduler.is_running());
    assert_eq!(engine.render_queue.stats().processed, 0);
}
