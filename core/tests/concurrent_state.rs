//! Frame state written from other threads while frames are presented

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use scroller_core::{ClearColor, FrameState, HeadlessBackend, Renderer, RendererConfig};

#[test]
fn presented_frames_never_mix_two_writes() {
    let first = FrameState::new(10.0, ClearColor::rgba(0.1, 0.2, 0.3, 1.0));
    let second = FrameState::new(-90.0, ClearColor::rgba(0.9, 0.7, 0.5, 0.25));

    let backend = HeadlessBackend::new(4, 4);
    let mut renderer = Renderer::new(backend.clone(), RendererConfig::default()).unwrap();
    let state = renderer.frame_state();
    state.set(first);

    let stop = Arc::new(AtomicBool::new(false));
    let writers: Vec<_> = [first, second]
        .into_iter()
        .map(|target| {
            let state = state.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    // Field-by-field writes through `update` publish atomically.
                    state.update(|s| {
                        s.clear_color = target.clear_color;
                        s.content_offset = target.content_offset;
                    });
                }
            })
        })
        .collect();

    for _ in 0..2_000 {
        assert!(renderer.on_frame().is_presented());
    }
    stop.store(true, Ordering::Relaxed);
    for w in writers {
        w.join().unwrap();
    }

    let records = backend.records();
    assert_eq!(records.len(), 2_000);
    for record in records {
        let seen = FrameState::new(record.content_offset, record.clear_color);
        assert!(
            seen == first || seen == second,
            "frame {} mixed two writes: {:?}",
            record.frame_id,
            seen
        );
    }
}

#[test]
fn application_thread_drives_scrolling() {
    let backend = HeadlessBackend::new(2, 2);
    let mut renderer = Renderer::new(backend.clone(), RendererConfig::default()).unwrap();
    let state = renderer.frame_state();

    let app = thread::spawn(move || {
        for step in 1..=100 {
            state.set_content_offset(step as f32);
        }
    });
    app.join().unwrap();

    renderer.on_frame();
    assert_eq!(backend.last_image().unwrap().content_offset, 100.0);
}
