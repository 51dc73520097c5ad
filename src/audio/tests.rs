use super::dispatch::{append_downmixed_samples, encode_pcm_frame, FrameDispatcher};
use super::segmenter::DecisionWindow;
use super::{
    EnergyVad, SegmenterConfig, SegmenterError, SegmenterState, UtteranceSegmenter, VadEngine,
};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default config: 16 kHz, 30 ms chunks, so N = 240/30 = 8 and the pre-roll
/// holds 1000/30 = 33 chunks.
fn default_config() -> SegmenterConfig {
    SegmenterConfig::default()
}

fn tagged_frame(cfg: &SegmenterConfig, tag: u8) -> Vec<u8> {
    vec![tag; cfg.chunk_bytes()]
}

fn push_silence(seg: &mut UtteranceSegmenter, cfg: &SegmenterConfig, count: usize) {
    let frame = tagged_frame(cfg, 0);
    for _ in 0..count {
        assert_eq!(seg.push(&frame, false).expect("push should succeed"), None);
    }
}

#[test]
fn derived_counts_truncate_to_whole_chunks() {
    let cfg = default_config();
    assert_eq!(cfg.chunk_samples(), 480);
    assert_eq!(cfg.chunk_bytes(), 960);
    assert_eq!(cfg.window_chunks(), 8);
    assert_eq!(cfg.padding_chunks(), 33);

    let uneven = SegmenterConfig {
        window_ms: 250,
        padding_ms: 995,
        ..default_config()
    };
    assert_eq!(uneven.window_chunks(), 8);
    assert_eq!(uneven.padding_chunks(), 33);
}

#[test]
fn rejects_unsupported_chunk_duration() {
    let cfg = SegmenterConfig {
        chunk_ms: 25,
        ..default_config()
    };
    let err = UtteranceSegmenter::new(&cfg).expect_err("25 ms chunks should be rejected");
    assert!(matches!(err, SegmenterError::NotConfigured(_)));
}

#[test]
fn rejects_degenerate_window_and_padding() {
    let cfg = SegmenterConfig {
        chunk_ms: 30,
        window_ms: 20,
        ..default_config()
    };
    assert!(matches!(
        UtteranceSegmenter::new(&cfg),
        Err(SegmenterError::NotConfigured(_))
    ));

    let cfg = SegmenterConfig {
        padding_ms: 10,
        ..default_config()
    };
    assert!(matches!(
        UtteranceSegmenter::new(&cfg),
        Err(SegmenterError::NotConfigured(_))
    ));
}

#[test]
fn rejects_out_of_range_ratios() {
    for (trigger, release) in [(0.0, 0.9), (1.5, 0.9), (0.5, 0.0), (0.5, f32::NAN)] {
        let cfg = SegmenterConfig {
            trigger_ratio: trigger,
            release_ratio: release,
            ..default_config()
        };
        assert!(
            matches!(
                UtteranceSegmenter::new(&cfg),
                Err(SegmenterError::NotConfigured(_))
            ),
            "ratios ({trigger}, {release}) should be rejected"
        );
    }
}

#[test]
fn rejects_wrong_frame_length() {
    let cfg = default_config();
    let mut seg = UtteranceSegmenter::new(&cfg).expect("default config is valid");
    let err = seg
        .push(&[0u8; 10], false)
        .expect_err("short frame should be rejected");
    assert_eq!(
        err,
        SegmenterError::InvalidFrameLength {
            expected: 960,
            got: 10
        }
    );
}

#[test]
fn stays_idle_on_sparse_speech() {
    let cfg = default_config();
    let mut seg = UtteranceSegmenter::new(&cfg).expect("default config is valid");
    let frame = tagged_frame(&cfg, 1);
    // Alternating decisions never exceed half the window.
    for i in 0..64 {
        let result = seg.push(&frame, i % 2 == 0).expect("push should succeed");
        assert_eq!(result, None);
        assert_eq!(seg.state(), SegmenterState::Idle);
    }
}

#[test]
fn trigger_threshold_is_strict() {
    let cfg = default_config();
    let mut seg = UtteranceSegmenter::new(&cfg).expect("default config is valid");
    let frame = tagged_frame(&cfg, 1);
    // Exactly half the window voiced (4 of 8) must not trigger.
    for _ in 0..4 {
        seg.push(&frame, true).expect("push should succeed");
    }
    assert_eq!(seg.state(), SegmenterState::Idle);
    // One more voiced frame pushes the count past the threshold.
    seg.push(&frame, true).expect("push should succeed");
    assert_eq!(seg.state(), SegmenterState::Triggered);
}

#[test]
fn release_requires_more_than_ratio_of_window() {
    let cfg = default_config();
    let mut seg = UtteranceSegmenter::new(&cfg).expect("default config is valid");
    let frame = tagged_frame(&cfg, 1);
    // Trigger and saturate the window with speech.
    for _ in 0..13 {
        seg.push(&frame, true).expect("push should succeed");
    }
    assert_eq!(seg.state(), SegmenterState::Triggered);

    // A single silence frame must not split the utterance, and neither may
    // seven of eight: release needs unvoiced > 0.9 * 8 = 7.2.
    for i in 0..7 {
        let result = seg.push(&frame, false).expect("push should succeed");
        assert_eq!(result, None, "no release after {} silence frames", i + 1);
        assert_eq!(seg.state(), SegmenterState::Triggered);
    }
    let released = seg.push(&frame, false).expect("push should succeed");
    assert!(released.is_some(), "eighth silence frame should release");
    assert_eq!(seg.state(), SegmenterState::Idle);
}

#[test]
fn onset_offset_cycle_emits_exactly_once() {
    let cfg = default_config();
    let mut seg = UtteranceSegmenter::new(&cfg).expect("default config is valid");
    let frame = tagged_frame(&cfg, 1);
    let mut emitted = Vec::new();

    // 8 silence, 5 speech (trigger on the 5th), 8 speech, 8 silence (release
    // when the unvoiced count reaches 8).
    let script: Vec<bool> = [(8, false), (5, true), (8, true), (8, false)]
        .iter()
        .flat_map(|&(count, value)| std::iter::repeat(value).take(count))
        .collect();
    for decision in script {
        if let Some(utterance) = seg.push(&frame, decision).expect("push should succeed") {
            emitted.push(utterance);
        }
    }

    assert_eq!(emitted.len(), 1);
    let utterance = &emitted[0];
    // 13 pre-roll frames (8 silence + 5 speech) plus 16 frames while triggered.
    assert_eq!(utterance.frames, 29);
    assert_eq!(utterance.audio.len(), 29 * cfg.chunk_bytes());
    assert_eq!(utterance.duration_ms, 29 * 30);
    assert_eq!(seg.state(), SegmenterState::Idle);
}

#[test]
fn pre_roll_is_included_in_arrival_order() {
    let cfg = default_config();
    let mut seg = UtteranceSegmenter::new(&cfg).expect("default config is valid");

    // Fill past the 33-chunk pre-roll capacity so the oldest frames fall out.
    for tag in 0..40u8 {
        let result = seg
            .push(&tagged_frame(&cfg, tag), false)
            .expect("push should succeed");
        assert_eq!(result, None);
    }

    // Five voiced frames trigger on the last one.
    for tag in 100..105u8 {
        seg.push(&tagged_frame(&cfg, tag), true)
            .expect("push should succeed");
    }
    assert_eq!(seg.state(), SegmenterState::Triggered);

    for tag in 105..113u8 {
        seg.push(&tagged_frame(&cfg, tag), true)
            .expect("push should succeed");
    }
    let mut released = None;
    for tag in 200..208u8 {
        released = seg
            .push(&tagged_frame(&cfg, tag), false)
            .expect("push should succeed");
    }
    let utterance = released.expect("eighth silence frame should release");

    // At trigger time the pre-roll held frames 12..=39 and 100..=104; the
    // frames pushed while triggered follow in arrival order.
    let mut expected_tags: Vec<u8> = (12..40).collect();
    expected_tags.extend(100..113);
    expected_tags.extend(200..208);
    assert_eq!(utterance.frames, expected_tags.len());

    let chunk = cfg.chunk_bytes();
    for (i, tag) in expected_tags.iter().enumerate() {
        let slice = &utterance.audio[i * chunk..(i + 1) * chunk];
        assert!(
            slice.iter().all(|byte| byte == tag),
            "frame {i} should carry tag {tag}"
        );
    }
}

#[test]
fn rearms_cleanly_after_each_utterance() {
    let cfg = default_config();
    let mut seg = UtteranceSegmenter::new(&cfg).expect("default config is valid");
    let frame = tagged_frame(&cfg, 1);

    // Complete one utterance.
    for _ in 0..13 {
        seg.push(&frame, true).expect("push should succeed");
    }
    let mut released = None;
    for _ in 0..8 {
        released = seg.push(&frame, false).expect("push should succeed");
    }
    assert!(released.is_some());
    assert_eq!(seg.pre_roll_len(), 0);

    // A fresh all-silence stream longer than the window must never re-trigger.
    push_silence(&mut seg, &cfg, 20);
    assert_eq!(seg.state(), SegmenterState::Idle);

    // The machine is restartable: a second onset/offset cycle emits again.
    for _ in 0..5 {
        seg.push(&frame, true).expect("push should succeed");
    }
    assert_eq!(seg.state(), SegmenterState::Triggered);
}

#[test]
fn reset_discards_in_progress_utterance() {
    let cfg = default_config();
    let mut seg = UtteranceSegmenter::new(&cfg).expect("default config is valid");
    let frame = tagged_frame(&cfg, 1);
    for _ in 0..13 {
        seg.push(&frame, true).expect("push should succeed");
    }
    assert_eq!(seg.state(), SegmenterState::Triggered);

    seg.reset();
    assert_eq!(seg.state(), SegmenterState::Idle);
    assert_eq!(seg.pre_roll_len(), 0);

    // Nothing of the discarded capture leaks into the next cycle.
    for _ in 0..5 {
        seg.push(&frame, true).expect("push should succeed");
    }
    let mut released = None;
    for _ in 0..8 {
        released = seg.push(&frame, false).expect("push should succeed");
    }
    let utterance = released.expect("second cycle should emit");
    assert_eq!(utterance.frames, 5 + 8);
}

#[test]
fn decision_window_overwrites_oldest_slot() {
    let mut window = DecisionWindow::new(4);
    assert_eq!(window.voiced(), 0);
    for _ in 0..4 {
        window.push(true);
    }
    assert_eq!(window.voiced(), 4);
    // Three more pushes overwrite three of the four voiced slots.
    for _ in 0..3 {
        window.push(false);
    }
    assert_eq!(window.len(), 4);
    assert_eq!(window.voiced(), 1);

    window.clear();
    assert_eq!(window.voiced(), 0);
}

#[test]
fn downmixes_multi_channel_audio() {
    let mut buf = Vec::new();
    let samples = [1.0f32, -1.0, 0.5, 0.5];
    append_downmixed_samples(&mut buf, &samples, 2, |sample| sample);
    assert_eq!(buf, vec![0.0, 0.5]);
}

#[test]
fn preserves_single_channel_audio() {
    let mut buf = Vec::new();
    let samples = [0.1f32, 0.2, 0.3];
    append_downmixed_samples(&mut buf, &samples, 1, |sample| sample);
    assert_eq!(buf, samples);
}

#[test]
fn encodes_pcm_with_clamping() {
    let bytes = encode_pcm_frame(&[0.0, 1.0, -1.0, 2.0]);
    assert_eq!(bytes.len(), 8);
    assert_eq!(&bytes[0..2], &0i16.to_le_bytes());
    assert_eq!(&bytes[2..4], &i16::MAX.to_le_bytes());
    assert_eq!(&bytes[4..6], &i16::MIN.to_le_bytes());
    // Out-of-range input clamps instead of wrapping.
    assert_eq!(&bytes[6..8], &i16::MAX.to_le_bytes());
}

#[test]
fn dispatcher_emits_exact_chunk_frames() {
    let (sender, receiver) = bounded::<Vec<u8>>(8);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = FrameDispatcher::new(4, sender, dropped.clone());

    dispatcher.push(&[0.0f32; 10], 1, |sample| sample);
    assert_eq!(receiver.len(), 2);
    assert_eq!(receiver.recv().expect("frame expected").len(), 8);
    assert_eq!(receiver.recv().expect("frame expected").len(), 8);

    // Two samples stay pending until the next callback completes a chunk.
    dispatcher.push(&[0.0f32; 2], 1, |sample| sample);
    assert_eq!(receiver.len(), 1);
    assert_eq!(dropped.load(Ordering::Relaxed), 0);
}

#[test]
fn dispatcher_counts_drops_when_channel_is_full() {
    let (sender, receiver) = bounded::<Vec<u8>>(1);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = FrameDispatcher::new(2, sender, dropped.clone());

    dispatcher.push(&[0.0f32; 6], 1, |sample| sample);
    assert_eq!(receiver.len(), 1);
    assert_eq!(dropped.load(Ordering::Relaxed), 2);
}

fn pcm_of(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

#[test]
fn energy_vad_separates_silence_from_tone() {
    let mut vad = EnergyVad::new(-40.0);
    let silence = pcm_of(&[0i16; 480]);
    assert!(!vad.is_speech(&silence, 16_000));

    let loud: Vec<i16> = (0..480)
        .map(|i| if i % 2 == 0 { 12_000 } else { -12_000 })
        .collect();
    assert!(vad.is_speech(&pcm_of(&loud), 16_000));
}

#[test]
fn energy_vad_ignores_empty_frames() {
    let mut vad = EnergyVad::new(-40.0);
    assert!(!vad.is_speech(&[], 16_000));
}
