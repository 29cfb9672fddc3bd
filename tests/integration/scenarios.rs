//! Acceptance scenarios on synthetic recordings.

use crate::helpers::tolerances::DSP_EPSILON;
use crate::helpers::*;
use approx::assert_relative_eq;
use ephys::prelude::*;

/// One million samples at 1 kHz with 1 s windows every 0.5 s.
#[test]
fn test_rms_over_million_samples() {
    let rec =
        MemoryRecording::from_channels(&[generate_integer_staircase(1_000_000)], 1000.0).unwrap();
    let mut sink = MemoryStore::new("rms.store");
    let params = RmsParams {
        window_duration_s: 1.0,
        window_step_s: 0.5,
        estimator: RmsEstimator::MeanSquareRoot,
        channels: None,
    };

    // 100k samples per chunk, so windows straddle many seams
    let done = test_analyzer(400_000)
        .running_rms(&rec, &mut sink, "noise", &params, &mut NoProgress)
        .unwrap();

    assert_eq!(done.status, CompletionStatus::Done);
    assert_eq!(done.samples_processed, 1_000_000);
    assert_eq!(sink.shape("noise/rms").unwrap(), vec![1, 1999]);

    // A rising staircase gives strictly rising RMS in window order
    let values = read_f32(&sink, "noise/rms");
    assert!(values.windows(2).all(|w| w[1] > w[0]));

    // Window k covers samples [500k, 500k + 1000)
    let k = 1234;
    let expected = rms(&generate_integer_staircase(1_000_000)[500 * k..500 * k + 1000]);
    assert_relative_eq!(values[k], expected, max_relative = 1e-6);
}

#[test]
fn test_decimated_dc_is_unchanged() {
    let rec = MemoryRecording::from_channels(
        &[generate_dc(5.0, 10_000), generate_dc(5.0, 10_000)],
        1000.0,
    )
    .unwrap();
    let mut sink = MemoryStore::new("lfp.store");
    let params = DecimateParams {
        factor: Some(2),
        ..Default::default()
    };

    let done = test_analyzer(2 * 4 * 1000)
        .decimate(&rec, &mut sink, "", &params, None, &mut NoProgress)
        .unwrap();

    assert!(!done.is_aborted());
    assert_eq!(sink.shape("lfp").unwrap(), vec![2, 5000]);
    for v in read_f32(&sink, "lfp") {
        assert_relative_eq!(v, 5.0, epsilon = DSP_EPSILON);
    }
    assert_eq!(
        sink.get_attr("lfp", "fs").unwrap(),
        Some(AttrValue::Float(500.0))
    );
}

#[test]
fn test_single_impulse_single_event() {
    let rec = MemoryRecording::from_channels(
        &[
            generate_impulse(1_000_000, 500_000, 10.0),
            generate_dc(0.0, 1_000_000),
        ],
        25_000.0,
    )
    .unwrap();
    let mut sink = MemoryStore::new("spikes.store");
    let params = ExtractParams {
        covariance_samples: 100,
        covariance_seed: Some(1),
        ..ExtractParams::new(vec![1.0], vec![5.0], vec![20.0])
    };

    test_analyzer(2 * 4 * 100_000)
        .extract_spikes(&rec, &mut sink, "", &params, None, &mut NoProgress)
        .unwrap();

    assert_eq!(read_i64(&sink, "event_data/timestamps_n"), vec![500_000]);
    let channels = sink.read("event_data/channels").unwrap();
    assert_eq!(channels.as_i16().unwrap(), &[1]);
    let artifacts = sink.read("event_data/artifacts").unwrap();
    assert_eq!(artifacts.as_i8().unwrap(), &[0, 0]);

    // 2.1 ms at 25 kHz is 53 samples, 13 of them before the crossing
    assert_eq!(sink.shape("event_data/waveforms").unwrap(), vec![1, 2, 53]);
    let waveform = read_f32(&sink, "event_data/waveforms");
    assert_eq!(waveform[13], 10.0);
    assert_eq!(waveform.iter().filter(|&&v| v != 0.0).count(), 1);

    let seconds = sink.read("event_data/timestamps").unwrap();
    assert_relative_eq!(seconds.as_f64().unwrap()[0], 20.0);
}

#[test]
fn test_covariance_after_cancellation() {
    let rec =
        MemoryRecording::from_channels(&[generate_noise(20_000, 1.0, 11)], 10_000.0).unwrap();
    let mut sink = MemoryStore::new("spikes.store");
    let params = ExtractParams {
        covariance_samples: 100,
        covariance_seed: Some(7),
        ..ExtractParams::new(vec![1.0], vec![5.0], vec![20.0])
    };

    let mut cancel = cancel_at(0.5);
    let done = test_analyzer(4 * 2000)
        .extract_spikes(&rec, &mut sink, "", &params, None, &mut cancel)
        .unwrap();

    assert!(done.is_aborted());
    assert!(done.samples_processed < 20_000);
    assert_eq!(
        sink.get_attr("", "aborted").unwrap(),
        Some(AttrValue::Bool(true))
    );

    let collected = sink
        .require_attr("event_data", "covariance_collected")
        .unwrap()
        .as_i64()
        .unwrap() as usize;
    assert!(collected >= 2 && collected < 100, "collected {collected}");

    // 2.1 ms at 10 kHz
    let d = 21;
    assert_eq!(
        sink.shape("event_data/covariance_data").unwrap(),
        vec![collected, d]
    );
    assert_eq!(
        sink.shape("event_data/covariance_matrix").unwrap(),
        vec![d, d]
    );
    let matrix = sink.read("event_data/covariance_matrix").unwrap();
    let matrix = matrix.as_f64().unwrap();
    assert!(matrix.iter().all(|v| v.is_finite()));
    for i in 0..d {
        assert!(matrix[i * d + i] > 0.0);
        for j in 0..d {
            assert_relative_eq!(matrix[i * d + j], matrix[j * d + i]);
        }
    }
}

#[test]
fn test_negative_threshold_detects_downward_impulse() {
    let mut channel = generate_impulse(10_000, 3000, -10.0);
    channel[6000] = 10.0;
    let rec = MemoryRecording::from_channels(&[channel], 10_000.0).unwrap();
    let mut sink = MemoryStore::new("spikes.store");
    let params = ExtractParams {
        covariance_samples: 10,
        covariance_seed: Some(3),
        ..ExtractParams::new(vec![1.0], vec![-5.0], vec![20.0])
    };

    test_analyzer(ephys::DEFAULT_MEMORY_BUDGET)
        .extract_spikes(&rec, &mut sink, "", &params, None, &mut NoProgress)
        .unwrap();

    assert_eq!(read_i64(&sink, "event_data/timestamps_n"), vec![3000]);
    let channels = sink.read("event_data/channels").unwrap();
    assert_eq!(channels.as_i16().unwrap(), &[1]);

    // Snippets keep the recorded polarity
    let waveform = read_f32(&sink, "event_data/waveforms");
    assert_eq!(waveform[5], -10.0);
    assert_eq!(
        sink.get_attr("event_data", "threshold").unwrap(),
        Some(AttrValue::FloatArray(vec![-5.0]))
    );
}
