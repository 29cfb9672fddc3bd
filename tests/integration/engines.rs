//! Engine behaviour that must not depend on how the recording is chunked,
//! plus progress reporting and cancellation.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use approx::assert_relative_eq;
use ephys::core::{ArrayData, Dtype};
use ephys::prelude::*;

fn noisy_recording() -> MemoryRecording {
    let n = 30_000;
    let mut channels = vec![
        generate_noise(n, 1.0, 1),
        generate_noise(n, 2.0, 2),
        generate_noise(n, 1.0, 3),
    ];
    // Spikes on either side of likely seams
    for (channel, t) in [(0, 1_000), (1, 7_777), (2, 7_780), (0, 15_001), (1, 29_990)] {
        channels[channel][t] += 40.0;
    }
    MemoryRecording::from_channels(&channels, 20_000.0).unwrap()
}

#[test]
fn test_rms_independent_of_budget() {
    let rec = noisy_recording();
    for estimator in [RmsEstimator::MeanSquareRoot, RmsEstimator::MedianAbsoluteScaled] {
        let params = RmsParams {
            window_duration_s: 0.05,
            window_step_s: 0.02,
            estimator,
            channels: Some(vec![2, 0]),
        };
        let mut reference = MemoryStore::new("a");
        test_analyzer(ephys::DEFAULT_MEMORY_BUDGET)
            .running_rms(&rec, &mut reference, "", &params, &mut NoProgress)
            .unwrap();
        let expected = read_f32(&reference, "rms");
        // (30000 - 1000) / 400 + 1
        assert_eq!(reference.shape("rms").unwrap(), vec![2, 73]);

        for budget in [2 * 4 * 2_000, 2 * 4 * 3_333, 2 * 4 * 10_000] {
            let mut sink = MemoryStore::new("b");
            test_analyzer(budget)
                .running_rms(&rec, &mut sink, "", &params, &mut NoProgress)
                .unwrap();
            assert_eq!(read_f32(&sink, "rms"), expected, "budget {budget}");
        }
    }
}

#[test]
fn test_extraction_independent_of_budget() {
    let rec = noisy_recording();
    let params = ExtractParams {
        covariance_samples: 200,
        covariance_seed: Some(42),
        ..ExtractParams::new(vec![1.0, 2.0, 1.0], vec![6.0], vec![15.0])
    };
    let run = |budget: usize| {
        let mut sink = MemoryStore::new("spikes");
        test_analyzer(budget)
            .extract_spikes(&rec, &mut sink, "", &params, None, &mut NoProgress)
            .unwrap();
        sink
    };

    let reference = run(ephys::DEFAULT_MEMORY_BUDGET);
    let stamps = read_i64(&reference, "event_data/timestamps_n");
    for t in [1_000, 7_777, 7_780, 15_001] {
        assert!(stamps.contains(&t), "missing crossing at {t}");
    }
    // Too close to the end for a full snippet
    assert!(!stamps.contains(&29_990));

    for budget in [3 * 4 * 1_000, 3 * 4 * 2_500] {
        let sink = run(budget);
        for path in [
            "event_data/timestamps_n",
            "event_data/channels",
            "event_data/waveforms",
            "event_data/artifacts",
            "event_data/covariance_data",
            "event_data/covariance_matrix",
        ] {
            assert_eq!(
                sink.read(path).unwrap(),
                reference.read(path).unwrap(),
                "{path} differs at budget {budget}"
            );
        }
    }
}

#[test]
fn test_spectrogram_independent_of_budget() {
    let lfp = MemoryRecording::from_channels(
        &[
            generate_sine(8.0, 600.0, 3000, 1.0),
            generate_noise(3000, 0.5, 9),
        ],
        600.0,
    )
    .unwrap();
    let params = SpectrogramParams::new(vec![4.0, 8.0, 30.0]);
    let run = |budget: usize| {
        let mut sink = MemoryStore::new("tfr");
        test_analyzer(budget)
            .spectrogram(&lfp, &mut sink, "", &params, None, &mut NoProgress)
            .unwrap();
        sink.read("spectrogram").unwrap()
    };

    let ArrayData::C64(expected) = run(ephys::DEFAULT_MEMORY_BUDGET) else {
        panic!("spectrogram is not complex");
    };
    assert_eq!(expected.len(), 2 * 3 * 3000);

    // The 8 Hz row of the sine channel carries the power
    let power = |j: usize| -> f32 {
        expected[j * 3000 + 500..j * 3000 + 2500]
            .iter()
            .map(|c| c.norm())
            .sum()
    };
    assert!(power(1) > 4.0 * power(0));
    assert!(power(1) > 4.0 * power(2));

    // 4 bytes of input and 3 * 16 of response per sample and channel; the
    // 4 Hz kernel spans 717 samples
    let ArrayData::C64(chunked) = run(2 * 52 * 3000) else {
        panic!("spectrogram is not complex");
    };
    for (a, b) in chunked.iter().zip(&expected) {
        assert_relative_eq!(a.re, b.re, epsilon = DSP_EPSILON);
        assert_relative_eq!(a.im, b.im, epsilon = DSP_EPSILON);
    }
}

#[test]
fn test_decimation_independent_of_budget() {
    let rec = noisy_recording();
    let q = 10;
    let params = DecimateParams {
        factor: Some(q),
        ..Default::default()
    };
    let run = |budget: usize| {
        let mut sink = MemoryStore::new("lfp");
        test_analyzer(budget)
            .decimate(&rec, &mut sink, "", &params, None, &mut NoProgress)
            .unwrap();
        sink
    };

    let whole = run(ephys::DEFAULT_MEMORY_BUDGET);
    assert_eq!(whole.shape("lfp").unwrap(), vec![3, 3000]);
    let expected = read_f32(&whole, "lfp");

    // Each read restarts the filter 3 * n_taps samples before its core, so
    // outputs match once 150 input samples have settled the transient
    let guard = 15;
    for budget in [3 * 4 * 1000, 3 * 4 * 2345] {
        let sink = run(budget);
        assert_eq!(sink.shape("lfp").unwrap(), vec![3, 3000]);
        let chunk_samples = sink
            .require_attr("lfp", "chunk_samples")
            .unwrap()
            .as_i64()
            .unwrap() as usize;
        assert!(chunk_samples < 30_000);
        assert_eq!(chunk_samples % q, 0);

        let got = read_f32(&sink, "lfp");
        let per_chunk = chunk_samples / q;
        let mut checked = 0;
        for i in 0..got.len() {
            let offset = (i % 3000) % per_chunk;
            if offset < guard || per_chunk - offset <= guard {
                continue;
            }
            assert_relative_eq!(got[i], expected[i], epsilon = DSP_EPSILON);
            checked += 1;
        }
        assert!(checked > got.len() / 2, "checked {checked}");
    }
}

#[test]
fn test_progress_once_per_chunk() {
    let rec = noisy_recording();
    let mut reports = Reports::default();
    let params = RmsParams {
        window_duration_s: 0.05,
        window_step_s: 0.05,
        ..Default::default()
    };
    let mut sink = MemoryStore::new("rms");
    test_analyzer(3 * 4 * 5_000)
        .running_rms(&rec, &mut sink, "", &params, &mut reports)
        .unwrap();

    let chunk_samples = sink
        .require_attr("rms", "chunk_samples")
        .unwrap()
        .as_i64()
        .unwrap() as usize;
    assert_eq!(reports.0.len(), 30_000usize.div_ceil(chunk_samples));
    assert!(reports.0.windows(2).all(|w| w[1].0 > w[0].0));
    assert!(reports.0.iter().all(|r| r.1 == 30_000));
    assert_eq!(reports.0.last().unwrap().0, 30_000);
}

#[test]
fn test_extraction_reports_features_then_complete() {
    let rec = noisy_recording();
    let mut reports = Reports::default();
    let params = ExtractParams {
        covariance_samples: 10,
        ..ExtractParams::new(vec![1.0, 2.0, 1.0], vec![6.0], vec![15.0])
    };
    let mut sink = MemoryStore::new("spikes");
    test_analyzer(3 * 4 * 4_000)
        .extract_spikes(&rec, &mut sink, "", &params, None, &mut reports)
        .unwrap();

    let (last, rest) = reports.0.split_last().unwrap();
    assert_eq!(last.2, "Complete");
    assert!(rest.len() > 1);
    assert!(rest.iter().all(|r| r.2.starts_with("Found ")));
}

#[test]
fn test_cancelled_rms_keeps_partial_output() {
    let rec = noisy_recording();
    let params = RmsParams {
        window_duration_s: 0.05,
        window_step_s: 0.05,
        ..Default::default()
    };
    let token = CancelToken::new();
    token.cancel();
    let mut progress = token.clone();
    let mut sink = MemoryStore::new("rms");
    let done = test_analyzer(3 * 4 * 5_000)
        .running_rms(&rec, &mut sink, "", &params, &mut progress)
        .unwrap();

    assert_eq!(done.status, CompletionStatus::Aborted);
    let windows = sink.shape("rms").unwrap()[1];
    assert!(windows > 0 && windows < 30);
    assert_eq!(
        sink.get_attr("rms", "aborted").unwrap(),
        Some(AttrValue::Bool(true))
    );
}

#[test]
fn test_configuration_errors_leave_sink_empty() {
    let rec = noisy_recording();
    let analyzer = test_analyzer(ephys::DEFAULT_MEMORY_BUDGET);
    let mut sink = MemoryStore::new("out");

    let too_long_step = RmsParams {
        window_duration_s: 0.01,
        window_step_s: 0.02,
        ..Default::default()
    };
    let err = analyzer
        .running_rms(&rec, &mut sink, "noise", &too_long_step, &mut NoProgress)
        .unwrap_err();
    assert!(err.is_configuration());

    let nyquist_factor = DecimateParams {
        factor: Some(1),
        ..Default::default()
    };
    let err = analyzer
        .decimate(&rec, &mut sink, "lfp", &nyquist_factor, None, &mut NoProgress)
        .unwrap_err();
    assert!(err.is_configuration());

    let no_frequencies = SpectrogramParams::new(Vec::new());
    assert!(analyzer
        .spectrogram(&rec, &mut sink, "tfr", &no_frequencies, None, &mut NoProgress)
        .is_err());

    assert!(sink.children("").unwrap().is_empty());
}

#[test]
fn test_processing_removes_common_mode() {
    let n = 30_000;
    let common = generate_sine(50.0, 30_000.0, n, 100.0);
    let mut channels = vec![common.clone(), common.clone(), common];
    channels[0][15_000] += 50.0;
    let rec = MemoryRecording::from_channels(&channels, 30_000.0).unwrap();
    let params = ExtractParams {
        covariance_samples: 10,
        covariance_seed: Some(5),
        ..ExtractParams::new(vec![1.0], vec![5.0], vec![1000.0])
    };

    let raw = test_analyzer(ephys::DEFAULT_MEMORY_BUDGET);
    let mut sink = MemoryStore::new("raw");
    raw.extract_spikes(&rec, &mut sink, "", &params, None, &mut NoProgress)
        .unwrap();
    assert!(read_i64(&sink, "event_data/timestamps_n").len() > 3);

    let processed = Analyzer::builder()
        .processing(ProcessingConfig {
            lowpass_hz: None,
            highpass_hz: Some(300.0),
            filter_order: 4,
            band_type: BandType::Highpass,
            bad_channels: None,
            reference: ReferenceMode::AllGood,
            padding: None,
        })
        .build()
        .unwrap();
    let mut sink = MemoryStore::new("processed");
    processed
        .extract_spikes(&rec, &mut sink, "", &params, None, &mut NoProgress)
        .unwrap();
    assert_eq!(read_i64(&sink, "event_data/timestamps_n"), vec![15_000]);
    let channels = sink.read("event_data/channels").unwrap();
    assert_eq!(channels.as_i16().unwrap(), &[1]);

    assert_eq!(
        sink.get_attr("filter", "diff_mode").unwrap(),
        Some(AttrValue::Str("all_good".into()))
    );
    assert_eq!(
        sink.get_attr("filter", "fc_highpass").unwrap(),
        Some(AttrValue::Float(300.0))
    );
}

#[test]
fn test_noise_estimate_through_analyzer() {
    let rec = MemoryRecording::from_channels(
        &[generate_noise(40_000, 3.0, 21), generate_noise(40_000, 1.5, 22)],
        10_000.0,
    )
    .unwrap();
    let analyzer = test_analyzer(ephys::DEFAULT_MEMORY_BUDGET);
    let noise = analyzer
        .estimate_noise(&rec, None, ephys::analysis::DEFAULT_NOISE_DURATION_S)
        .unwrap();
    assert_relative_eq!(noise[0], 3.0, max_relative = NOISE_RELATIVE_EPSILON);
    assert_relative_eq!(noise[1], 1.5, max_relative = NOISE_RELATIVE_EPSILON);

    let first_second = analyzer.estimate_noise(&rec, Some(&[1]), 1.0).unwrap();
    assert_eq!(first_second.len(), 1);
    assert_relative_eq!(first_second[0], 1.5, max_relative = 3.0 * NOISE_RELATIVE_EPSILON);
}

#[test]
fn test_store_recording_matches_memory() {
    let channels = vec![generate_noise(5_000, 1.0, 4), generate_noise(5_000, 1.0, 5)];
    let mut store = MemoryStore::new("raw.store");
    store
        .create_array("raw", &[2, 0], Dtype::F32, 1)
        .unwrap();
    store.append("raw", &ArrayData::F32(channels.concat())).unwrap();
    store.set_attr("raw", "fs", 5_000.0.into()).unwrap();

    let from_store = StoreRecording::open(&store, "raw").unwrap();
    let in_memory = MemoryRecording::from_channels(&channels, 5_000.0).unwrap();
    let params = RmsParams {
        window_duration_s: 0.1,
        window_step_s: 0.1,
        ..Default::default()
    };
    let analyzer = test_analyzer(2 * 4 * 700);
    let mut a = MemoryStore::new("a");
    let mut b = MemoryStore::new("b");
    analyzer
        .running_rms(&from_store, &mut a, "", &params, &mut NoProgress)
        .unwrap();
    analyzer
        .running_rms(&in_memory, &mut b, "", &params, &mut NoProgress)
        .unwrap();
    assert!(signals_approx_equal(
        &read_f32(&a, "rms"),
        &read_f32(&b, "rms"),
        FLOAT_EPSILON
    ));
}
