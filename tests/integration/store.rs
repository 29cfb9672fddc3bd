//! Directory stores end to end: decimating an acquisition file, analysing
//! the decimated output and editing acquired data in place.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use ephys::analysis::destructive::{TRUNCATE_ORIGINAL_SIZE, ZERO_SAMPLES};
use ephys::analysis::{truncate_waveform, zero_waveform, BlockData};
use ephys::core::{ArrayData, Dtype, NodeKind};
use ephys::prelude::*;
use std::cell::Cell;
use tempfile::TempDir;

const FS: f64 = 6000.0;
const N: usize = 60_000;

fn acquisition(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("rat1.store");
    let mut store = DirStore::create(&path).unwrap();
    let channels: Vec<Vec<f32>> = [2.0, 10.0]
        .iter()
        .enumerate()
        .map(|(c, &freq)| {
            let mut x = generate_sine(freq, FS, N, 1.0);
            x.iter_mut().for_each(|v| *v += c as f32);
            x
        })
        .collect();
    write_experiment(&mut store, "rat1", &channels, FS);
    path
}

#[test]
fn test_decimate_directory_store_with_block_data() {
    let dir = TempDir::new().unwrap();
    let source = DirStore::open(acquisition(&dir)).unwrap();
    let raw = StoreRecording::open(&source, "rat1/data/physiology/raw").unwrap();
    assert_eq!((raw.n_channels(), raw.n_samples()), (2, N));

    let out_path = dir.path().join("rat1_dec.store");
    let mut sink = DirStore::create(&out_path).unwrap();
    let block = BlockData {
        store: &source,
        path: "rat1/data",
    };
    test_analyzer(2 * 4 * 20_000)
        .decimate(
            &raw,
            &mut sink,
            "",
            &DecimateParams::default(),
            Some(block),
            &mut NoProgress,
        )
        .unwrap();
    drop(sink);

    // Reopen to make sure everything reached the disk
    let out = DirStore::open(&out_path).unwrap();
    assert_eq!(out.shape("lfp").unwrap(), vec![2, N / 10]);
    assert_eq!(out.get_attr("lfp", "q").unwrap(), Some(AttrValue::Int(10)));
    let children = out.children("block_data").unwrap();
    assert!(children.contains(&"trial_log".to_string()));
    assert!(children.contains(&"contact".to_string()));
    assert!(!children.contains(&"physiology".to_string()));
    assert_eq!(
        out.read("block_data/trial_log").unwrap(),
        source.read("rat1/data/trial_log").unwrap()
    );
    assert_eq!(
        out.get_attr("block_data/trial_log", "units").unwrap(),
        Some(AttrValue::Str("s".into()))
    );

    // The channel offset survives low-pass filtering
    let lfp = read_f32(&out, "lfp");
    let mean = |row: &[f32]| row.iter().sum::<f32>() / row.len() as f32;
    assert!((mean(&lfp[..N / 10]) - 0.0).abs() < 0.05);
    assert!((mean(&lfp[N / 10..]) - 1.0).abs() < 0.05);

    // The decimated output is itself a recording
    let lfp_rec = StoreRecording::open(&out, "lfp").unwrap();
    assert_eq!(lfp_rec.fs(), 600.0);
    let mut tfr = DirStore::create(dir.path().join("rat1_tfr.store")).unwrap();
    test_analyzer(ephys::DEFAULT_MEMORY_BUDGET)
        .spectrogram(
            &lfp_rec,
            &mut tfr,
            "",
            &SpectrogramParams::new(vec![2.0, 10.0]),
            None,
            &mut NoProgress,
        )
        .unwrap();
    assert_eq!(tfr.shape("spectrogram").unwrap(), vec![2, 2, N / 10]);
    assert_eq!(tfr.children("wavelets").unwrap(), vec!["0", "1"]);
}

#[test]
fn test_extraction_to_directory_store() {
    let dir = TempDir::new().unwrap();
    let mut source = DirStore::open(acquisition(&dir)).unwrap();
    let mut x = generate_noise(N, 1.0, 8);
    x[20_000] = 30.0;
    x[40_000] = 30.0;
    source.remove("rat1/data/physiology/raw").unwrap();
    write_raw(&mut source, &x);

    let raw = StoreRecording::open(&source, "rat1/data/physiology/raw").unwrap();
    let mut sink = DirStore::create(dir.path().join("rat1_spikes.store")).unwrap();
    let params = ExtractParams {
        covariance_samples: 50,
        covariance_seed: Some(99),
        ..ExtractParams::new(vec![1.0], vec![8.0], vec![25.0])
    };
    let block = BlockData {
        store: &source,
        path: "rat1/data",
    };
    test_analyzer(4 * 9_000)
        .extract_spikes(&raw, &mut sink, "", &params, Some(block), &mut NoProgress)
        .unwrap();

    assert_eq!(
        read_i64(&sink, "event_data/timestamps_n"),
        vec![20_000, 40_000]
    );
    assert_eq!(
        sink.read("event_data/artifacts").unwrap().as_i8().unwrap(),
        &[1, 1]
    );
    assert_eq!(
        sink.get_attr("event_data", "covariance_seed").unwrap(),
        Some(AttrValue::Str("99".into()))
    );
    let id = sink.require_attr("", "extract_uuid").unwrap();
    assert_eq!(id.as_str().unwrap().len(), 36);
    assert!(sink.exists("block_data/trial_log"));
    assert!(sink.exists("filter"));
}

fn write_raw(store: &mut DirStore, x: &[f32]) {
    let path = "rat1/data/physiology/raw";
    store.create_array(path, &[1, 0], Dtype::F32, 1).unwrap();
    store.append(path, &ArrayData::F32(x.to_vec())).unwrap();
    store.set_attr(path, "fs", FS.into()).unwrap();
}

#[test]
fn test_zero_then_truncate_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = acquisition(&dir);
    let mut store = DirStore::open(&path).unwrap();

    zero_waveform(&mut store, "rat1", 1.0).unwrap();
    let raw = read_f32(&store, "rat1/data/physiology/raw");
    // channel-major: the first second of each channel is zeroed
    for c in 0..2 {
        let row = &raw[c * N..(c + 1) * N];
        assert!(row[..6000].iter().all(|&v| v == 0.0));
        assert!(peak(&row[6000..]) > 0.5);
    }
    assert_eq!(
        store.get_attr("rat1/data/physiology/raw", ZERO_SAMPLES).unwrap(),
        Some(AttrValue::Int(6000))
    );
    let ttl = store.read("rat1/data/contact/reward_TTL").unwrap();
    let ttl = ttl.as_i8().unwrap();
    assert!(ttl[..600].iter().all(|&v| v == 0));
    assert!(ttl[600..].iter().all(|&v| v == 1));

    truncate_waveform(&mut store, "rat1", 5.0).unwrap();
    truncate_waveform(&mut store, "rat1", 2.0).unwrap();
    drop(store);

    let store = DirStore::open(&path).unwrap();
    let raw = StoreRecording::open(&store, "rat1/data/physiology/raw").unwrap();
    assert_eq!(raw.n_samples(), 12_000);
    assert_eq!(
        store
            .get_attr("rat1/data/physiology/raw", TRUNCATE_ORIGINAL_SIZE)
            .unwrap(),
        Some(AttrValue::Int(N as i64))
    );
    let rest = raw.read(6000..12_000, &[0]).unwrap();
    assert!(!signals_approx_equal(
        rest.channel(0),
        &vec![0.0; 6000],
        FLOAT_EPSILON
    ));
}

/// Memory store that remembers the largest array read out of it.
struct CountingStore {
    inner: MemoryStore,
    peak_bytes: Cell<usize>,
}

impl CountingStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            peak_bytes: Cell::new(0),
        }
    }

    fn track(&self, data: ArrayData) -> ephys::core::Result<ArrayData> {
        let bytes = data.len() * data.dtype().item_size();
        self.peak_bytes.set(self.peak_bytes.get().max(bytes));
        Ok(data)
    }
}

impl Store for CountingStore {
    fn create_group(&mut self, path: &str) -> ephys::core::Result<()> {
        self.inner.create_group(path)
    }

    fn create_array(
        &mut self,
        path: &str,
        shape: &[usize],
        dtype: Dtype,
        extensible_axis: usize,
    ) -> ephys::core::Result<()> {
        self.inner.create_array(path, shape, dtype, extensible_axis)
    }

    fn create_dense(&mut self, path: &str, shape: &[usize], dtype: Dtype) -> ephys::core::Result<()> {
        self.inner.create_dense(path, shape, dtype)
    }

    fn put_array(&mut self, path: &str, shape: &[usize], data: &ArrayData) -> ephys::core::Result<()> {
        self.inner.put_array(path, shape, data)
    }

    fn append(&mut self, path: &str, data: &ArrayData) -> ephys::core::Result<()> {
        self.inner.append(path, data)
    }

    fn write_rows(&mut self, path: &str, start: usize, data: &ArrayData) -> ephys::core::Result<()> {
        self.inner.write_rows(path, start, data)
    }

    fn write_lane(
        &mut self,
        path: &str,
        prefix: &[usize],
        start: usize,
        data: &ArrayData,
    ) -> ephys::core::Result<()> {
        self.inner.write_lane(path, prefix, start, data)
    }

    fn read(&self, path: &str) -> ephys::core::Result<ArrayData> {
        self.track(self.inner.read(path)?)
    }

    fn read_rows(&self, path: &str, start: usize, end: usize) -> ephys::core::Result<ArrayData> {
        self.track(self.inner.read_rows(path, start, end)?)
    }

    fn read_channels(
        &self,
        path: &str,
        start: usize,
        end: usize,
        channels: &[usize],
    ) -> ephys::core::Result<ArrayData> {
        self.track(self.inner.read_channels(path, start, end, channels)?)
    }

    fn kind(&self, path: &str) -> ephys::core::Result<NodeKind> {
        self.inner.kind(path)
    }

    fn set_attr(&mut self, path: &str, key: &str, value: AttrValue) -> ephys::core::Result<()> {
        self.inner.set_attr(path, key, value)
    }

    fn get_attr(&self, path: &str, key: &str) -> ephys::core::Result<Option<AttrValue>> {
        self.inner.get_attr(path, key)
    }

    fn attr_names(&self, path: &str) -> ephys::core::Result<Vec<String>> {
        self.inner.attr_names(path)
    }

    fn children(&self, path: &str) -> ephys::core::Result<Vec<String>> {
        self.inner.children(path)
    }

    fn truncate(&mut self, path: &str, len: usize) -> ephys::core::Result<usize> {
        self.inner.truncate(path, len)
    }

    fn remove(&mut self, path: &str) -> ephys::core::Result<()> {
        self.inner.remove(path)
    }

    fn location(&self) -> String {
        self.inner.location()
    }
}

/// 32 channels of noise at 20 kHz.
fn wide_recording() -> CountingStore {
    let mut store = MemoryStore::new("wide.store");
    let path = "rat1/data/physiology/raw";
    let n = 40_000;
    let data: Vec<f32> = (0..32)
        .flat_map(|c| generate_noise(n, 1.0, 100 + c))
        .collect();
    store.create_array(path, &[32, 0], Dtype::F32, 1).unwrap();
    store.append(path, &ArrayData::F32(data)).unwrap();
    store.set_attr(path, "fs", 20_000.0.into()).unwrap();
    CountingStore::new(store)
}

#[test]
fn test_channel_subset_reads_stay_within_budget() {
    let store = wide_recording();
    let raw = StoreRecording::open(&store, "rat1/data/physiology/raw").unwrap();
    let params = RmsParams {
        window_duration_s: 0.01,
        window_step_s: 0.01,
        channels: Some(vec![0]),
        ..Default::default()
    };
    let budget = 400_000;

    let mut sink = MemoryStore::new("rms");
    test_analyzer(budget)
        .running_rms(&raw, &mut sink, "", &params, &mut NoProgress)
        .unwrap();
    assert_eq!(sink.shape("rms").unwrap(), vec![1, 200]);
    let peak = store.peak_bytes.get();
    assert!(peak > 0 && peak <= budget, "peak read {peak} bytes");

    // Common-average referencing reads every channel, so chunks shrink
    store.peak_bytes.set(0);
    let referenced = Analyzer::builder()
        .memory_budget(budget)
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
    let mut sink = MemoryStore::new("rms");
    referenced
        .running_rms(&raw, &mut sink, "", &params, &mut NoProgress)
        .unwrap();
    assert_eq!(sink.shape("rms").unwrap(), vec![1, 200]);
    let peak = store.peak_bytes.get();
    assert!(peak > 32 * 4 * 200 && peak <= budget, "peak read {peak} bytes");
}
