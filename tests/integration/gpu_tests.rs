use lakediff::comparison::{AnalysisReport, Analyzer, AnalyzerConfig};
use lakediff::hashing::gpu::{BufferHandle, DeviceError, DeviceMemory, GpuSettings};
use lakediff::hashing::StagingDevice;
use lakediff::scanner::{Walker, WalkerConfig};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

struct FakeDevice {
    free: u64,
    broken: bool,
    next: AtomicU64,
    live: Arc<AtomicUsize>,
}

impl FakeDevice {
    fn new(free: u64, broken: bool, live: Arc<AtomicUsize>) -> Self {
        Self {
            free,
            broken,
            next: AtomicU64::new(0),
            live,
        }
    }
}

impl StagingDevice for FakeDevice {
    fn describe(&self) -> String {
        "fake".to_string()
    }

    fn memory_info(&self) -> Result<DeviceMemory, DeviceError> {
        if self.broken {
            return Err(DeviceError::Unavailable("fake device offline".to_string()));
        }
        Ok(DeviceMemory {
            free: self.free,
            total: self.free,
        })
    }

    fn allocate(&self, len: u64) -> Result<BufferHandle, DeviceError> {
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(BufferHandle::new(self.next.fetch_add(1, Ordering::SeqCst), len))
    }

    fn upload(&self, _buffer: &BufferHandle, _data: &[u8]) -> Result<(), DeviceError> {
        Ok(())
    }

    fn release(&self, _buffer: BufferHandle) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

fn content(tail: u8) -> Vec<u8> {
    let mut bytes = vec![7u8; 3000];
    bytes[2999] = tail;
    bytes
}

fn fixture() -> (TempDir, TempDir) {
    let lake = tempdir().unwrap();
    let lib = tempdir().unwrap();
    fs::write(lake.path().join("same.mobi"), content(b'a')).unwrap();
    fs::write(lake.path().join("differs.mobi"), content(b'b')).unwrap();
    fs::write(lib.path().join("library.mobi"), content(b'a')).unwrap();
    (lake, lib)
}

fn run(analyzer: &Analyzer, lake: &Path, lib: &Path) -> AnalysisReport {
    let walk = |root: &Path| Walker::new(root, WalkerConfig::default()).walk().unwrap();
    analyzer.analyze(walk(lake), walk(lib), &HashSet::new())
}

fn gpu_config() -> AnalyzerConfig {
    AnalyzerConfig::default().with_gpu(GpuSettings::default().with_chunk_size(1024), 1000)
}

#[test]
fn test_gpu_path_matches_cpu_path() {
    let (lake, lib) = fixture();
    let live = Arc::new(AtomicUsize::new(0));

    let cpu = run(&Analyzer::new(AnalyzerConfig::default()), lake.path(), lib.path());
    let gpu = run(
        &Analyzer::with_device(
            gpu_config(),
            Box::new(FakeDevice::new(1 << 20, false, live.clone())),
        ),
        lake.path(),
        lib.path(),
    );

    let names = |r: &AnalysisReport| r.unique.iter().map(|f| f.path.clone()).collect::<Vec<_>>();
    assert_eq!(names(&cpu), names(&gpu));
    assert_eq!(gpu.unique.len(), 1);
    assert_eq!(gpu.unique[0].filename, "differs.mobi");
    assert!(gpu.summary.gpu_active);
    assert_eq!(gpu.summary.gpu_assigned, 2);
    assert_eq!(gpu.summary.hashing.gpu_dispatched, 3);
    assert_eq!(gpu.summary.gpu_fallbacks, 0);
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn test_files_larger_than_device_memory_are_chunked() {
    let (lake, lib) = fixture();
    let live = Arc::new(AtomicUsize::new(0));
    let analyzer = Analyzer::with_device(
        gpu_config(),
        Box::new(FakeDevice::new(1000, false, live.clone())),
    );

    let report = run(&analyzer, lake.path(), lib.path());
    assert_eq!(report.unique.len(), 1);
    assert_eq!(report.summary.found_in_library, 1);
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[test]
fn test_broken_device_falls_back_to_cpu() {
    let (lake, lib) = fixture();
    let analyzer = Analyzer::with_device(
        gpu_config(),
        Box::new(FakeDevice::new(1 << 20, true, Arc::new(AtomicUsize::new(0)))),
    );
    assert!(!analyzer.gpu_active());

    let report = run(&analyzer, lake.path(), lib.path());
    assert_eq!(report.unique.len(), 1);
    assert_eq!(report.summary.gpu_assigned, 0);
    assert_eq!(report.summary.hashing.gpu_dispatched, 0);
}

#[cfg(not(feature = "cuda"))]
#[test]
fn test_probe_without_driver_is_cpu_only() {
    let (lake, lib) = fixture();
    let analyzer = Analyzer::new(gpu_config());
    assert!(!analyzer.gpu_active());
    let report = run(&analyzer, lake.path(), lib.path());
    assert_eq!(report.unique.len(), 1);
}

#[test]
fn test_files_below_threshold_stay_on_cpu() {
    let (lake, lib) = fixture();
    let analyzer = Analyzer::with_device(
        AnalyzerConfig::default().with_gpu(GpuSettings::default(), 10_000),
        Box::new(FakeDevice::new(1 << 20, false, Arc::new(AtomicUsize::new(0)))),
    );
    let report = run(&analyzer, lake.path(), lib.path());
    assert_eq!(report.summary.gpu_assigned, 0);
    assert_eq!(report.summary.hashing.gpu_dispatched, 0);
    assert_eq!(report.unique.len(), 1);
}
