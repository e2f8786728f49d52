//! Accelerator-staged hashing for large files.
//!
//! # Overview
//!
//! The accelerator never computes SHA-256 itself. Its job is to stage file
//! contents through device memory; the digest is computed on the host as the
//! bytes stream past, so results are identical to [`CpuHasher`](super::CpuHasher).
//!
//! The device is abstracted behind [`StagingDevice`]. Availability is probed
//! exactly once, when the [`GpuHasher`] is constructed, and cached on the
//! instance. Every failure after that (allocation, transfer, read) sends the
//! affected file to the CPU fallback backend; a missing device sends the
//! whole batch there.
//!
//! # Memory model
//!
//! Before each file the backend asks the device how much memory is free and
//! treats 80% of it as usable. Files that fit are staged in one buffer;
//! larger files are staged in chunks of `min(chunk_size, usable)`. Each
//! buffer is released as soon as its bytes have been consumed, through the
//! [`StagedBuffer`] guard.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sha2::{Digest as _, Sha256};
use thiserror::Error;

use super::{Digest, HashBackend, HashError, HashStage};
use crate::records::FileRecord;

/// Default number of files handed to the device per batch.
pub const DEFAULT_GPU_BATCH_SIZE: usize = 10;

/// Default staging chunk for files larger than usable device memory (256 MiB).
pub const DEFAULT_GPU_CHUNK_SIZE: u64 = 256 * 1024 * 1024;

/// Default minimum file size routed to the accelerator (100 MiB).
pub const DEFAULT_GPU_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Errors reported by a staging device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No usable device (driver missing, device id out of range, ...).
    #[error("accelerator unavailable: {0}")]
    Unavailable(String),

    /// The device could not satisfy an allocation.
    #[error("device out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Bytes requested
        requested: u64,
        /// Bytes the device reported as free
        available: u64,
    },

    /// Copying host bytes into a device buffer failed.
    #[error("device transfer failed: {0}")]
    Transfer(String),
}

/// Free and total memory reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMemory {
    /// Bytes currently free
    pub free: u64,
    /// Total bytes on the device
    pub total: u64,
}

impl DeviceMemory {
    /// Portion of free memory the backend is willing to use (80%).
    #[must_use]
    pub fn usable(&self) -> u64 {
        self.free - self.free / 5
    }
}

/// Opaque handle to a device-side allocation.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    id: u64,
    len: u64,
}

impl BufferHandle {
    /// Wrap a device allocation id. Intended for [`StagingDevice`] implementors.
    #[must_use]
    pub fn new(id: u64, len: u64) -> Self {
        Self { id, len }
    }

    /// Device allocation id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Allocation size in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the allocation is zero-sized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A device that file contents can be staged through.
pub trait StagingDevice: Send + Sync {
    /// Human-readable device description.
    fn describe(&self) -> String;

    /// Query current free/total memory.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] if the device cannot be queried.
    fn memory_info(&self) -> Result<DeviceMemory, DeviceError>;

    /// Allocate `len` bytes of device memory.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::OutOfMemory`] or [`DeviceError::Unavailable`].
    fn allocate(&self, len: u64) -> Result<BufferHandle, DeviceError>;

    /// Copy `data` into a previously allocated buffer.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Transfer`] if the copy fails.
    fn upload(&self, buffer: &BufferHandle, data: &[u8]) -> Result<(), DeviceError>;

    /// Free a buffer. Must not fail.
    fn release(&self, buffer: BufferHandle);
}

/// Device buffer that is released when dropped.
pub struct StagedBuffer<'a> {
    device: &'a dyn StagingDevice,
    handle: Option<BufferHandle>,
}

impl<'a> StagedBuffer<'a> {
    /// Allocate a buffer sized for `len` bytes.
    ///
    /// # Errors
    ///
    /// Propagates the device's allocation error.
    pub fn allocate(device: &'a dyn StagingDevice, len: u64) -> Result<Self, DeviceError> {
        let handle = device.allocate(len)?;
        Ok(Self {
            device,
            handle: Some(handle),
        })
    }

    /// Copy `data` into the buffer.
    ///
    /// # Errors
    ///
    /// Propagates the device's transfer error.
    pub fn upload(&self, data: &[u8]) -> Result<(), DeviceError> {
        match self.handle {
            Some(ref handle) => self.device.upload(handle, data),
            None => Err(DeviceError::Transfer("buffer already released".to_string())),
        }
    }
}

impl Drop for StagedBuffer<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.device.release(handle);
        }
    }
}

/// Accelerator tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuSettings {
    /// Device ordinal to use
    pub device_id: u32,
    /// Files per device batch
    pub batch_size: usize,
    /// Maximum staging chunk for oversized files
    pub chunk_size: u64,
}

impl Default for GpuSettings {
    fn default() -> Self {
        Self {
            device_id: 0,
            batch_size: DEFAULT_GPU_BATCH_SIZE,
            chunk_size: DEFAULT_GPU_CHUNK_SIZE,
        }
    }
}

impl GpuSettings {
    /// Set the device ordinal.
    #[must_use]
    pub fn with_device_id(mut self, device_id: u32) -> Self {
        self.device_id = device_id;
        self
    }

    /// Set the batch size (at least one).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the staging chunk size (at least one byte).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

/// Anything that stops a file from being staged on the device.
#[derive(Debug, Error)]
enum StagingFailure {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Read(#[from] HashError),
}

/// Hash backend that stages large files through an accelerator.
pub struct GpuHasher {
    device: Option<Box<dyn StagingDevice>>,
    unavailable_reason: Option<String>,
    settings: GpuSettings,
    fallback: Arc<dyn HashBackend>,
    staged_files: AtomicUsize,
    fallback_files: AtomicUsize,
}

impl fmt::Debug for GpuHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuHasher")
            .field("device", &self.device.as_ref().map(|d| d.describe()))
            .field("unavailable_reason", &self.unavailable_reason)
            .field("settings", &self.settings)
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

impl GpuHasher {
    /// Probe for an accelerator driver and open `settings.device_id`.
    ///
    /// Builds with the `cuda` feature open a CUDA device; other builds link
    /// no driver, so the device is reported unavailable and every batch is
    /// hashed by `fallback`.
    #[must_use]
    pub fn probe(settings: GpuSettings, fallback: Arc<dyn HashBackend>) -> Self {
        match open_driver(settings.device_id) {
            Ok(device) => Self::with_device(device, settings, fallback),
            Err(e) => {
                log::info!("GPU acceleration disabled: {}", e);
                Self::unavailable(e.to_string(), settings, fallback)
            }
        }
    }

    /// Use an explicit staging device. The device is queried once here; if
    /// that query fails the backend is marked unavailable for its lifetime.
    #[must_use]
    pub fn with_device(
        device: Box<dyn StagingDevice>,
        settings: GpuSettings,
        fallback: Arc<dyn HashBackend>,
    ) -> Self {
        match device.memory_info() {
            Ok(memory) => {
                log::info!(
                    "GPU device {} ready: {} free of {}",
                    device.describe(),
                    bytesize::ByteSize::b(memory.free),
                    bytesize::ByteSize::b(memory.total)
                );
                Self {
                    device: Some(device),
                    unavailable_reason: None,
                    settings,
                    fallback,
                    staged_files: AtomicUsize::new(0),
                    fallback_files: AtomicUsize::new(0),
                }
            }
            Err(e) => {
                log::warn!("GPU device {} failed its probe: {}", device.describe(), e);
                Self::unavailable(e.to_string(), settings, fallback)
            }
        }
    }

    fn unavailable(reason: String, settings: GpuSettings, fallback: Arc<dyn HashBackend>) -> Self {
        Self {
            device: None,
            unavailable_reason: Some(reason),
            settings,
            fallback,
            staged_files: AtomicUsize::new(0),
            fallback_files: AtomicUsize::new(0),
        }
    }

    /// Whether the probe found a usable device.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.device.is_some()
    }

    /// Why the device is unavailable, if it is.
    #[must_use]
    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable_reason.as_deref()
    }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> &GpuSettings {
        &self.settings
    }

    /// Files hashed through the device so far.
    #[must_use]
    pub fn staged_count(&self) -> usize {
        self.staged_files.load(Ordering::Relaxed)
    }

    /// Files that fell back to the CPU after a device or read failure.
    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.fallback_files.load(Ordering::Relaxed)
    }

    fn stage_file(
        &self,
        device: &dyn StagingDevice,
        file: &FileRecord,
    ) -> Result<Digest, StagingFailure> {
        let usable = device.memory_info()?.usable();
        let mut reader = File::open(&file.path).map_err(|e| HashError::from_io(&file.path, e))?;
        let mut hasher = Sha256::new();

        if file.size <= usable {
            let mut data = Vec::with_capacity(usize::try_from(file.size).unwrap_or(0));
            reader
                .read_to_end(&mut data)
                .map_err(|e| HashError::from_io(&file.path, e))?;
            if !data.is_empty() {
                let buffer = StagedBuffer::allocate(device, data.len() as u64)?;
                buffer.upload(&data)?;
            }
            hasher.update(&data);
        } else {
            let chunk_size = self.settings.chunk_size.min(usable);
            if chunk_size == 0 {
                return Err(DeviceError::OutOfMemory {
                    requested: file.size,
                    available: usable,
                }
                .into());
            }
            log::debug!(
                "Staging {} in {} chunks",
                file.path.display(),
                bytesize::ByteSize::b(chunk_size)
            );

            let mut chunk = vec![0u8; usize::try_from(chunk_size).unwrap_or(usize::MAX)];
            loop {
                let read = read_full(&mut reader, &mut chunk)
                    .map_err(|e| HashError::from_io(&file.path, e))?;
                if read == 0 {
                    break;
                }
                let buffer = StagedBuffer::allocate(device, read as u64)?;
                buffer.upload(&chunk[..read])?;
                drop(buffer);
                hasher.update(&chunk[..read]);
            }
        }

        Ok(hasher.finalize().into())
    }
}

#[cfg(feature = "cuda")]
fn open_driver(device_id: u32) -> Result<Box<dyn StagingDevice>, DeviceError> {
    let device = super::cuda::CudaStagingDevice::open(device_id)?;
    Ok(Box::new(device))
}

#[cfg(not(feature = "cuda"))]
fn open_driver(device_id: u32) -> Result<Box<dyn StagingDevice>, DeviceError> {
    Err(DeviceError::Unavailable(format!(
        "built without the `cuda` feature, no driver for device {device_id}"
    )))
}

/// Fill `buf` as far as the reader allows; returns bytes read (0 at EOF).
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl HashBackend for GpuHasher {
    fn name(&self) -> &'static str {
        "gpu"
    }

    // 1 KiB reads never benefit from device staging.
    fn hash_prefix(&self, file: &FileRecord) -> Result<Digest, HashError> {
        self.fallback.hash_prefix(file)
    }

    fn hash_full(&self, file: &FileRecord) -> Result<Digest, HashError> {
        let Some(ref device) = self.device else {
            return self.fallback.hash_full(file);
        };

        match self.stage_file(device.as_ref(), file) {
            Ok(digest) => {
                self.staged_files.fetch_add(1, Ordering::Relaxed);
                Ok(digest)
            }
            Err(e) => {
                log::warn!(
                    "GPU hashing failed for {}, falling back to CPU: {}",
                    file.path.display(),
                    e
                );
                self.fallback_files.fetch_add(1, Ordering::Relaxed);
                self.fallback.hash_full(file)
            }
        }
    }

    fn hash_batch(&self, files: &[&FileRecord], stage: HashStage) -> Vec<Option<Digest>> {
        if stage == HashStage::Prefix || self.device.is_none() {
            return self.fallback.hash_batch(files, stage);
        }

        let mut results = Vec::with_capacity(files.len());
        for batch in files.chunks(self.settings.batch_size.max(1)) {
            log::debug!("GPU batch of {} files", batch.len());
            for file in batch {
                match self.hash_full(file) {
                    Ok(digest) => results.push(Some(digest)),
                    Err(e) => {
                        log::warn!("Failed to compute full hash: {}", e);
                        results.push(None);
                    }
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::{digest_bytes, CpuHasher};
    use std::fs;
    use std::sync::atomic::AtomicU64;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory device that records every allocation.
    #[derive(Default)]
    struct MockDevice {
        free: u64,
        fail_probe: bool,
        fail_uploads: bool,
        next_id: AtomicU64,
        live: Arc<AtomicUsize>,
        allocations: Arc<Mutex<Vec<u64>>>,
        uploaded: Arc<Mutex<Vec<u8>>>,
    }

    impl MockDevice {
        fn with_free(free: u64) -> Self {
            Self {
                free,
                ..Self::default()
            }
        }
    }

    impl StagingDevice for MockDevice {
        fn describe(&self) -> String {
            "mock".to_string()
        }

        fn memory_info(&self) -> Result<DeviceMemory, DeviceError> {
            if self.fail_probe {
                return Err(DeviceError::Unavailable("mock driver missing".to_string()));
            }
            Ok(DeviceMemory {
                free: self.free,
                total: self.free * 2,
            })
        }

        fn allocate(&self, len: u64) -> Result<BufferHandle, DeviceError> {
            if len > self.free {
                return Err(DeviceError::OutOfMemory {
                    requested: len,
                    available: self.free,
                });
            }
            self.allocations.lock().unwrap().push(len);
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(BufferHandle::new(
                self.next_id.fetch_add(1, Ordering::SeqCst),
                len,
            ))
        }

        fn upload(&self, buffer: &BufferHandle, data: &[u8]) -> Result<(), DeviceError> {
            if self.fail_uploads {
                return Err(DeviceError::Transfer("mock transfer error".to_string()));
            }
            assert!(data.len() as u64 <= buffer.len());
            self.uploaded.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        fn release(&self, _buffer: BufferHandle) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn cpu() -> Arc<dyn HashBackend> {
        Arc::new(CpuHasher::new(2))
    }

    fn write(dir: &TempDir, name: &str, content: &[u8]) -> FileRecord {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        FileRecord::new(&path, dir.path(), content.len() as u64)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_probe_reports_unavailable_and_falls_back() {
        let dir = TempDir::new().unwrap();
        let record = write(&dir, "a.bin", b"payload");
        let hasher = GpuHasher::probe(GpuSettings::default(), cpu());

        assert!(!hasher.is_available());
        assert!(hasher.unavailable_reason().unwrap().contains("cuda"));
        let results = hasher.hash_batch(&[&record], HashStage::Full);
        assert_eq!(results, vec![Some(digest_bytes(b"payload"))]);
        assert_eq!(hasher.staged_count(), 0);
    }

    #[test]
    fn test_failed_device_probe_marks_unavailable() {
        let device = MockDevice {
            fail_probe: true,
            ..MockDevice::default()
        };
        let hasher = GpuHasher::with_device(Box::new(device), GpuSettings::default(), cpu());
        assert!(!hasher.is_available());
        assert!(hasher.unavailable_reason().unwrap().contains("mock driver missing"));
    }

    #[test]
    fn test_digest_matches_cpu_backend() {
        let dir = TempDir::new().unwrap();
        let content = pattern(50_000);
        let record = write(&dir, "big.bin", &content);
        let cpu_backend = CpuHasher::new(1);

        let hasher =
            GpuHasher::with_device(Box::new(MockDevice::with_free(1 << 20)), GpuSettings::default(), cpu());
        assert!(hasher.is_available());

        assert_eq!(
            hasher.hash_full(&record).unwrap(),
            cpu_backend.hash_full(&record).unwrap()
        );
        assert_eq!(hasher.staged_count(), 1);
        assert_eq!(hasher.fallback_count(), 0);
    }

    #[test]
    fn test_oversized_file_staged_in_chunks_and_released() {
        let dir = TempDir::new().unwrap();
        let content = pattern(10_000);
        let record = write(&dir, "huge.bin", &content);

        // usable = 4000 - 800 = 3200; chunk = min(1000, 3200) = 1000
        let device = MockDevice::with_free(4000);
        let allocations = device.allocations.clone();
        let live = device.live.clone();
        let uploaded = device.uploaded.clone();
        let settings = GpuSettings::default().with_chunk_size(1000);
        let hasher = GpuHasher::with_device(Box::new(device), settings, cpu());

        assert_eq!(hasher.hash_full(&record).unwrap(), digest_bytes(&content));
        let allocations = allocations.lock().unwrap();
        assert_eq!(allocations.len(), 10);
        assert!(allocations.iter().all(|&len| len == 1000));
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert_eq!(*uploaded.lock().unwrap(), content);
    }

    #[test]
    fn test_chunk_capped_by_usable_memory() {
        let dir = TempDir::new().unwrap();
        let content = pattern(5_000);
        let record = write(&dir, "big.bin", &content);

        // usable = 1000 - 200 = 800 < chunk_size
        let device = MockDevice::with_free(1000);
        let allocations = device.allocations.clone();
        let hasher = GpuHasher::with_device(Box::new(device), GpuSettings::default(), cpu());

        assert_eq!(hasher.hash_full(&record).unwrap(), digest_bytes(&content));
        let allocations = allocations.lock().unwrap();
        assert!(allocations.iter().all(|&len| len <= 800));
        assert_eq!(allocations.iter().sum::<u64>(), 5_000);
    }

    #[test]
    fn test_transfer_failure_falls_back_per_file() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.bin", b"first");
        let b = write(&dir, "b.bin", b"second");
        let device = MockDevice {
            free: 1 << 20,
            fail_uploads: true,
            ..MockDevice::default()
        };
        let live = device.live.clone();
        let hasher = GpuHasher::with_device(Box::new(device), GpuSettings::default(), cpu());

        let results = hasher.hash_batch(&[&a, &b], HashStage::Full);
        assert_eq!(
            results,
            vec![Some(digest_bytes(b"first")), Some(digest_bytes(b"second"))]
        );
        assert_eq!(hasher.fallback_count(), 2);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_free_memory_falls_back() {
        let dir = TempDir::new().unwrap();
        let record = write(&dir, "a.bin", b"content");
        let hasher = GpuHasher::with_device(Box::new(MockDevice::with_free(0)), GpuSettings::default(), cpu());

        assert_eq!(hasher.hash_full(&record).unwrap(), digest_bytes(b"content"));
        assert_eq!(hasher.fallback_count(), 1);
    }

    #[test]
    fn test_missing_file_yields_none_and_batches_keep_order() {
        let dir = TempDir::new().unwrap();
        let records: Vec<FileRecord> = (0..7)
            .map(|i| write(&dir, &format!("{i}.bin"), format!("n{i}").as_bytes()))
            .collect();
        let missing = FileRecord::new(&dir.path().join("missing.bin"), dir.path(), 3);
        let mut refs: Vec<&FileRecord> = records.iter().collect();
        refs.insert(3, &missing);

        let settings = GpuSettings::default().with_batch_size(3);
        let hasher = GpuHasher::with_device(Box::new(MockDevice::with_free(1 << 20)), settings, cpu());
        let results = hasher.hash_batch(&refs, HashStage::Full);

        assert_eq!(results.len(), 8);
        assert_eq!(results[3], None);
        assert_eq!(results[0], Some(digest_bytes(b"n0")));
        assert_eq!(results[7], Some(digest_bytes(b"n6")));
    }

    #[test]
    fn test_prefix_stage_always_uses_fallback() {
        let dir = TempDir::new().unwrap();
        let content = pattern(4096);
        let record = write(&dir, "p.bin", &content);
        let device = MockDevice::with_free(1 << 20);
        let allocations = device.allocations.clone();
        let hasher = GpuHasher::with_device(Box::new(device), GpuSettings::default(), cpu());

        let results = hasher.hash_batch(&[&record], HashStage::Prefix);
        assert_eq!(results, vec![Some(digest_bytes(&content[..1024]))]);
        assert!(allocations.lock().unwrap().is_empty());
    }

    #[test]
    fn test_usable_memory_is_eighty_percent() {
        let memory = DeviceMemory {
            free: 1000,
            total: 2000,
        };
        assert_eq!(memory.usable(), 800);
    }
}
