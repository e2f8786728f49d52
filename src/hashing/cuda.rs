//! CUDA staging device, built with the `cuda` feature.
//!
//! Buffers live in a handle table keyed by the id inside each
//! [`BufferHandle`]; releasing a handle drops its `CudaSlice`, which returns
//! the memory to the driver.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cudarc::driver::{result, CudaDevice, CudaSlice};

use super::gpu::{BufferHandle, DeviceError, DeviceMemory, StagingDevice};

/// A CUDA device selected by ordinal.
pub struct CudaStagingDevice {
    device: Arc<CudaDevice>,
    ordinal: u32,
    buffers: Mutex<HashMap<u64, CudaSlice<u8>>>,
    next_id: AtomicU64,
}

impl CudaStagingDevice {
    /// Open device `ordinal`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Unavailable`] if the driver cannot be loaded or
    /// the ordinal does not name a device.
    pub fn open(ordinal: u32) -> Result<Self, DeviceError> {
        let index = usize::try_from(ordinal)
            .map_err(|_| DeviceError::Unavailable(format!("invalid device ordinal {ordinal}")))?;
        // The driver library is loaded lazily and cudarc panics when it is missing.
        let opened = std::panic::catch_unwind(|| CudaDevice::new(index)).map_err(|_| {
            DeviceError::Unavailable("CUDA driver library could not be loaded".to_string())
        })?;
        let device = opened
            .map_err(|e| DeviceError::Unavailable(format!("CUDA device {ordinal}: {e}")))?;
        Ok(Self {
            device,
            ordinal,
            buffers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    fn with_buffers<T>(
        &self,
        f: impl FnOnce(&mut HashMap<u64, CudaSlice<u8>>) -> Result<T, DeviceError>,
    ) -> Result<T, DeviceError> {
        let mut buffers = self
            .buffers
            .lock()
            .map_err(|_| DeviceError::Transfer("buffer table poisoned".to_string()))?;
        f(&mut buffers)
    }
}

impl StagingDevice for CudaStagingDevice {
    fn describe(&self) -> String {
        format!("cuda:{}", self.ordinal)
    }

    fn memory_info(&self) -> Result<DeviceMemory, DeviceError> {
        self.device
            .bind_to_thread()
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
        let (free, total) =
            result::mem_get_info().map_err(|e| DeviceError::Unavailable(e.to_string()))?;
        Ok(DeviceMemory {
            free: free as u64,
            total: total as u64,
        })
    }

    fn allocate(&self, len: u64) -> Result<BufferHandle, DeviceError> {
        let size = usize::try_from(len).map_err(|_| DeviceError::OutOfMemory {
            requested: len,
            available: 0,
        })?;
        let slice = self.device.alloc_zeros::<u8>(size).map_err(|e| {
            log::debug!("CUDA allocation of {} bytes failed: {}", len, e);
            let available = self.memory_info().map_or(0, |m| m.free);
            DeviceError::OutOfMemory {
                requested: len,
                available,
            }
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.with_buffers(|buffers| {
            buffers.insert(id, slice);
            Ok(BufferHandle::new(id, len))
        })
    }

    fn upload(&self, buffer: &BufferHandle, data: &[u8]) -> Result<(), DeviceError> {
        self.with_buffers(|buffers| {
            let slice = buffers
                .get_mut(&buffer.id())
                .ok_or_else(|| DeviceError::Transfer(format!("unknown buffer {}", buffer.id())))?;
            let mut view = slice.try_slice_mut(0..data.len()).ok_or_else(|| {
                DeviceError::Transfer(format!(
                    "{} bytes do not fit a {} byte buffer",
                    data.len(),
                    buffer.len()
                ))
            })?;
            self.device
                .htod_sync_copy_into(data, &mut view)
                .map_err(|e| DeviceError::Transfer(e.to_string()))
        })
    }

    fn release(&self, buffer: BufferHandle) {
        if let Ok(mut buffers) = self.buffers.lock() {
            buffers.remove(&buffer.id());
        }
    }
}
