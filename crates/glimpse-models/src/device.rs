use candle_core::{DType, Device};

/// Weights and activations are f32 on every device.
pub const MODEL_DTYPE: DType = DType::F32;

/// Pick the device the models run on.
///
/// NOTE: to run the models with Cuda, build with the `cuda` feature.
#[cfg(feature = "cuda")]
pub fn select_device(force_cpu: bool) -> Device {
    if force_cpu {
        return Device::Cpu;
    }

    match Device::cuda_if_available(0) {
        Ok(device) => device,
        Err(e) => {
            log::warn!("CUDA not available, defaulting to CPU: {e}");
            Device::Cpu
        }
    }
}

/// Pick the device the models run on.
#[cfg(not(feature = "cuda"))]
pub fn select_device(_force_cpu: bool) -> Device {
    Device::Cpu
}

/// Short human readable name of a device, e.g. `cpu` or `cuda`.
pub fn device_label(device: &Device) -> &'static str {
    if device.is_cuda() {
        "cuda"
    } else if device.is_metal() {
        "metal"
    } else {
        "cpu"
    }
}
