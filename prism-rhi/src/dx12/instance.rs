//! DXGI factory, adapter enumeration and device creation.

use std::ffi::c_void;
use windows::core::Interface;
use windows::Win32::Foundation::BOOL;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::*;
use crate::adapter::{rank_adapters, AdapterInfo, AdapterKind, ApiVersion};
use crate::backend::{DeviceCapabilities, DeviceDesc, InstanceDesc, RhiInstance};
use crate::error::{RhiError, RhiResult, ResultExt};
use crate::types::WindowInfo;
use super::device::Dx12Device;
use super::DirectX12;

/// Feature level bonuses on top of the adapter kind score.
const VERSION_SCORES: [(ApiVersion, u32); 3] = [
    (ApiVersion::new(12, 0), 200),
    (ApiVersion::new(12, 1), 400),
    (ApiVersion::new(12, 2), 600),
];

/// Checked from the newest down, the first one a device can be created with is reported.
const FEATURE_LEVELS: [(D3D_FEATURE_LEVEL, ApiVersion); 4] = [
    (D3D_FEATURE_LEVEL_12_2, ApiVersion::new(12, 2)),
    (D3D_FEATURE_LEVEL_12_1, ApiVersion::new(12, 1)),
    (D3D_FEATURE_LEVEL_12_0, ApiVersion::new(12, 0)),
    (D3D_FEATURE_LEVEL_11_0, ApiVersion::new(11, 0)),
];

pub(crate) const MIN_FEATURE_LEVEL: D3D_FEATURE_LEVEL = D3D_FEATURE_LEVEL_11_0;

/// Adapters with less dedicated memory are treated as integrated.
const DISCRETE_MEMORY_THRESHOLD: u64 = 512 * 1024 * 1024;

pub(crate) struct PhysicalAdapter {
    pub(crate) adapter: IDXGIAdapter1,
    pub(crate) info: AdapterInfo,
}

pub struct Dx12Instance {
    factory: IDXGIFactory6,
    adapters: Vec<PhysicalAdapter>,
    window: Option<WindowInfo>,
    validation: bool,
}

impl Dx12Instance {
    #[inline]
    pub fn factory(&self) -> &IDXGIFactory6 {
        &self.factory
    }
}

impl RhiInstance<DirectX12> for Dx12Instance {
    fn new(desc: &InstanceDesc) -> RhiResult<Self> {
        let validation = desc.enable_validation && cfg!(feature = "validation");
        if validation {
            enable_debug_layer();
        }

        let flags = if validation { DXGI_CREATE_FACTORY_DEBUG } else { DXGI_CREATE_FACTORY_FLAGS(0) };
        let factory: IDXGIFactory6 = unsafe { CreateDXGIFactory2(flags) }.context("CreateDXGIFactory2")?;

        let adapters = enumerate(&factory)?;
        for adapter in &adapters {
            log::info!(
                "Adapter {} (score {}, {:?}, feature level {}.{})",
                adapter.info.name,
                adapter.info.score(&VERSION_SCORES),
                adapter.info.kind,
                adapter.info.api_version.major,
                adapter.info.api_version.minor
            );
        }

        log::info!("DirectX12 instance created for `{}`", desc.application_name);
        Ok(Self {
            factory,
            adapters,
            window: desc.window,
            validation,
        })
    }

    fn enumerate_adapters(&self) -> RhiResult<Vec<AdapterInfo>> {
        Ok(self.adapters.iter().map(|adapter| adapter.info.clone()).collect())
    }

    #[profiling::function]
    fn create_device(&self, desc: &DeviceDesc) -> RhiResult<Dx12Device> {
        let adapter = self
            .adapters
            .iter()
            .find(|adapter| adapter.info.usable)
            .ok_or(RhiError::NoSuitableAdapter)?;

        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(&adapter.adapter, MIN_FEATURE_LEVEL, &mut device) }.context("D3D12CreateDevice")?;
        let device = device.ok_or_else(|| RhiError::backend("D3D12CreateDevice", "no device returned"))?;

        let capabilities = capabilities(&device, adapter);
        if desc.use_raytracing {
            capabilities.require_raytracing()?;
        }
        if desc.use_hdr && !capabilities.is_supported_hdr() {
            log::warn!("HDR output requested but {} has no HDR output, falling back to SDR", adapter.info.name);
        }

        Dx12Device::new(
            self.factory.clone(),
            adapter,
            device,
            capabilities,
            desc,
            self.window,
            self.validation,
        )
    }
}

fn enable_debug_layer() {
    let mut debug: Option<ID3D12Debug> = None;
    match unsafe { D3D12GetDebugInterface(&mut debug) } {
        Ok(()) => {
            if let Some(debug) = debug {
                unsafe { debug.EnableDebugLayer() };
                log::info!("D3D12 debug layer enabled");
            }
        }
        Err(e) => log::warn!("D3D12 debug layer is not available: {e}"),
    }
}

fn adapter_name(description: &[u16]) -> String {
    let len = description.iter().position(|&c| c == 0).unwrap_or(description.len());
    String::from_utf16_lossy(&description[..len])
}

fn highest_feature_level(adapter: &IDXGIAdapter1) -> Option<ApiVersion> {
    FEATURE_LEVELS.iter().find_map(|&(level, version)| {
        let supported = unsafe {
            D3D12CreateDevice(adapter, level, std::ptr::null_mut::<Option<ID3D12Device>>())
        }
        .is_ok();
        supported.then_some(version)
    })
}

fn enumerate(factory: &IDXGIFactory6) -> RhiResult<Vec<PhysicalAdapter>> {
    let mut adapters = Vec::new();
    for index in 0.. {
        let adapter: IDXGIAdapter1 =
            match unsafe { factory.EnumAdapterByGpuPreference(index, DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE) } {
                Ok(adapter) => adapter,
                Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
                Err(e) => return Err(RhiError::backend("EnumAdapterByGpuPreference", e)),
            };
        let desc = unsafe { adapter.GetDesc1() }.context("IDXGIAdapter1::GetDesc1")?;

        let software = desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0;
        let dedicated_video_memory = desc.DedicatedVideoMemory as u64;
        let kind = if software {
            AdapterKind::Cpu
        } else if dedicated_video_memory >= DISCRETE_MEMORY_THRESHOLD {
            AdapterKind::Discrete
        } else {
            AdapterKind::Integrated
        };

        let feature_level = highest_feature_level(&adapter);
        adapters.push(PhysicalAdapter {
            info: AdapterInfo {
                name: adapter_name(&desc.Description),
                vendor_id: desc.VendorId,
                device_id: desc.DeviceId,
                kind,
                dedicated_video_memory,
                api_version: feature_level.unwrap_or(ApiVersion::new(0, 0)),
                usable: feature_level.is_some(),
            },
            adapter,
        });
    }

    let mut infos: Vec<AdapterInfo> = adapters.iter().map(|adapter| adapter.info.clone()).collect();
    rank_adapters(&mut infos, &VERSION_SCORES);
    let mut ranked = Vec::with_capacity(adapters.len());
    for info in infos {
        if let Some(index) = adapters.iter().position(|adapter| adapter.info == info) {
            ranked.push(adapters.swap_remove(index));
        }
    }
    Ok(ranked)
}

fn check_feature<T: Default>(device: &ID3D12Device, feature: D3D12_FEATURE) -> Option<T> {
    let mut data = T::default();
    unsafe {
        device.CheckFeatureSupport(
            feature,
            &mut data as *mut T as *mut c_void,
            std::mem::size_of::<T>() as u32,
        )
    }
    .ok()
    .map(|_| data)
}

/// HDR needs an output currently running in an HDR10 color space.
fn hdr_output(adapter: &IDXGIAdapter1) -> bool {
    let Ok(output) = (unsafe { adapter.EnumOutputs(0) }) else {
        return false;
    };
    let Ok(output) = output.cast::<IDXGIOutput6>() else {
        return false;
    };
    unsafe { output.GetDesc1() }
        .map(|desc| desc.ColorSpace == windows::Win32::Graphics::Dxgi::Common::DXGI_COLOR_SPACE_RGB_FULL_G2084_NONE_P2020)
        .unwrap_or(false)
}

fn capabilities(device: &ID3D12Device, adapter: &PhysicalAdapter) -> DeviceCapabilities {
    let options5: Option<D3D12_FEATURE_DATA_D3D12_OPTIONS5> = check_feature(device, D3D12_FEATURE_D3D12_OPTIONS5);
    let options6: Option<D3D12_FEATURE_DATA_D3D12_OPTIONS6> = check_feature(device, D3D12_FEATURE_D3D12_OPTIONS6);
    let options7: Option<D3D12_FEATURE_DATA_D3D12_OPTIONS7> = check_feature(device, D3D12_FEATURE_D3D12_OPTIONS7);

    DeviceCapabilities {
        hdr: hdr_output(&adapter.adapter),
        raytracing: options5.is_some_and(|o| o.RaytracingTier.0 >= D3D12_RAYTRACING_TIER_1_0.0),
        mesh_shading: options7.is_some_and(|o| o.MeshShaderTier.0 >= D3D12_MESH_SHADER_TIER_1.0),
        variable_rate_shading: options6
            .is_some_and(|o| o.VariableShadingRateTier.0 >= D3D12_VARIABLE_SHADING_RATE_TIER_1.0),
        // feature level 11 and up
        geometry_shader: true,
        tessellation: true,
    }
}

/// Tearing is needed for presenting without vsync on flip model swapchains.
pub(crate) fn tearing_supported(factory: &IDXGIFactory6) -> bool {
    let mut allow = BOOL::default();
    unsafe {
        factory.CheckFeatureSupport(
            DXGI_FEATURE_PRESENT_ALLOW_TEARING,
            &mut allow as *mut BOOL as *mut c_void,
            std::mem::size_of::<BOOL>() as u32,
        )
    }
    .is_ok()
        && allow.as_bool()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_names_stop_at_nul() {
        let mut description = [0u16; 128];
        for (slot, c) in description.iter_mut().zip("Radeon".encode_utf16()) {
            *slot = c;
        }
        assert_eq!(adapter_name(&description), "Radeon");
    }

    #[test]
    fn newer_feature_levels_score_higher() {
        let info = |minor| AdapterInfo {
            name: String::new(),
            vendor_id: 0,
            device_id: 0,
            kind: AdapterKind::Discrete,
            dedicated_video_memory: 0,
            api_version: ApiVersion::new(12, minor),
            usable: true,
        };
        assert!(info(2).score(&VERSION_SCORES) > info(1).score(&VERSION_SCORES));
    }
}
