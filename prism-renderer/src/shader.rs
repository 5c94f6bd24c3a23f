use std::path::{Path, PathBuf};
use prism_core::collections::hashmap::{Entry, HashMap};
use prism_rhi::{Backend, RhiDevice, RhiResult, ShaderBlob, ShaderCompileDesc, ShaderModel, ShaderType};

/// HLSL sources of the built-in passes.
pub const SHADER_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders");

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ShaderKey {
    shader_type: ShaderType,
    file: String,
    entry_point: String,
}

/// Compiles shaders of one directory for the device's target and caches the blobs.
pub struct ShaderLibrary {
    root: PathBuf,
    model: ShaderModel,
    defines: Vec<(String, Option<String>)>,
    blobs: HashMap<ShaderKey, ShaderBlob>,
}

impl ShaderLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            model: ShaderModel::default(),
            defines: Vec::new(),
            blobs: HashMap::new(),
        }
    }

    /// Library over the shaders of the built-in passes.
    pub fn builtin() -> Self {
        Self::new(SHADER_DIR)
    }

    pub fn with_model(mut self, model: ShaderModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.defines.push((name.into(), value.map(str::to_owned)));
        self
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Return the cached blob of `entry_point` in `file`, compiling it on first use.
    #[profiling::function]
    pub fn load<B: Backend>(
        &mut self,
        device: &B::Device,
        shader_type: ShaderType,
        file: &str,
        entry_point: &str,
    ) -> RhiResult<ShaderBlob> {
        let key = ShaderKey {
            shader_type,
            file: file.to_owned(),
            entry_point: entry_point.to_owned(),
        };

        match self.blobs.entry(key) {
            Entry::Occupied(blob) => Ok(blob.get().clone()),
            Entry::Vacant(entry) => {
                let mut desc = ShaderCompileDesc::new(shader_type, self.root.join(file), entry_point)
                    .with_model(self.model)
                    .with_include_dir(&self.root);
                for (name, value) in &self.defines {
                    desc = desc.with_define(name.clone(), value.as_deref());
                }
                let blob = device.compile_shader(&desc)?;
                entry.insert(blob.clone());
                Ok(blob)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::config::HeapCapacities;
    use prism_rhi::headless::HeadlessInstance;
    use prism_rhi::{DeviceDesc, Headless, InstanceDesc, RhiError, RhiInstance, ShaderTarget};

    #[test]
    fn blobs_are_compiled_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("solid.hlsl"), "float4 main() : SV_Target { return 1; }").unwrap();

        let device = HeadlessInstance::new(&InstanceDesc {
            application_name: "shaders".to_owned(),
            enable_validation: false,
            window: None,
        })
        .unwrap()
        .create_device(&DeviceDesc {
            use_hdr: false,
            use_raytracing: false,
            heap_capacities: HeapCapacities::default(),
        })
        .unwrap();

        let mut library = ShaderLibrary::new(dir.path());
        let blob = library
            .load::<Headless>(&device, ShaderType::Pixel, "solid.hlsl", "main")
            .unwrap();
        assert_eq!(blob.target(), ShaderTarget::Source);
        assert_eq!(blob.shader_type(), ShaderType::Pixel);

        std::fs::remove_file(dir.path().join("solid.hlsl")).unwrap();
        let cached = library
            .load::<Headless>(&device, ShaderType::Pixel, "solid.hlsl", "main")
            .unwrap();
        assert_eq!(cached, blob);
        assert_eq!(library.len(), 1);

        let missing = library.load::<Headless>(&device, ShaderType::Vertex, "solid.hlsl", "main");
        assert!(matches!(missing, Err(RhiError::ShaderCompilation { .. })));
    }

    #[test]
    fn builtin_shaders_exist() {
        for file in ["zprepass.hlsl", "gbuffer.hlsl", "light_culling.hlsl", "forward.hlsl", "common.hlsli"] {
            assert!(Path::new(SHADER_DIR).join(file).is_file(), "{file} is missing");
        }
    }
}
