//! HLSL compilation through DXC.
//!
//! Every backend consumes the same HLSL sources. DirectX12 receives validated DXIL, Vulkan
//! receives SPIR-V compiled with fixed register shifts so that `b`, `t`, `u` and `s` registers
//! of one register space never collide on a binding number.

use std::fmt;
use std::path::{Path, PathBuf};
use crate::error::{RhiError, RhiResult};

/// Binding offsets applied to each HLSL register class when targeting SPIR-V.
pub const SPIRV_CBV_SHIFT: u32 = 0;
pub const SPIRV_SRV_SHIFT: u32 = 64;
pub const SPIRV_UAV_SHIFT: u32 = 128;
pub const SPIRV_SAMPLER_SHIFT: u32 = 192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Vertex,
    Pixel,
    Geometry,
    Hull,
    Domain,
    Compute,
}

impl ShaderType {
    /// Graphics stages a graphics pipeline may hold.
    pub const GRAPHICS: [ShaderType; 5] = [
        ShaderType::Vertex,
        ShaderType::Pixel,
        ShaderType::Geometry,
        ShaderType::Hull,
        ShaderType::Domain,
    ];

    pub fn profile_prefix(self) -> &'static str {
        match self {
            ShaderType::Vertex => "vs",
            ShaderType::Pixel => "ps",
            ShaderType::Geometry => "gs",
            ShaderType::Hull => "hs",
            ShaderType::Domain => "ds",
            ShaderType::Compute => "cs",
        }
    }

    /// Slot of a graphics stage inside a pipeline state, `None` for compute.
    pub(crate) fn graphics_slot(self) -> Option<usize> {
        Self::GRAPHICS.iter().position(|&ty| ty == self)
    }
}

/// HLSL shader model version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShaderModel {
    pub major: u8,
    pub minor: u8,
}

impl ShaderModel {
    pub const SM_6_0: ShaderModel = ShaderModel::new(6, 0);
    pub const SM_6_4: ShaderModel = ShaderModel::new(6, 4);
    pub const SM_6_5: ShaderModel = ShaderModel::new(6, 5);
    pub const SM_6_6: ShaderModel = ShaderModel::new(6, 6);
    /// Newest model the engine compiles for.
    pub const NEWEST: ShaderModel = ShaderModel::SM_6_6;

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Target profile string understood by DXC, e.g. `vs_6_4`.
    pub fn profile(self, shader_type: ShaderType) -> String {
        format!("{}_{}_{}", shader_type.profile_prefix(), self.major, self.minor)
    }

    pub fn check_supported(self) -> RhiResult<()> {
        if self > Self::NEWEST {
            return Err(RhiError::ShaderModelUnsupported {
                requested: self,
                newest: Self::NEWEST,
            });
        }
        Ok(())
    }
}

impl Default for ShaderModel {
    fn default() -> Self {
        Self::SM_6_4
    }
}

impl fmt::Display for ShaderModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Bytecode flavour a backend consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderTarget {
    Dxil,
    Spirv,
    /// Source text kept as is, executed by nothing. Used by the headless backend.
    Source,
}

/// Compiled shader stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBlob {
    shader_type: ShaderType,
    entry_point: String,
    model: ShaderModel,
    target: ShaderTarget,
    code: Vec<u8>,
}

impl ShaderBlob {
    pub fn new(
        shader_type: ShaderType,
        entry_point: impl Into<String>,
        model: ShaderModel,
        target: ShaderTarget,
        code: Vec<u8>,
    ) -> Self {
        Self {
            shader_type,
            entry_point: entry_point.into(),
            model,
            target,
            code,
        }
    }

    #[inline]
    pub fn shader_type(&self) -> ShaderType { self.shader_type }

    #[inline]
    pub fn entry_point(&self) -> &str { &self.entry_point }

    #[inline]
    pub fn model(&self) -> ShaderModel { self.model }

    #[inline]
    pub fn target(&self) -> ShaderTarget { self.target }

    #[inline]
    pub fn code(&self) -> &[u8] { &self.code }
}

/// Everything needed to compile one entry point of an HLSL file.
#[derive(Debug, Clone)]
pub struct ShaderCompileDesc {
    pub shader_type: ShaderType,
    pub path: PathBuf,
    pub entry_point: String,
    pub model: ShaderModel,
    pub include_dirs: Vec<PathBuf>,
    pub defines: Vec<(String, Option<String>)>,
}

impl ShaderCompileDesc {
    pub fn new(shader_type: ShaderType, path: impl Into<PathBuf>, entry_point: impl Into<String>) -> Self {
        Self {
            shader_type,
            path: path.into(),
            entry_point: entry_point.into(),
            model: ShaderModel::default(),
            include_dirs: Vec::new(),
            defines: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: ShaderModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.defines.push((name.into(), value.map(str::to_owned)));
        self
    }
}

pub struct ShaderCompiler {
    target: ShaderTarget,
}

impl ShaderCompiler {
    pub fn new(target: ShaderTarget) -> Self {
        Self { target }
    }

    #[inline]
    pub fn target(&self) -> ShaderTarget {
        self.target
    }

    #[profiling::function]
    pub fn compile(&self, desc: &ShaderCompileDesc) -> RhiResult<ShaderBlob> {
        desc.model.check_supported()?;

        let source = std::fs::read_to_string(&desc.path).map_err(|e| {
            log::error!("Failed to read shader {}: {}", desc.path.display(), e);
            RhiError::ShaderCompilation {
                path: desc.path.display().to_string(),
                message: e.to_string(),
            }
        })?;

        let code = match self.target {
            ShaderTarget::Source => source.into_bytes(),
            ShaderTarget::Dxil | ShaderTarget::Spirv => self.compile_with_dxc(desc, &source)?,
        };

        log::debug!(
            "Compiled {} ({}, {:?}) for {:?}",
            desc.path.display(),
            desc.entry_point,
            desc.shader_type,
            self.target
        );

        Ok(ShaderBlob::new(desc.shader_type, desc.entry_point.clone(), desc.model, self.target, code))
    }

    fn compile_with_dxc(&self, desc: &ShaderCompileDesc, source: &str) -> RhiResult<Vec<u8>> {
        let profile = desc.model.profile(desc.shader_type);
        let args = compile_args(self.target, &desc.path, &desc.include_dirs);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let defines: Vec<(&str, Option<&str>)> = desc
            .defines
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
            .collect();

        let source_name = desc.path.to_string_lossy();
        let compile_error = |message: String| {
            log::error!("Shader compilation of {} failed:\n{}", source_name, message);
            RhiError::ShaderCompilation {
                path: source_name.to_string(),
                message,
            }
        };

        let code = hassle_rs::compile_hlsl(&source_name, source, &desc.entry_point, &profile, &args, &defines)
            .map_err(|e| compile_error(e.to_string()))?;

        match self.target {
            ShaderTarget::Dxil => hassle_rs::validate_dxil(&code).map_err(|e| compile_error(e.to_string())),
            _ => Ok(code),
        }
    }

    /// Load precompiled bytecode. The target is inferred from the file extension
    /// (`.spv` for SPIR-V, anything else is treated as DXIL).
    pub fn load_binary(shader_type: ShaderType, path: &Path, entry_point: &str) -> RhiResult<ShaderBlob> {
        let code = std::fs::read(path)?;
        let target = match path.extension().and_then(|ext| ext.to_str()) {
            Some("spv") => ShaderTarget::Spirv,
            _ => ShaderTarget::Dxil,
        };
        if target == ShaderTarget::Spirv && code.len() % 4 != 0 {
            return Err(RhiError::ShaderCompilation {
                path: path.display().to_string(),
                message: "SPIR-V length is not a multiple of 4".to_owned(),
            });
        }
        Ok(ShaderBlob::new(shader_type, entry_point, ShaderModel::default(), target, code))
    }
}

fn compile_args(target: ShaderTarget, path: &Path, include_dirs: &[PathBuf]) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(parent) = path.parent() {
        args.push(format!("-I{}", parent.display()));
    }
    for dir in include_dirs {
        args.push(format!("-I{}", dir.display()));
    }

    if cfg!(debug_assertions) {
        args.push("-Zi".to_owned());
        args.push("-Qembed_debug".to_owned());
        args.push("-Od".to_owned());
    } else {
        args.push("-O3".to_owned());
    }

    if target == ShaderTarget::Spirv {
        args.push("-spirv".to_owned());
        args.push("-fspv-target-env=vulkan1.3".to_owned());
        args.push("-fvk-use-dx-layout".to_owned());
        for (flag, shift) in [
            ("-fvk-b-shift", SPIRV_CBV_SHIFT),
            ("-fvk-t-shift", SPIRV_SRV_SHIFT),
            ("-fvk-u-shift", SPIRV_UAV_SHIFT),
            ("-fvk-s-shift", SPIRV_SAMPLER_SHIFT),
        ] {
            args.push(flag.to_owned());
            args.push(shift.to_string());
            args.push("all".to_owned());
        }
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles() {
        assert_eq!(ShaderModel::SM_6_4.profile(ShaderType::Vertex), "vs_6_4");
        assert_eq!(ShaderModel::SM_6_6.profile(ShaderType::Compute), "cs_6_6");
        assert_eq!(ShaderModel::new(6, 0).profile(ShaderType::Hull), "hs_6_0");
        assert_eq!(ShaderModel::SM_6_5.to_string(), "6.5");
    }

    #[test]
    fn newer_than_newest_is_rejected() {
        assert!(ShaderModel::SM_6_6.check_supported().is_ok());
        match ShaderModel::new(6, 7).check_supported() {
            Err(RhiError::ShaderModelUnsupported { requested, newest }) => {
                assert_eq!(requested, ShaderModel::new(6, 7));
                assert_eq!(newest, ShaderModel::NEWEST);
            }
            other => panic!("expected unsupported shader model, got {other:?}"),
        }
    }

    #[test]
    fn spirv_args_carry_register_shifts() {
        let args = compile_args(ShaderTarget::Spirv, Path::new("shaders/a.hlsl"), &[]);
        let joined = args.join(" ");
        assert!(joined.contains("-spirv"));
        assert!(joined.contains("-fvk-t-shift 64 all"));
        assert!(joined.contains("-fvk-u-shift 128 all"));
        assert!(joined.contains("-fvk-s-shift 192 all"));

        let dxil = compile_args(ShaderTarget::Dxil, Path::new("shaders/a.hlsl"), &[]);
        assert!(!dxil.iter().any(|a| a == "-spirv"));
    }

    #[test]
    fn source_target_keeps_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.hlsl");
        std::fs::write(&path, "float4 main() : SV_Target { return 0; }").unwrap();

        let blob = ShaderCompiler::new(ShaderTarget::Source)
            .compile(&ShaderCompileDesc::new(ShaderType::Pixel, &path, "main"))
            .unwrap();
        assert_eq!(blob.shader_type(), ShaderType::Pixel);
        assert_eq!(blob.target(), ShaderTarget::Source);
        assert!(std::str::from_utf8(blob.code()).unwrap().contains("SV_Target"));

        let missing = ShaderCompiler::new(ShaderTarget::Source)
            .compile(&ShaderCompileDesc::new(ShaderType::Pixel, dir.path().join("missing.hlsl"), "main"));
        assert!(matches!(missing, Err(RhiError::ShaderCompilation { .. })));
    }
}
