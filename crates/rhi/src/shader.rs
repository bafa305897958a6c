//! SPIR-V modules for the two programmable stages the renderer uses.
//!
//! A module that cannot be read, fails the header check, or is refused by
//! the driver stops setup: there is no pipeline without it.

use std::ffi::CStr;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use toybox_core::{FatalError, ensure_fatal, fatal_error};
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

const ENTRY_POINT: &CStr = c"main";

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        })
    }
}

/// A compiled module tagged with the stage it is bound to.
///
/// Drop it once the pipeline built from it exists.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    pub fn from_spirv_file(device: Arc<Device>, path: &Path, stage: ShaderStage) -> RhiResult<Self> {
        let bytes = std::fs::read(path).map_err(|err| {
            fatal_error!(
                "shader file readable",
                "{} shader {}: {}",
                stage,
                path.display(),
                err
            )
        })?;
        debug!("Read {} bytes of {} shader from {}", bytes.len(), stage, path.display());
        Self::from_spirv_bytes(device, &bytes, stage)
    }

    pub fn from_spirv_bytes(device: Arc<Device>, bytes: &[u8], stage: ShaderStage) -> RhiResult<Self> {
        let words = parse_spirv(bytes)?;
        let info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { device.handle().create_shader_module(&info, None) }.map_err(|err| {
            fatal_error!(
                "shader module created",
                "driver refused the {} module: {}",
                stage,
                err
            )
        })?;

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Borrows the module; keep `self` alive until the pipeline is created.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_shader_module(self.module, None) };
    }
}

/// Reassembles little-endian words and checks the magic number.
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>, FatalError> {
    ensure_fatal!(
        !bytes.is_empty() && bytes.len().is_multiple_of(4),
        "SPIR-V must be a non-empty multiple of 4 bytes, got {}",
        bytes.len()
    );

    let mut words = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        let mut word = [0u8; 4];
        word.copy_from_slice(chunk);
        words.push(u32::from_le_bytes(word));
    }

    ensure_fatal!(
        words[0] == SPIRV_MAGIC,
        "bad SPIR-V magic {:#010x}",
        words[0]
    );
    Ok(words)
}
