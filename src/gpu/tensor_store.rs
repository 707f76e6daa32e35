//! Tensor storage in single-channel 2D textures.
//!
//! A tensor of `N` elements lives in a `width x height` texture with
//! `width * height == N`; element `i` is texel `(i % width, i / width)`.

use std::sync::mpsc;

use log::debug;

use crate::errors::ShapeError;
use crate::gpu::context::GpuContext;
use crate::gpu::errors::{GpuRuntimeError, GpuRuntimeResult};
use crate::precision::Precision;
use crate::texture_layout::TextureLayout;

/// Texture format backing a tensor of the given precision.
pub fn texture_format(precision: Precision) -> wgpu::TextureFormat {
    match precision {
        Precision::Full => wgpu::TextureFormat::R32Float,
        Precision::Half => wgpu::TextureFormat::R16Float,
    }
}

/// Usages every tensor texture is created with.
pub(crate) const TENSOR_USAGES: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_DST)
    .union(wgpu::TextureUsages::COPY_SRC);

/// A tensor allocated on the device.
#[derive(Debug)]
pub struct GpuTensor {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    layout: TextureLayout,
    precision: Precision,
    label: String,
}

impl GpuTensor {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn layout(&self) -> TextureLayout {
        self.layout
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.layout.length()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.length() == 0
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.layout.width() as u32,
            height: self.layout.height() as u32,
            depth_or_array_layers: 1,
        }
    }
}

/// Allocates a tensor texture, optionally uploading initial contents.
pub fn create_tensor(
    ctx: &GpuContext,
    label: &str,
    length: usize,
    precision: Precision,
    initial: Option<&[f32]>,
) -> GpuRuntimeResult<GpuTensor> {
    if !ctx.supports_precision(precision) {
        return Err(GpuRuntimeError::UnsupportedPrecision {
            tensor: label.to_string(),
            precision,
        });
    }
    let max_dimension = ctx.max_texture_dimension();
    let layout = TextureLayout::for_length(length, max_dimension as usize).map_err(|_| {
        ShapeError::EmptyTensor {
            tensor: label.to_string(),
        }
    })?;
    if !layout.fits(max_dimension as usize) {
        return Err(GpuRuntimeError::TextureTooLarge {
            tensor: label.to_string(),
            length,
            width: layout.width(),
            height: layout.height(),
            max_dimension,
        });
    }
    if let Some(data) = initial {
        check_length(label, length, data)?;
    }

    let (tensor, error) = ctx.validation_scope(|| {
        let texture = ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: layout.width() as u32,
                height: layout.height() as u32,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(precision),
            usage: TENSOR_USAGES,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let tensor = GpuTensor {
            texture,
            view,
            layout,
            precision,
            label: label.to_string(),
        };
        if let Some(data) = initial {
            upload(ctx, &tensor, data);
        }
        tensor
    });
    if let Some(error) = error {
        return Err(GpuRuntimeError::AllocationFailed {
            tensor: label.to_string(),
            message: error.to_string(),
        });
    }
    debug!(
        "Allocated tensor '{}': {} elements as {}x{} {:?}",
        label,
        length,
        layout.width(),
        layout.height(),
        precision
    );
    Ok(tensor)
}

/// Overwrites the whole tensor with `data`.
pub fn write_tensor(ctx: &GpuContext, tensor: &GpuTensor, data: &[f32]) -> GpuRuntimeResult<()> {
    check_length(&tensor.label, tensor.len(), data)?;
    let ((), error) = ctx.validation_scope(|| upload(ctx, tensor, data));
    match error {
        Some(error) => Err(GpuRuntimeError::AllocationFailed {
            tensor: tensor.label.clone(),
            message: error.to_string(),
        }),
        None => Ok(()),
    }
}

/// Copies the tensor back to the host. Blocks until the copy completes.
pub fn read_tensor(ctx: &GpuContext, tensor: &GpuTensor) -> GpuRuntimeResult<Vec<f32>> {
    let texel_size = tensor.precision.texel_size();
    let row_bytes = tensor.layout.width() * texel_size;
    let padded_row_bytes = padded_bytes_per_row(row_bytes);
    let height = tensor.layout.height();

    let staging = ctx.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("tensor readback"),
        size: (padded_row_bytes * height) as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tensor readback"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &tensor.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_row_bytes as u32),
                rows_per_image: Some(height as u32),
            },
        },
        tensor.extent(),
    );
    ctx.queue().submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    ctx.wait_idle();

    let readback_error = |message: String| GpuRuntimeError::ReadbackFailed {
        tensor: tensor.label.clone(),
        message,
    };
    receiver
        .recv()
        .map_err(|e| readback_error(e.to_string()))?
        .map_err(|e| readback_error(e.to_string()))?;

    let mut bytes = Vec::with_capacity(row_bytes * height);
    {
        let mapped = slice.get_mapped_range();
        for row in mapped.chunks(padded_row_bytes) {
            bytes.extend_from_slice(&row[..row_bytes]);
        }
    }
    staging.unmap();

    Ok(tensor.precision.decode(&bytes))
}

fn upload(ctx: &GpuContext, tensor: &GpuTensor, data: &[f32]) {
    let bytes = tensor.precision.encode(data);
    ctx.queue().write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &tensor.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &bytes,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some((tensor.layout.width() * tensor.precision.texel_size()) as u32),
            rows_per_image: Some(tensor.layout.height() as u32),
        },
        tensor.extent(),
    );
}

fn check_length(label: &str, expected: usize, data: &[f32]) -> Result<(), ShapeError> {
    if data.len() != expected {
        return Err(ShapeError::LengthMismatch {
            tensor: label.to_string(),
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Rounds a row size up to the buffer copy alignment.
pub(crate) fn padded_bytes_per_row(row_bytes: usize) -> usize {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
    row_bytes.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_padding() {
        assert_eq!(padded_bytes_per_row(4), 256);
        assert_eq!(padded_bytes_per_row(256), 256);
        assert_eq!(padded_bytes_per_row(8192 * 4), 8192 * 4);
        assert_eq!(padded_bytes_per_row(300 * 2), 768);
    }

    #[test]
    fn test_formats() {
        assert_eq!(texture_format(Precision::Full), wgpu::TextureFormat::R32Float);
        assert_eq!(texture_format(Precision::Half), wgpu::TextureFormat::R16Float);
    }
}
