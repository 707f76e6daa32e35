//! Mapping of flat tensors onto single-channel 2D textures.
//!
//! A tensor of logical length `N` is stored row-major in a texture of
//! `width x height` texels with `width * height == N`. Logical index `i`
//! lives at texel `(i % width, i / width)`.

use log::warn;

use crate::errors::ShapeError;

/// Physical 2D layout of a flat tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureLayout {
    length: usize,
    width: usize,
    height: usize,
}

impl TextureLayout {
    /// Chooses the texture dimensions for a tensor of `length` elements.
    ///
    /// The height is the smallest divisor of `length` that brings the width
    /// within `max_dim`. When no such divisor exists the layout falls back to
    /// a single row of `length` texels, which does not fit the cap; callers
    /// allocating textures must check [`TextureLayout::fits`].
    pub fn for_length(length: usize, max_dim: usize) -> Result<Self, ShapeError> {
        if length == 0 {
            return Err(ShapeError::EmptyTensor {
                tensor: "<layout>".to_string(),
            });
        }

        if length <= max_dim {
            return Ok(Self::single_row(length));
        }

        let mut height = 2;
        while height <= max_dim.min(length) {
            if length % height == 0 && length / height <= max_dim {
                return Ok(Self {
                    length,
                    width: length / height,
                    height,
                });
            }
            height += 1;
        }

        warn!(
            "No texture factorization of {} under max dimension {}; falling back to {}x1",
            length, max_dim, length
        );
        Ok(Self::single_row(length))
    }

    fn single_row(length: usize) -> Self {
        Self {
            length,
            width: length,
            height: 1,
        }
    }

    /// Returns the logical number of elements.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Returns the texture width in texels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the texture height in texels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the number of texels, always equal to the logical length.
    pub fn texel_count(&self) -> usize {
        self.width * self.height
    }

    /// Whether both sides are within `max_dim`.
    pub fn fits(&self, max_dim: usize) -> bool {
        self.width <= max_dim && self.height <= max_dim
    }

    /// Texel coordinates of logical index `index`.
    pub fn texel(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }

    /// Logical index of texel `(x, y)`.
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }
}
