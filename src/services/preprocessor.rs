use crate::error::PreprocessError;
use crate::services::frame_decoder::RawFrame;
use image::imageops::FilterType;
use ndarray::{Array4, ArrayView3, Axis};
use rayon::prelude::*;

/// Side length of the square model input.
pub const INPUT_SIZE: u32 = 224;
pub const MAX_FRAMES: usize = 20;

// ImageNet normalization constants
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Normalized frames stacked as `(T, 3, 224, 224)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBatch {
    tensor: Array4<f32>,
}

impl FrameBatch {
    pub fn len(&self) -> usize {
        self.tensor.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> &[usize] {
        self.tensor.shape()
    }

    /// CHW slice for the frame at temporal position `index`.
    pub fn frame(&self, index: usize) -> ArrayView3<'_, f32> {
        self.tensor.index_axis(Axis(0), index)
    }

    pub fn tensor(&self) -> &Array4<f32> {
        &self.tensor
    }
}

/// Resizes, normalizes and stacks frames in input order.
pub fn preprocess(frames: &[RawFrame]) -> Result<FrameBatch, PreprocessError> {
    if frames.is_empty() {
        return Err(PreprocessError::EmptyBatch);
    }

    let per_frame: Vec<Vec<f32>> = frames
        .par_iter()
        .enumerate()
        .map(|(index, frame)| preprocess_frame(index, frame))
        .collect::<Result<_, _>>()?;

    let side = INPUT_SIZE as usize;
    let mut data = Vec::with_capacity(frames.len() * 3 * side * side);
    for chw in per_frame {
        data.extend_from_slice(&chw);
    }

    let tensor = Array4::from_shape_vec((frames.len(), 3, side, side), data)?;
    tracing::debug!(shape = ?tensor.shape(), "Preprocessed frame batch");
    Ok(FrameBatch { tensor })
}

/// One frame to a flat CHW buffer of `3 * 224 * 224` normalized values.
fn preprocess_frame(index: usize, frame: &RawFrame) -> Result<Vec<f32>, PreprocessError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(PreprocessError::EmptyFrame { index });
    }

    let resized;
    let rgb = if frame.width() == INPUT_SIZE && frame.height() == INPUT_SIZE {
        frame.image()
    } else {
        resized = image::imageops::resize(frame.image(), INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
        &resized
    };

    // Pass 1: normalize pixels sequentially (reads and writes are contiguous).
    let raw = rgb.as_raw();
    let hw = (INPUT_SIZE * INPUT_SIZE) as usize;
    let mut interleaved = vec![0f32; 3 * hw];
    for (i, pixel) in raw.chunks_exact(3).enumerate() {
        let off = i * 3;
        interleaved[off] = (pixel[0] as f32 / 255.0 - MEAN[0]) / STD[0];
        interleaved[off + 1] = (pixel[1] as f32 / 255.0 - MEAN[1]) / STD[1];
        interleaved[off + 2] = (pixel[2] as f32 / 255.0 - MEAN[2]) / STD[2];
    }

    // Pass 2: transpose HWC -> CHW in tiles so the source and all three
    // channel write-heads stay in L1.
    let mut data = vec![0f32; 3 * hw];
    const TILE: usize = 1024;
    for base in (0..hw).step_by(TILE) {
        let end = (base + TILE).min(hw);
        for i in base..end {
            let src = i * 3;
            data[i] = interleaved[src];
            data[hw + i] = interleaved[src + 1];
            data[2 * hw + i] = interleaved[src + 2];
        }
    }

    Ok(data)
}
