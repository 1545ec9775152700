use crate::config::{ConverterConfig, PixelType};
use ndarray::{Array2, Axis};

/// Decoded single-channel image, row-major `[rows, cols]`
#[derive(Debug, Clone, PartialEq)]
pub enum PixelGrid {
    U8(Array2<u8>),
    U16(Array2<u16>),
    U32(Array2<u32>),
    I16(Array2<i16>),
    I32(Array2<i32>),
    F32(Array2<f32>),
    F64(Array2<f64>),
}

/// Applies the same expression to whichever array the grid holds,
/// rewrapping the result in the same variant.
macro_rules! map_grid {
    ($grid:expr, $arr:ident => $body:expr) => {
        match $grid {
            PixelGrid::U8($arr) => PixelGrid::U8($body),
            PixelGrid::U16($arr) => PixelGrid::U16($body),
            PixelGrid::U32($arr) => PixelGrid::U32($body),
            PixelGrid::I16($arr) => PixelGrid::I16($body),
            PixelGrid::I32($arr) => PixelGrid::I32($body),
            PixelGrid::F32($arr) => PixelGrid::F32($body),
            PixelGrid::F64($arr) => PixelGrid::F64($body),
        }
    };
}

macro_rules! cast_array {
    ($arr:expr, $target:expr) => {
        match $target {
            PixelType::U8 => PixelGrid::U8($arr.mapv(|v| v as u8)),
            PixelType::U16 => PixelGrid::U16($arr.mapv(|v| v as u16)),
            PixelType::U32 => PixelGrid::U32($arr.mapv(|v| v as u32)),
            PixelType::I16 => PixelGrid::I16($arr.mapv(|v| v as i16)),
            PixelType::I32 => PixelGrid::I32($arr.mapv(|v| v as i32)),
            PixelType::F32 => PixelGrid::F32($arr.mapv(|v| v as f32)),
            PixelType::F64 => PixelGrid::F64($arr.mapv(|v| v as f64)),
        }
    };
}

/// Rotation, flip and output type applied to every converted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOptions {
    pub rotation_degrees: i64,
    pub flip_axis: Option<usize>,
    pub target: PixelType,
}

impl TransformOptions {
    pub fn from_config(config: &ConverterConfig) -> Self {
        Self {
            rotation_degrees: config.rotation_degrees,
            flip_axis: config.flip_axis,
            target: config.target_pixel_type,
        }
    }

    /// Counter-clockwise quarter turns; 0 for non-multiples of 90
    pub fn quarter_turns(&self) -> usize {
        if self.rotation_degrees % 90 != 0 {
            return 0;
        }
        (self.rotation_degrees / 90).rem_euclid(4) as usize
    }
}

impl PixelGrid {
    /// Zero-filled grid used as a placeholder for files that never settled
    pub fn zeros(shape: [usize; 2], pixel_type: PixelType) -> Self {
        let shape = (shape[0], shape[1]);
        match pixel_type {
            PixelType::U8 => PixelGrid::U8(Array2::zeros(shape)),
            PixelType::U16 => PixelGrid::U16(Array2::zeros(shape)),
            PixelType::U32 => PixelGrid::U32(Array2::zeros(shape)),
            PixelType::I16 => PixelGrid::I16(Array2::zeros(shape)),
            PixelType::I32 => PixelGrid::I32(Array2::zeros(shape)),
            PixelType::F32 => PixelGrid::F32(Array2::zeros(shape)),
            PixelType::F64 => PixelGrid::F64(Array2::zeros(shape)),
        }
    }

    pub fn pixel_type(&self) -> PixelType {
        match self {
            PixelGrid::U8(_) => PixelType::U8,
            PixelGrid::U16(_) => PixelType::U16,
            PixelGrid::U32(_) => PixelType::U32,
            PixelGrid::I16(_) => PixelType::I16,
            PixelGrid::I32(_) => PixelType::I32,
            PixelGrid::F32(_) => PixelType::F32,
            PixelGrid::F64(_) => PixelType::F64,
        }
    }

    /// `(rows, cols)`
    pub fn dim(&self) -> (usize, usize) {
        match self {
            PixelGrid::U8(a) => a.dim(),
            PixelGrid::U16(a) => a.dim(),
            PixelGrid::U32(a) => a.dim(),
            PixelGrid::I16(a) => a.dim(),
            PixelGrid::I32(a) => a.dim(),
            PixelGrid::F32(a) => a.dim(),
            PixelGrid::F64(a) => a.dim(),
        }
    }

    pub fn is_empty(&self) -> bool {
        let (rows, cols) = self.dim();
        rows == 0 || cols == 0
    }

    /// Rotate counter-clockwise by `turns` quarter turns.
    ///
    /// Only strides change; the data is not copied.
    pub fn rotate_quarter_turns(self, turns: usize) -> Self {
        map_grid!(self, a => rot90(a, turns))
    }

    /// Reverse the order along `axis` (0 = rows, 1 = columns)
    pub fn flip(self, axis: usize) -> Self {
        map_grid!(self, a => {
            let mut a = a;
            a.invert_axis(Axis(axis));
            a
        })
    }

    /// Convert every pixel to `target`.
    ///
    /// When the target is unsigned and the source can hold negative values,
    /// negatives are set to 0 before the conversion.
    pub fn cast(self, target: PixelType) -> Self {
        let clamp = target.is_unsigned() && self.pixel_type().is_signed_or_float();
        match self {
            PixelGrid::U8(a) => cast_array!(a, target),
            PixelGrid::U16(a) => cast_array!(a, target),
            PixelGrid::U32(a) => cast_array!(a, target),
            PixelGrid::I16(a) => cast_array!(clamped(a, clamp), target),
            PixelGrid::I32(a) => cast_array!(clamped(a, clamp), target),
            PixelGrid::F32(a) => cast_array!(clamped(a, clamp), target),
            PixelGrid::F64(a) => cast_array!(clamped(a, clamp), target),
        }
    }

    /// Rotation, then flip, then cast
    pub fn transform(self, options: &TransformOptions) -> Self {
        if self.is_empty() {
            return self.cast(options.target);
        }
        let mut grid = self;
        let turns = options.quarter_turns();
        if turns != 0 {
            grid = grid.rotate_quarter_turns(turns);
        }
        if let Some(axis) = options.flip_axis {
            grid = grid.flip(axis);
        }
        grid.cast(options.target)
    }
}

/// Pixels in row-major logical order, whatever the memory layout
pub fn row_major<T: Copy>(array: &Array2<T>) -> Vec<T> {
    array.iter().copied().collect()
}

fn rot90<T>(mut a: Array2<T>, turns: usize) -> Array2<T> {
    for _ in 0..turns % 4 {
        a.invert_axis(Axis(1));
        a = a.reversed_axes();
    }
    a
}

fn clamped<T: Copy + PartialOrd + Default>(mut a: Array2<T>, clamp: bool) -> Array2<T> {
    if clamp {
        let zero = T::default();
        a.mapv_inplace(|v| if v < zero { zero } else { v });
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> PixelGrid {
        PixelGrid::I32(array![[1, 2, 3], [4, 5, 6]])
    }

    #[test]
    fn rotates_counter_clockwise() {
        let rotated = sample().rotate_quarter_turns(1);
        assert_eq!(rotated, PixelGrid::I32(array![[3, 6], [2, 5], [1, 4]]));
    }

    #[test]
    fn four_quarter_turns_are_identity() {
        let mut grid = sample();
        for _ in 0..4 {
            grid = grid.rotate_quarter_turns(1);
        }
        assert_eq!(grid, sample());
    }

    #[test]
    fn double_flip_is_identity() {
        for axis in 0..2 {
            assert_eq!(sample().flip(axis).flip(axis), sample());
        }
        assert_eq!(sample().flip(0), PixelGrid::I32(array![[4, 5, 6], [1, 2, 3]]));
        assert_eq!(sample().flip(1), PixelGrid::I32(array![[3, 2, 1], [6, 5, 4]]));
    }

    #[test]
    fn clamps_negatives_for_unsigned_targets() {
        let grid = PixelGrid::I32(array![[-5, 0], [7, -1]]);
        assert_eq!(grid.cast(PixelType::U16), PixelGrid::U16(array![[0, 0], [7, 0]]));

        let grid = PixelGrid::F32(array![[-0.5, 2.9]]);
        assert_eq!(grid.cast(PixelType::U8), PixelGrid::U8(array![[0, 2]]));
    }

    #[test]
    fn keeps_negatives_for_signed_targets() {
        let grid = PixelGrid::F64(array![[-3.0, 4.0]]);
        assert_eq!(grid.cast(PixelType::I16), PixelGrid::I16(array![[-3, 4]]));
    }

    #[test]
    fn quarter_turns_normalise_degrees() {
        let turns = |rotation_degrees| {
            TransformOptions { rotation_degrees, flip_axis: None, target: PixelType::I32 }.quarter_turns()
        };
        assert_eq!(turns(0), 0);
        assert_eq!(turns(45), 0);
        assert_eq!(turns(360), 0);
        assert_eq!(turns(90), 1);
        assert_eq!(turns(-90), 3);
        assert_eq!(turns(450), 1);
    }

    #[test]
    fn transform_ignores_non_multiples_of_ninety() {
        let options = TransformOptions {
            rotation_degrees: 45,
            flip_axis: None,
            target: PixelType::I32,
        };
        assert_eq!(sample().transform(&options), sample());
    }

    #[test]
    fn transform_rotates_then_flips() {
        let options = TransformOptions {
            rotation_degrees: 90,
            flip_axis: Some(0),
            target: PixelType::U8,
        };
        let out = sample().transform(&options);
        assert_eq!(out, PixelGrid::U8(array![[1, 4], [2, 5], [3, 6]]));
        if let PixelGrid::U8(a) = &out {
            assert_eq!(row_major(a), vec![1, 4, 2, 5, 3, 6]);
        }
    }

    #[test]
    fn zeros_have_requested_shape_and_type() {
        let grid = PixelGrid::zeros([4, 3], PixelType::F32);
        assert_eq!(grid.dim(), (4, 3));
        assert_eq!(grid.pixel_type(), PixelType::F32);
    }
}
