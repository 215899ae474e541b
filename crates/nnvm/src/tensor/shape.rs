use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

/// Dimension or stride list; most tensors here are rank 4 or lower.
pub type Dims = SmallVec<[usize; 4]>;

/// Explicit padding for one axis. Negative values crop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Padding {
    pub before: i32,
    pub after: i32,
}

impl Padding {
    pub fn new(before: i32, after: i32) -> Self {
        Self { before, after }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn sum(self) -> i64 {
        self.before as i64 + self.after as i64
    }
}

pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Row-major strides in elements.
pub fn default_strides(shape: &[usize]) -> Dims {
    let mut strides: Dims = smallvec![0; shape.len()];
    let mut acc = 1usize;
    for (i, dim) in shape.iter().enumerate().rev() {
        strides[i] = acc;
        acc *= *dim;
    }
    strides
}

/// True when `strides` address `shape` densely in row-major order. Size-1
/// dimensions may carry any stride.
pub fn is_default_layout(shape: &[usize], strides: &[usize]) -> bool {
    if shape.len() != strides.len() {
        return false;
    }
    let expected = default_strides(shape);
    shape
        .iter()
        .zip(strides.iter().zip(expected.iter()))
        .all(|(dim, (actual, wanted))| *dim == 1 || actual == wanted)
}

pub fn linear_offset(index: &[usize], strides: &[usize]) -> usize {
    index
        .iter()
        .zip(strides.iter())
        .map(|(coord, stride)| coord * stride)
        .sum()
}

pub fn unravel_index(mut index: usize, shape: &[usize]) -> Dims {
    let mut coords: Dims = smallvec![0; shape.len()];
    for (i, dim) in shape.iter().enumerate().rev() {
        if *dim == 0 {
            continue;
        }
        coords[i] = index % *dim;
        index /= *dim;
    }
    coords
}

/// Largest element offset reachable through `shape`/`strides`, or `None` for
/// an empty tensor.
pub fn max_offset(shape: &[usize], strides: &[usize]) -> Option<usize> {
    if shape.iter().any(|dim| *dim == 0) {
        return None;
    }
    Some(
        shape
            .iter()
            .zip(strides.iter())
            .map(|(dim, stride)| (dim - 1) * stride)
            .sum(),
    )
}

/// NumPy broadcast of two shapes, right-aligned.
pub fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> Option<Dims> {
    let rank = lhs.len().max(rhs.len());
    let mut out: Dims = smallvec![0; rank];
    for i in 0..rank {
        let l = dim_from_right(lhs, rank, i);
        let r = dim_from_right(rhs, rank, i);
        out[i] = match (l, r) {
            (a, b) if a == b => a,
            (1, b) => b,
            (a, 1) => a,
            _ => return None,
        };
    }
    Some(out)
}

fn dim_from_right(shape: &[usize], rank: usize, i: usize) -> usize {
    let pad = rank - shape.len();
    if i < pad {
        1
    } else {
        shape[i - pad]
    }
}

/// Strides that read `shape`/`strides` as if it had `target` shape. Broadcast
/// dimensions get stride 0.
pub fn broadcast_strides(shape: &[usize], strides: &[usize], target: &[usize]) -> Option<Dims> {
    if shape.len() > target.len() {
        return None;
    }
    let pad = target.len() - shape.len();
    let mut out: Dims = smallvec![0; target.len()];
    for i in 0..target.len() {
        if i < pad {
            continue;
        }
        let dim = shape[i - pad];
        if dim == target[i] {
            out[i] = strides[i - pad];
        } else if dim == 1 {
            out[i] = 0;
        } else {
            return None;
        }
    }
    Some(out)
}

/// Output extent of a strided, dilated window walk.
pub fn windowed_output_size(
    size: usize,
    filter: usize,
    stride: usize,
    dilation: usize,
    padding: Padding,
) -> Option<usize> {
    if filter == 0 || stride == 0 || dilation == 0 {
        return None;
    }
    let effective = (filter as i64 - 1) * dilation as i64 + 1;
    let padded = size as i64 + padding.sum();
    if padded < effective {
        return None;
    }
    Some(((padded - effective) / stride as i64 + 1) as usize)
}

/// Row-major walk over every index of a shape. A rank-0 shape yields one
/// empty index; a shape with a zero extent yields nothing.
pub struct IndexIter {
    shape: Dims,
    current: Dims,
    first: bool,
}

impl IndexIter {
    pub fn new(shape: &[usize]) -> Self {
        Self {
            shape: shape.iter().copied().collect(),
            current: smallvec![0; shape.len()],
            first: !shape.iter().any(|dim| *dim == 0),
        }
    }
}

impl Iterator for IndexIter {
    type Item = Dims;

    fn next(&mut self) -> Option<Self::Item> {
        if self.first {
            self.first = false;
            return Some(self.current.clone());
        }
        for i in (0..self.current.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.shape[i] {
                return Some(self.current.clone());
            }
            self.current[i] = 0;
        }
        None
    }
}
