use crate::error::{KernelError, KernelResult};

use super::dtype::DataType;
use super::shape::{broadcast_strides, default_strides, linear_offset, max_offset, Dims, IndexIter};

/// Scalar types that can be read from and written to little-endian tensor
/// storage.
pub trait Element: Copy + Default + PartialOrd + Send + Sync + 'static {
    const DTYPE: DataType;
    const SIZE: usize;

    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, bytes: &mut [u8]);
    fn to_f64(self) -> f64;
    /// Saturating conversion; float to integer truncates toward zero.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: DataType = $dtype;
            const SIZE: usize = std::mem::size_of::<$ty>();

            #[inline]
            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..Self::SIZE]);
                <$ty>::from_le_bytes(raw)
            }

            #[inline]
            fn write_le(self, bytes: &mut [u8]) {
                bytes[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }
        }
    };
}

impl_element!(i8, DataType::Int8);
impl_element!(u8, DataType::UInt8);
impl_element!(i16, DataType::Int16);
impl_element!(u16, DataType::UInt16);
impl_element!(i32, DataType::Int32);
impl_element!(u32, DataType::UInt32);
impl_element!(f32, DataType::Float32);

/// Reads one element of any data type as `f64`.
pub fn read_scalar_f64(dtype: DataType, bytes: &[u8]) -> f64 {
    match dtype.storage() {
        DataType::Int8 => i8::read_le(bytes).to_f64(),
        DataType::UInt8 => u8::read_le(bytes).to_f64(),
        DataType::Int16 => i16::read_le(bytes).to_f64(),
        DataType::UInt16 => u16::read_le(bytes).to_f64(),
        DataType::Int32 => i32::read_le(bytes).to_f64(),
        DataType::UInt32 => u32::read_le(bytes).to_f64(),
        _ => f32::read_le(bytes).to_f64(),
    }
}

/// Writes `value` as one element of `dtype`, saturating integers.
pub fn write_scalar_f64(dtype: DataType, bytes: &mut [u8], value: f64) {
    match dtype.storage() {
        DataType::Int8 => i8::from_f64(value).write_le(bytes),
        DataType::UInt8 => u8::from_f64(value).write_le(bytes),
        DataType::Int16 => i16::from_f64(value).write_le(bytes),
        DataType::UInt16 => u16::from_f64(value).write_le(bytes),
        DataType::Int32 => i32::from_f64(value).write_le(bytes),
        DataType::UInt32 => u32::from_f64(value).write_le(bytes),
        _ => f32::from_f64(value).write_le(bytes),
    }
}

fn check_span(
    dtype: DataType,
    len: usize,
    shape: &[usize],
    strides: &[usize],
) -> KernelResult<()> {
    if shape.len() != strides.len() {
        return Err(KernelError::shape(
            "view",
            format!("rank {} shape with rank {} strides", shape.len(), strides.len()),
        ));
    }
    if let Some(max) = max_offset(shape, strides) {
        let needed = (max + 1) * dtype.size_in_bytes();
        if needed > len {
            return Err(KernelError::shape(
                "view",
                format!("{needed} bytes addressed by {shape:?}/{strides:?} but buffer holds {len}"),
            ));
        }
    }
    Ok(())
}

/// Read-only strided view over tensor bytes. Never owns memory; several views
/// may alias the same bytes.
#[derive(Debug, Clone)]
pub struct TensorView<'a> {
    dtype: DataType,
    bytes: &'a [u8],
    shape: Dims,
    strides: Dims,
}

impl<'a> TensorView<'a> {
    pub fn new(
        dtype: DataType,
        bytes: &'a [u8],
        shape: &[usize],
        strides: &[usize],
    ) -> KernelResult<Self> {
        check_span(dtype, bytes.len(), shape, strides)?;
        Ok(Self {
            dtype,
            bytes,
            shape: shape.iter().copied().collect(),
            strides: strides.iter().copied().collect(),
        })
    }

    pub fn contiguous(dtype: DataType, bytes: &'a [u8], shape: &[usize]) -> KernelResult<Self> {
        Self::new(dtype, bytes, shape, &default_strides(shape))
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn offset_of(&self, index: &[usize]) -> usize {
        linear_offset(index, &self.strides)
    }

    /// Raw bytes of one element.
    pub fn element_bytes(&self, index: &[usize]) -> &'a [u8] {
        let width = self.dtype.size_in_bytes();
        let start = self.offset_of(index) * width;
        &self.bytes[start..start + width]
    }

    pub fn read<T: Element>(&self, index: &[usize]) -> T {
        debug_assert_eq!(T::SIZE, self.dtype.size_in_bytes());
        T::read_le(self.element_bytes(index))
    }

    pub fn read_f64(&self, index: &[usize]) -> f64 {
        read_scalar_f64(self.dtype, self.element_bytes(index))
    }

    /// First element in memory order, used for scalar operands.
    pub fn first<T: Element>(&self) -> KernelResult<T> {
        if self.element_count() == 0 {
            return Err(KernelError::shape("view", "scalar operand is empty"));
        }
        Ok(T::read_le(&self.bytes[..T::SIZE]))
    }

    /// Same bytes seen through a broadcast to `shape`.
    pub fn broadcast_to(&self, shape: &[usize]) -> KernelResult<TensorView<'a>> {
        let strides = broadcast_strides(&self.shape, &self.strides, shape).ok_or_else(|| {
            KernelError::shape(
                "broadcast",
                format!("{:?} does not broadcast to {:?}", self.shape, shape),
            )
        })?;
        Ok(TensorView {
            dtype: self.dtype,
            bytes: self.bytes,
            shape: shape.iter().copied().collect(),
            strides,
        })
    }

    /// Elements in row-major logical order.
    pub fn to_vec<T: Element>(&self) -> Vec<T> {
        IndexIter::new(&self.shape).map(|index| self.read::<T>(&index)).collect()
    }

    /// Bytes in row-major logical order, collapsing any non-default strides.
    pub fn to_contiguous_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.element_count() * self.dtype.size_in_bytes());
        for index in IndexIter::new(&self.shape) {
            out.extend_from_slice(self.element_bytes(&index));
        }
        out
    }
}

/// Writable strided view over tensor bytes.
#[derive(Debug)]
pub struct TensorViewMut<'a> {
    dtype: DataType,
    bytes: &'a mut [u8],
    shape: Dims,
    strides: Dims,
}

impl<'a> TensorViewMut<'a> {
    pub fn new(
        dtype: DataType,
        bytes: &'a mut [u8],
        shape: &[usize],
        strides: &[usize],
    ) -> KernelResult<Self> {
        check_span(dtype, bytes.len(), shape, strides)?;
        Ok(Self {
            dtype,
            bytes,
            shape: shape.iter().copied().collect(),
            strides: strides.iter().copied().collect(),
        })
    }

    pub fn contiguous(dtype: DataType, bytes: &'a mut [u8], shape: &[usize]) -> KernelResult<Self> {
        Self::new(dtype, bytes, shape, &default_strides(shape))
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn offset_of(&self, index: &[usize]) -> usize {
        linear_offset(index, &self.strides)
    }

    pub fn element_bytes_mut(&mut self, index: &[usize]) -> &mut [u8] {
        let width = self.dtype.size_in_bytes();
        let start = self.offset_of(index) * width;
        &mut self.bytes[start..start + width]
    }

    pub fn write<T: Element>(&mut self, index: &[usize], value: T) {
        debug_assert_eq!(T::SIZE, self.dtype.size_in_bytes());
        value.write_le(self.element_bytes_mut(index));
    }

    pub fn write_f64(&mut self, index: &[usize], value: f64) {
        let dtype = self.dtype;
        write_scalar_f64(dtype, self.element_bytes_mut(index), value);
    }

    pub fn copy_element(&mut self, index: &[usize], src: &[u8]) {
        self.element_bytes_mut(index).copy_from_slice(src);
    }

    pub fn as_view(&self) -> TensorView<'_> {
        TensorView {
            dtype: self.dtype,
            bytes: &*self.bytes,
            shape: self.shape.clone(),
            strides: self.strides.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn strided_reads_follow_offsets() {
        let bytes = f32_bytes(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        // column-major read of a 2x3 buffer
        let view = TensorView::new(DataType::Float32, &bytes, &[3, 2], &[1, 3]).expect("view");
        assert_eq!(view.to_vec::<f32>(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn construction_rejects_short_buffers() {
        let bytes = f32_bytes(&[0.0, 1.0, 2.0]);
        let err = TensorView::contiguous(DataType::Float32, &bytes, &[2, 2]).unwrap_err();
        assert!(matches!(err, KernelError::ShapeMismatch { .. }));
        assert!(TensorView::contiguous(DataType::Float32, &bytes, &[0, 7]).is_ok());
    }

    #[test]
    fn broadcast_views_repeat_elements() {
        let bytes = f32_bytes(&[1.0, 2.0]);
        let view = TensorView::contiguous(DataType::Float32, &bytes, &[2, 1]).expect("view");
        let wide = view.broadcast_to(&[2, 3]).expect("broadcast");
        assert_eq!(wide.strides(), &[1, 0]);
        assert_eq!(wide.to_vec::<f32>(), vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn scalar_writes_saturate() {
        let mut bytes = vec![0u8; 2];
        let mut view = TensorViewMut::contiguous(DataType::Int8, &mut bytes, &[2]).expect("view");
        view.write_f64(&[0], 300.0);
        view.write_f64(&[1], -7.9);
        assert_eq!(view.as_view().to_vec::<i8>(), vec![127, -7]);
    }
}
