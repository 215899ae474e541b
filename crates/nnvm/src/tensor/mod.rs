mod dtype;
mod shape;
mod view;

pub use dtype::DataType;
pub use shape::{
    broadcast_shape, broadcast_strides, default_strides, element_count, is_default_layout,
    linear_offset, max_offset, unravel_index, windowed_output_size, Dims, IndexIter, Padding,
};
pub use view::{read_scalar_f64, write_scalar_f64, Element, TensorView, TensorViewMut};
