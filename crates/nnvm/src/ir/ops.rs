use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tensor::Padding;

use super::fused::FusedSubgraph;

/// Clamp range applied to an operator result before it is written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn full() -> Self {
        Self::new(f32::NEG_INFINITY, f32::INFINITY)
    }

    pub fn relu() -> Self {
        Self::new(0.0, f32::INFINITY)
    }

    pub fn relu6() -> Self {
        Self::new(0.0, 6.0)
    }

    pub fn is_full(&self) -> bool {
        self.min == f32::NEG_INFINITY && self.max == f32::INFINITY
    }

    /// NaN passes through unchanged.
    #[inline]
    pub fn apply(&self, value: f32) -> f32 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    #[inline]
    pub fn apply_i32(&self, value: i32) -> i32 {
        let min = self.min as i32;
        let max = self.max as i32;
        value.clamp(min, max.max(min))
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        Self::full()
    }
}

macro_rules! coded_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Stable numeric code shared by the stack VM and NNIL encodings.
            pub fn code(self) -> u8 {
                match self {
                    $($name::$variant => $code),+
                }
            }

            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

coded_enum!(
    BinaryOp {
        Add = 0 => "add",
        Sub = 1 => "sub",
        Mul = 2 => "mul",
        Div = 3 => "div",
        Min = 4 => "min",
        Max = 5 => "max",
        Pow = 6 => "pow",
        FloorDiv = 7 => "floor_div",
        FloorMod = 8 => "floor_mod",
    }
);

coded_enum!(
    UnaryOp {
        Abs = 0 => "abs",
        Ceil = 1 => "ceil",
        Cos = 2 => "cos",
        Exp = 3 => "exp",
        Floor = 4 => "floor",
        Log = 5 => "log",
        Neg = 6 => "neg",
        Round = 7 => "round",
        Rsqrt = 8 => "rsqrt",
        Sin = 9 => "sin",
        Sqrt = 10 => "sqrt",
        Square = 11 => "square",
        Tanh = 12 => "tanh",
    }
);

coded_enum!(
    ReduceOp {
        Mean = 0 => "mean",
        Min = 1 => "min",
        Max = 2 => "max",
        Sum = 3 => "sum",
        Prod = 4 => "prod",
    }
);

coded_enum!(
    PadMode {
        Constant = 0 => "constant",
        Reflect = 1 => "reflect",
        Symmetric = 2 => "symmetric",
        Edge = 3 => "edge",
    }
);

coded_enum!(
    ResizeMode {
        Bilinear = 0 => "bilinear",
        NearestNeighbor = 1 => "nearest_neighbor",
    }
);

/// Affine quantization: `real = (q - zero_point) * scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParam {
    pub scale: f32,
    pub zero_point: i32,
}

impl QuantParam {
    pub fn new(scale: f32, zero_point: i32) -> Self {
        Self { scale, zero_point }
    }
}

/// Shared by conv2d and conv2d_transpose. NCHW activations, OIHW weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Conv2dAttrs {
    pub groups: usize,
    pub padding_h: Padding,
    pub padding_w: Padding,
    pub stride_h: usize,
    pub stride_w: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
    pub activation: ValueRange,
}

impl Default for Conv2dAttrs {
    fn default() -> Self {
        Self {
            groups: 1,
            padding_h: Padding::zero(),
            padding_w: Padding::zero(),
            stride_h: 1,
            stride_w: 1,
            dilation_h: 1,
            dilation_w: 1,
            activation: ValueRange::full(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReduceWindow2dAttrs {
    pub op: ReduceOp,
    pub init_value: f32,
    pub filter_h: usize,
    pub filter_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
    pub padding_h: Padding,
    pub padding_w: Padding,
    pub activation: ValueRange,
}

impl ReduceWindow2dAttrs {
    pub fn pool(op: ReduceOp, filter: usize, stride: usize) -> Self {
        let init_value = match op {
            ReduceOp::Max => f32::NEG_INFINITY,
            ReduceOp::Min => f32::INFINITY,
            ReduceOp::Prod => 1.0,
            ReduceOp::Mean | ReduceOp::Sum => 0.0,
        };
        Self {
            op,
            init_value,
            filter_h: filter,
            filter_w: filter,
            stride_h: stride,
            stride_w: stride,
            dilation_h: 1,
            dilation_w: 1,
            padding_h: Padding::zero(),
            padding_w: Padding::zero(),
            activation: ValueRange::full(),
        }
    }
}

/// Operator of a graph node with its typed attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    Input,
    Output,
    /// Raw little-endian bytes; type and shape come from the output connector.
    Constant {
        data: Vec<u8>,
    },
    Ignore,
    Binary {
        op: BinaryOp,
        activation: ValueRange,
    },
    Unary {
        op: UnaryOp,
    },
    Conv2d(Conv2dAttrs),
    Conv2dTranspose(Conv2dAttrs),
    Matmul {
        activation: ValueRange,
    },
    Pad {
        paddings: Vec<Padding>,
        mode: PadMode,
        pad_value: f32,
    },
    Slice {
        begin: Vec<i32>,
        end: Vec<i32>,
        strides: Vec<i32>,
    },
    Transpose {
        perm: Vec<usize>,
    },
    Concat {
        axis: usize,
    },
    Reduce {
        op: ReduceOp,
        axes: Vec<usize>,
        init_value: f32,
        keep_dims: bool,
    },
    ReduceWindow2d(ReduceWindow2dAttrs),
    Quantize {
        param: QuantParam,
    },
    Dequantize {
        param: QuantParam,
    },
    ResizeImage {
        mode: ResizeMode,
        new_size: [usize; 2],
        align_corners: bool,
        half_pixel_centers: bool,
    },
    Gather {
        axis: usize,
    },
    GatherNd {
        batch_dims: usize,
    },
    Bitcast,
    Clamp,
    Convert,
    FusedUnary {
        subgraph: FusedSubgraph,
    },
    BatchToSpace {
        block_h: usize,
        block_w: usize,
        crop_h: Padding,
        crop_w: Padding,
    },
    TableLookup1d,
}

/// Input or output count accepted by an operator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

macro_rules! op_kinds {
    ($($variant:ident => $label:expr, $inputs:expr, $outputs:expr;)+) => {
        /// Fieldless tag of [`Operation`]; the closed set every backend covers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum OpKind {
            $($variant),+
        }

        impl OpKind {
            pub const ALL: &'static [OpKind] = &[$(OpKind::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $(OpKind::$variant => $label),+
                }
            }

            pub fn input_arity(self) -> Arity {
                match self {
                    $(OpKind::$variant => $inputs),+
                }
            }

            pub fn output_arity(self) -> Arity {
                match self {
                    $(OpKind::$variant => $outputs),+
                }
            }
        }
    };
}

op_kinds! {
    Input => "input", Arity::Exact(0), Arity::Exact(1);
    Output => "output", Arity::Exact(1), Arity::Exact(0);
    Constant => "constant", Arity::Exact(0), Arity::Exact(1);
    Ignore => "ignore", Arity::Exact(1), Arity::Exact(0);
    Binary => "binary", Arity::Exact(2), Arity::Exact(1);
    Unary => "unary", Arity::Exact(1), Arity::Exact(1);
    Conv2d => "conv2d", Arity::Exact(3), Arity::Exact(1);
    Conv2dTranspose => "conv2d_transpose", Arity::Exact(3), Arity::Exact(1);
    Matmul => "matmul", Arity::Exact(3), Arity::Exact(1);
    Pad => "pad", Arity::Exact(1), Arity::Exact(1);
    Slice => "slice", Arity::Exact(1), Arity::Exact(1);
    Transpose => "transpose", Arity::Exact(1), Arity::Exact(1);
    Concat => "concat", Arity::AtLeast(1), Arity::Exact(1);
    Reduce => "reduce", Arity::Exact(1), Arity::Exact(1);
    ReduceWindow2d => "reduce_window2d", Arity::Exact(1), Arity::Exact(1);
    Quantize => "quantize", Arity::Exact(1), Arity::Exact(1);
    Dequantize => "dequantize", Arity::Exact(1), Arity::Exact(1);
    ResizeImage => "resize_image", Arity::Exact(1), Arity::Exact(1);
    Gather => "gather", Arity::Exact(2), Arity::Exact(1);
    GatherNd => "gather_nd", Arity::Exact(2), Arity::Exact(1);
    Bitcast => "bitcast", Arity::Exact(1), Arity::Exact(1);
    Clamp => "clamp", Arity::Exact(3), Arity::Exact(1);
    Convert => "convert", Arity::Exact(1), Arity::Exact(1);
    FusedUnary => "fused_unary", Arity::Exact(1), Arity::Exact(1);
    BatchToSpace => "batch_to_space", Arity::Exact(1), Arity::Exact(1);
    TableLookup1d => "table_lookup1d", Arity::Exact(2), Arity::Exact(1);
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Operation {
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Input => OpKind::Input,
            Operation::Output => OpKind::Output,
            Operation::Constant { .. } => OpKind::Constant,
            Operation::Ignore => OpKind::Ignore,
            Operation::Binary { .. } => OpKind::Binary,
            Operation::Unary { .. } => OpKind::Unary,
            Operation::Conv2d(_) => OpKind::Conv2d,
            Operation::Conv2dTranspose(_) => OpKind::Conv2dTranspose,
            Operation::Matmul { .. } => OpKind::Matmul,
            Operation::Pad { .. } => OpKind::Pad,
            Operation::Slice { .. } => OpKind::Slice,
            Operation::Transpose { .. } => OpKind::Transpose,
            Operation::Concat { .. } => OpKind::Concat,
            Operation::Reduce { .. } => OpKind::Reduce,
            Operation::ReduceWindow2d(_) => OpKind::ReduceWindow2d,
            Operation::Quantize { .. } => OpKind::Quantize,
            Operation::Dequantize { .. } => OpKind::Dequantize,
            Operation::ResizeImage { .. } => OpKind::ResizeImage,
            Operation::Gather { .. } => OpKind::Gather,
            Operation::GatherNd { .. } => OpKind::GatherNd,
            Operation::Bitcast => OpKind::Bitcast,
            Operation::Clamp => OpKind::Clamp,
            Operation::Convert => OpKind::Convert,
            Operation::FusedUnary { .. } => OpKind::FusedUnary,
            Operation::BatchToSpace { .. } => OpKind::BatchToSpace,
            Operation::TableLookup1d => OpKind::TableLookup1d,
        }
    }

    /// Attribute dump for diagnostics. Constant payloads are summarized.
    pub fn describe_attributes(&self) -> String {
        match self {
            Operation::Constant { data } => format!("{{ {} bytes }}", data.len()),
            other => {
                let full = format!("{other:?}");
                match full.find(['{', '(']) {
                    Some(pos) => full[pos..].to_string(),
                    None => String::from("{}"),
                }
            }
        }
    }
}
