//! Opcode and tensor-function numbering of the `.text` section.
//!
//! Every instruction is one opcode byte followed by its fields:
//!
//! | opcode | fields |
//! |---|---|
//! | `NOP` | none |
//! | `LDC_I4` | `i32` |
//! | `LDC_R4` | `f32` |
//! | `LEA_BUFFER` | `u8` location tag, `u32` byte offset |
//! | `STSHAPE` | `u8` register, `u8` rank; pops `rank` ints, last pushed is the last dim |
//! | `STPADDINGS` | `u8` register, `u8` rank; pops `2 * rank` ints as before/after pairs |
//! | `TENSOR` | `u16` function code, then the function's record |
//!
//! A record lists its operand descriptors (`u8` dtype tag, `u8` shape
//! register, `u8` strides register) in push order followed by its scalar
//! attributes. The tensor function pops one address per descriptor, output
//! first.

pub const OP_NOP: u8 = 0x00;
pub const OP_LDC_I4: u8 = 0x01;
pub const OP_LDC_R4: u8 = 0x02;
pub const OP_LEA_BUFFER: u8 = 0x03;
pub const OP_STSHAPE: u8 = 0x04;
pub const OP_STPADDINGS: u8 = 0x05;
pub const OP_TENSOR: u8 = 0x10;

pub const FN_BINARY: u16 = 0x0001;
pub const FN_UNARY: u16 = 0x0002;
pub const FN_CONV2D: u16 = 0x0003;
pub const FN_CONV2D_TRANSPOSE: u16 = 0x0004;
pub const FN_MATMUL: u16 = 0x0005;
pub const FN_PAD: u16 = 0x0006;
pub const FN_SLICE: u16 = 0x0007;
pub const FN_TRANSPOSE: u16 = 0x0008;
pub const FN_CONCAT: u16 = 0x0009;
pub const FN_REDUCE: u16 = 0x000a;
pub const FN_REDUCE_WINDOW2D: u16 = 0x000b;
pub const FN_QUANTIZE: u16 = 0x000c;
pub const FN_DEQUANTIZE: u16 = 0x000d;
pub const FN_RESIZE_IMAGE: u16 = 0x000e;
pub const FN_GATHER: u16 = 0x000f;
pub const FN_GATHER_ND: u16 = 0x0010;
pub const FN_BITCAST: u16 = 0x0011;
pub const FN_CLAMP: u16 = 0x0012;
pub const FN_CONVERT: u16 = 0x0013;
pub const FN_FUSED_UNARY: u16 = 0x0014;
pub const FN_BATCH_TO_SPACE: u16 = 0x0015;
pub const FN_TABLE_LOOKUP1D: u16 = 0x0016;

pub fn opcode_name(opcode: u8) -> Option<&'static str> {
    match opcode {
        OP_NOP => Some("nop"),
        OP_LDC_I4 => Some("ldc.i4"),
        OP_LDC_R4 => Some("ldc.r4"),
        OP_LEA_BUFFER => Some("lea.buffer"),
        OP_STSHAPE => Some("stshape"),
        OP_STPADDINGS => Some("stpaddings"),
        OP_TENSOR => Some("tensor"),
        _ => None,
    }
}

pub fn function_name(code: u16) -> Option<&'static str> {
    match code {
        FN_BINARY => Some("binary"),
        FN_UNARY => Some("unary"),
        FN_CONV2D => Some("conv2d"),
        FN_CONV2D_TRANSPOSE => Some("conv2d_transpose"),
        FN_MATMUL => Some("matmul"),
        FN_PAD => Some("pad"),
        FN_SLICE => Some("slice"),
        FN_TRANSPOSE => Some("transpose"),
        FN_CONCAT => Some("concat"),
        FN_REDUCE => Some("reduce"),
        FN_REDUCE_WINDOW2D => Some("reduce_window2d"),
        FN_QUANTIZE => Some("quantize"),
        FN_DEQUANTIZE => Some("dequantize"),
        FN_RESIZE_IMAGE => Some("resize_image"),
        FN_GATHER => Some("gather"),
        FN_GATHER_ND => Some("gather_nd"),
        FN_BITCAST => Some("bitcast"),
        FN_CLAMP => Some("clamp"),
        FN_CONVERT => Some("convert"),
        FN_FUSED_UNARY => Some("fused_unary"),
        FN_BATCH_TO_SPACE => Some("batch_to_space"),
        FN_TABLE_LOOKUP1D => Some("table_lookup1d"),
        _ => None,
    }
}
