use nnvm::schedule::MemoryLocation;
use nnvm::tensor::Padding;

use crate::instruction::{Instruction, TensorFunction};
use crate::writer::SectionWriter;

/// Typed instruction emission into a `.text` writer.
#[derive(Debug, Default)]
pub struct OpBuilder {
    writer: SectionWriter,
    count: usize,
}

impl OpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, instruction: &Instruction) {
        instruction.encode(&mut self.writer);
        self.count += 1;
    }

    pub fn nop(&mut self) {
        self.emit(&Instruction::Nop);
    }

    pub fn ldc_i4(&mut self, value: i32) {
        self.emit(&Instruction::LdcI4(value));
    }

    pub fn ldc_r4(&mut self, value: f32) {
        self.emit(&Instruction::LdcR4(value));
    }

    pub fn lea_buffer(&mut self, location: MemoryLocation, offset: u32) {
        self.emit(&Instruction::LeaBuffer { location, offset });
    }

    /// Pushes `values` and stores them into shape register `reg`.
    pub fn stshape(&mut self, reg: u8, values: &[i32]) {
        for value in values {
            self.ldc_i4(*value);
        }
        // rank is bounded by the caller
        self.emit(&Instruction::StShape {
            reg,
            rank: values.len() as u8,
        });
    }

    /// Pushes before/after pairs and stores them into paddings register `reg`.
    pub fn stpaddings(&mut self, reg: u8, paddings: &[Padding]) {
        for padding in paddings {
            self.ldc_i4(padding.before);
            self.ldc_i4(padding.after);
        }
        self.emit(&Instruction::StPaddings {
            reg,
            rank: paddings.len() as u8,
        });
    }

    pub fn tensor(&mut self, function: TensorFunction) {
        self.emit(&Instruction::Tensor(function));
    }

    pub fn position(&self) -> usize {
        self.writer.position()
    }

    pub fn instruction_count(&self) -> usize {
        self.count
    }

    pub fn finish(self) -> Vec<u8> {
        self.writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_text;

    #[test]
    fn register_stores_push_their_values_first() {
        let mut builder = OpBuilder::new();
        builder.stshape(1, &[2, 3]);
        builder.stpaddings(0, &[Padding::new(1, -1)]);
        assert_eq!(builder.instruction_count(), 6);
        let decoded = decode_text(&builder.finish()).expect("decode");
        assert_eq!(
            decoded,
            vec![
                Instruction::LdcI4(2),
                Instruction::LdcI4(3),
                Instruction::StShape { reg: 1, rank: 2 },
                Instruction::LdcI4(1),
                Instruction::LdcI4(-1),
                Instruction::StPaddings { reg: 0, rank: 1 },
            ]
        );
    }
}
