use crate::la::GlobalVector;
use nalgebra::Scalar;

/// A nested (block) vector composed of per-field [`GlobalVector`] blocks.
///
/// Sub-blocks are independently addressable but jointly owned by the nested
/// container; block order follows the field order used at construction and is
/// significant for reproducibility of floating-point summation, not for
/// correctness.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedVector<T: Scalar> {
    blocks: Vec<GlobalVector<T>>,
}

impl<T: Scalar> NestedVector<T> {
    pub fn from_blocks(blocks: Vec<GlobalVector<T>>) -> Self {
        Self { blocks }
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, index: usize) -> &GlobalVector<T> {
        &self.blocks[index]
    }

    pub fn block_mut(&mut self, index: usize) -> &mut GlobalVector<T> {
        &mut self.blocks[index]
    }

    pub fn blocks(&self) -> &[GlobalVector<T>] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [GlobalVector<T>] {
        &mut self.blocks
    }
}
