//! Pipeline stages, in execution order:
//! text extraction → embedding → tensor transform → search-index reduction.

pub mod embedding;
pub mod ocr;
pub mod reduction;
pub mod tensor;
