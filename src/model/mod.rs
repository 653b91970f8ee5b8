//! Tensor forward model.
//!
//! Responsibilities:
//!
//! - build symmetry-constrained Raman tensors from their free elements
//! - build the crystal→lab rotation from ZYZ Euler angles
//! - predict a relative peak intensity for one (mode, orientation,
//!   configuration) triple in O(1) matrix arithmetic

pub mod forward;
pub mod rotation;
pub mod tensor;

pub use forward::*;
pub use rotation::*;
pub use tensor::*;
