mod affine;
pub use affine::Affine;
mod rotation;
pub use rotation::Rotation;
