//! Transform model variants.
mod mesh;
pub use mesh::{MIN_MESH_POINTS, MeshModel};
mod rigid;
pub use rigid::RigidModel;
