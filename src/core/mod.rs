pub mod assembler;
pub mod normalizer;
pub mod unflatten;
pub mod xml;

pub use assembler::{assemble, assemble_into, TreeAssembler};
pub use normalizer::{normalize, BodyFormat, Field, FieldKind, NormalizedResponse};
pub use unflatten::{unflatten, JsonUnflattener};
