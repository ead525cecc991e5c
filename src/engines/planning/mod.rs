pub mod decoder;
pub mod enumerator;
pub mod feasibility;
pub mod program;
pub mod realize;
pub mod shape;
pub mod skeleton;

pub use decoder::{PlanningContext, TreeDecoder};
pub use enumerator::{BuildReport, IndexBuilder};
pub use feasibility::{FeasibilityIndex, IndexEntry};
pub use program::{InputSlot, Program, ProgramInput, ProgramKey, ProgramNode};
pub use realize::RealizedPlan;
pub use shape::TreeShape;
pub use skeleton::{NodeKind, NodeValue, ProgramTrace, RestrictedSubtree, Skeleton, SkeletonBuilder};
