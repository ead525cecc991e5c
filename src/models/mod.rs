pub mod encoding;
pub mod traits;

pub use encoding::{EncodedNode, TreeEncoding};
pub use traits::{ChemistryExecutor, Fingerprinter, Oracle, ScoringModel, ShapePredictor};
