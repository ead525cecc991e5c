pub mod phenotype;

pub use phenotype::{evaluate, evaluate_all, Expressed, Expresser};
