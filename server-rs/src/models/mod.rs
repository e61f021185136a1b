pub mod clan;

pub use clan::*;
