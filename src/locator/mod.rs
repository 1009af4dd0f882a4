pub mod candidates;
pub mod engine;
pub mod grid;
pub mod icons;
pub mod ocr;
pub mod proximity;
pub mod scaling;
pub mod tree;
pub mod types;
