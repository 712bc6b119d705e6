//! Bank statement formats
pub mod norma43;

pub use norma43::parse_norma43;
