pub mod gaussian;
pub mod uniform;

pub use gaussian::sample_gaussian_coeffs;
pub use uniform::{sample_hwt_coeffs, sample_small_coeffs, sample_uniform_residues};
