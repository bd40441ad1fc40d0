pub mod modular;
pub mod ntt;
pub mod poly;
pub mod residue;

pub use ntt::NttPoly;
pub use poly::CoeffPoly;
pub use residue::ResiduePoly;
