//! Core math modules.

pub mod normal;
pub mod quadrature;
pub mod roots;
pub mod stable;
