mod cover;
mod cube;
mod expr;

pub use cover::{Cover, CoverDisplay};
pub use cube::{Cube, CubeDisplay};
pub use expr::Expr;
