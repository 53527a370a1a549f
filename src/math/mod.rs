//! Mathematical utilities.
//!
//! - small dense linear algebra for the covariance factors (`linalg`)
//! - bounded Nelder–Mead minimizer behind the `Optimizer` trait (`optim`)
//! - least squares via SVD (`ols`)
//! - empirical quantiles (`quantile`)

pub mod linalg;
pub mod ols;
pub mod optim;
pub mod quantile;

pub use linalg::*;
pub use ols::*;
pub use optim::*;
pub use quantile::*;
