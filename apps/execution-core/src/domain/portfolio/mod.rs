//! Portfolio Accounting Bounded Context
//!
//! Cash, per-symbol positions and profit and loss derived from fills.
//!
//! # Invariants
//!
//! - No zero-quantity position is ever stored.
//! - `total_value == cash + Σ position.market_value` after every mutation.
//! - A decrease larger than the held quantity fails and changes nothing.

pub mod aggregate;
pub mod errors;
pub mod position;
pub mod repository;

pub use aggregate::{Portfolio, PortfolioSnapshot};
pub use errors::PortfolioError;
pub use position::Position;
pub use repository::PortfolioRepository;
