//! Portfolio accounting errors.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::shared::Symbol;

/// Errors raised by portfolio mutations. A failed mutation leaves the
/// portfolio unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortfolioError {
    /// Decrease exceeds the held quantity.
    #[error("Insufficient quantity for {symbol}: requested {requested}, held {held}")]
    InsufficientQuantity {
        /// Symbol being reduced.
        symbol: Symbol,
        /// Quantity requested.
        requested: Decimal,
        /// Quantity held.
        held: Decimal,
    },

    /// No open position for the symbol.
    #[error("No position in {0}")]
    PositionNotFound(Symbol),

    /// Quantity must be strictly positive.
    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(Decimal),

    /// Price must be strictly positive.
    #[error("Price must be positive, got {0}")]
    InvalidPrice(Decimal),

    /// Fees cannot be negative.
    #[error("Fee cannot be negative, got {0}")]
    InvalidFee(Decimal),
}

impl PortfolioError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InsufficientQuantity { .. } => "INSUFFICIENT_QUANTITY",
            Self::PositionNotFound(_) => "POSITION_NOT_FOUND",
            Self::InvalidQuantity(_) => "INVALID_QUANTITY",
            Self::InvalidPrice(_) => "INVALID_PRICE",
            Self::InvalidFee(_) => "INVALID_FEE",
        }
    }
}
