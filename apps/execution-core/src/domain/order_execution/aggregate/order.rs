//! Order Aggregate Root
//!
//! Identity and requested terms are fixed at creation. Only the lifecycle
//! status, its reason and the executed fields change afterwards, and only
//! through transitions validated by [`OrderStateMachine`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::errors::OrderError;
use crate::domain::order_execution::services::OrderStateMachine;
use crate::domain::order_execution::value_objects::{OrderSide, OrderStatus, OrderType};
use crate::domain::shared::{OrderId, Symbol, Timestamp};

/// Command to create a new order.
#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    /// Symbol to trade.
    pub symbol: Symbol,
    /// Order side.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Quantity to trade.
    pub quantity: Decimal,
    /// Limit price (required for Limit).
    pub limit_price: Option<Decimal>,
    /// Stop price (required for Stop).
    pub stop_price: Option<Decimal>,
}

impl CreateOrderCommand {
    /// Market order command.
    #[must_use]
    pub fn market(symbol: impl Into<Symbol>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
        }
    }

    /// Limit order command.
    #[must_use]
    pub fn limit(
        symbol: impl Into<Symbol>,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Stop order command.
    #[must_use]
    pub fn stop(
        symbol: impl Into<Symbol>,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Stop,
            stop_price: Some(stop_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Validate the command parameters.
    ///
    /// # Errors
    ///
    /// Returns error if required parameters are missing or invalid.
    pub fn validate(&self) -> Result<(), OrderError> {
        validate_terms(
            &self.symbol,
            self.order_type,
            self.quantity,
            self.limit_price,
            self.stop_price,
        )
    }
}

fn validate_terms(
    symbol: &Symbol,
    order_type: OrderType,
    quantity: Decimal,
    limit_price: Option<Decimal>,
    stop_price: Option<Decimal>,
) -> Result<(), OrderError> {
    symbol
        .validate()
        .map_err(|e| OrderError::invalid("symbol", e.to_string()))?;

    if quantity <= Decimal::ZERO {
        return Err(OrderError::invalid("quantity", "Quantity must be positive"));
    }

    if order_type.requires_limit_price() && limit_price.is_none() {
        return Err(OrderError::invalid(
            "limit_price",
            "Limit price required for limit orders",
        ));
    }

    if order_type.requires_stop_price() && stop_price.is_none() {
        return Err(OrderError::invalid(
            "stop_price",
            "Stop price required for stop orders",
        ));
    }

    for (field, price) in [("limit_price", limit_price), ("stop_price", stop_price)] {
        if price.is_some_and(|p| p <= Decimal::ZERO) {
            return Err(OrderError::invalid(field, "Price must be positive"));
        }
    }

    Ok(())
}

/// Order Aggregate Root.
#[allow(clippy::struct_field_names)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    symbol: Symbol,
    side: OrderSide,
    order_type: OrderType,
    quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stop_price: Option<Decimal>,
    status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status_reason: Option<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    executed_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    executed_quantity: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    executed_at: Option<Timestamp>,
}

impl Order {
    /// Create a new PENDING order from a command.
    ///
    /// # Errors
    ///
    /// Returns error if command validation fails.
    pub fn new(cmd: CreateOrderCommand) -> Result<Self, OrderError> {
        cmd.validate()?;
        let now = Timestamp::now();

        Ok(Self {
            id: OrderId::generate(),
            symbol: cmd.symbol,
            side: cmd.side,
            order_type: cmd.order_type,
            quantity: cmd.quantity,
            limit_price: cmd.limit_price,
            stop_price: cmd.stop_price,
            status: OrderStatus::Pending,
            status_reason: None,
            created_at: now,
            updated_at: now,
            executed_price: None,
            executed_quantity: None,
            executed_at: None,
        })
    }

    /// Validate an order received from outside the process.
    ///
    /// Checks the requested terms and that the executed fields are present
    /// exactly when the order is EXECUTED.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameters` describing the first violation.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.id.is_empty() {
            return Err(OrderError::invalid("id", "Order id is required"));
        }
        validate_terms(
            &self.symbol,
            self.order_type,
            self.quantity,
            self.limit_price,
            self.stop_price,
        )?;

        let executed = self.status == OrderStatus::Executed;
        let stamped = self.executed_price.is_some()
            || self.executed_quantity.is_some()
            || self.executed_at.is_some();
        if stamped != executed {
            return Err(OrderError::invalid(
                "executed_price",
                format!("Executed fields inconsistent with status {}", self.status),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Getters
    // ========================================================================

    /// Get the order ID.
    #[must_use]
    pub const fn id(&self) -> &OrderId {
        &self.id
    }

    /// Get the symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Get the order side.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Get the order type.
    #[must_use]
    pub const fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Get the requested quantity.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Get the limit price.
    #[must_use]
    pub const fn limit_price(&self) -> Option<Decimal> {
        self.limit_price
    }

    /// Get the stop price.
    #[must_use]
    pub const fn stop_price(&self) -> Option<Decimal> {
        self.stop_price
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Reason recorded with the last rejection or cancellation.
    #[must_use]
    pub fn status_reason(&self) -> Option<&str> {
        self.status_reason.as_deref()
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Get the last update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Average execution price, once executed.
    #[must_use]
    pub const fn executed_price(&self) -> Option<Decimal> {
        self.executed_price
    }

    /// Executed quantity, once executed.
    #[must_use]
    pub const fn executed_quantity(&self) -> Option<Decimal> {
        self.executed_quantity
    }

    /// Execution timestamp, once executed.
    #[must_use]
    pub const fn executed_at(&self) -> Option<Timestamp> {
        self.executed_at
    }

    /// Price used to estimate the order's notional value, if the order
    /// carries one.
    #[must_use]
    pub const fn reference_price(&self) -> Option<Decimal> {
        match (self.limit_price, self.stop_price) {
            (Some(price), _) | (None, Some(price)) => Some(price),
            (None, None) => None,
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Approve a PENDING order for execution.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the order is PENDING.
    pub fn approve(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Approved, None)
    }

    /// Mark an APPROVED order as executed, stamping the executed fields.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the order is APPROVED, or
    /// `InvalidParameters` if the price or quantity is out of range.
    pub fn execute(
        &mut self,
        price: Decimal,
        quantity: Decimal,
        at: Timestamp,
    ) -> Result<(), OrderError> {
        OrderStateMachine::validate_transition(self.status, OrderStatus::Executed)?;

        if price <= Decimal::ZERO {
            return Err(OrderError::invalid(
                "executed_price",
                "Executed price must be positive",
            ));
        }
        if quantity <= Decimal::ZERO || quantity > self.quantity {
            return Err(OrderError::invalid(
                "executed_quantity",
                format!(
                    "Executed quantity {quantity} outside (0, {}]",
                    self.quantity
                ),
            ));
        }

        self.executed_price = Some(price);
        self.executed_quantity = Some(quantity);
        self.executed_at = Some(at);
        self.transition(OrderStatus::Executed, None)
    }

    /// Reject an APPROVED order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the order is APPROVED.
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Rejected, Some(reason.into()))
    }

    /// Cancel a PENDING or APPROVED order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the order is already terminal.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Cancelled, Some(reason.into()))
    }

    fn transition(&mut self, to: OrderStatus, reason: Option<String>) -> Result<(), OrderError> {
        OrderStateMachine::validate_transition(self.status, to)?;
        self.status = to;
        self.status_reason = reason;
        self.updated_at = Timestamp::now();
        Ok(())
    }
}
