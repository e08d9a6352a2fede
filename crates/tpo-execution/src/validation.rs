//! Pre-dispatch validation of user-entered amounts.
//!
//! Runs against an `OrderState` before anything reaches the router; a
//! validation error never produces an action.

use std::fmt;

use tpo_schemas::Decimal;

use crate::aggregator::OrderState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationError {
    StateLoading,
    NonPositive,
    /// Same value as the outstanding order (exact decimal equality).
    EqualsCurrentOrder,
    /// First investment below the pool's minimum.
    BelowMinimum { minimum: Decimal },
    ExceedsBalance { available: Decimal },
    /// Backend cannot replace an outstanding order in place.
    OrderChangeUnsupported,
    /// Investor has not completed onboarding for this tranche.
    NotEligible,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::StateLoading => write!(f, "Your position is still loading"),
            ValidationError::NonPositive => write!(f, "Amount must be greater than zero"),
            ValidationError::EqualsCurrentOrder => {
                write!(f, "Amount equals your current order")
            }
            ValidationError::BelowMinimum { minimum } => {
                write!(f, "Investment amount too low (minimum is {minimum})")
            }
            ValidationError::ExceedsBalance { available } => {
                write!(f, "Amount exceeds your available balance of {available}")
            }
            ValidationError::OrderChangeUnsupported => write!(
                f,
                "Cancel your pending order before placing a new one"
            ),
            ValidationError::NotEligible => {
                write!(f, "You are not eligible to invest in this tranche")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl OrderState {
    pub fn validate_invest(&self, amount: Decimal) -> Result<(), ValidationError> {
        self.validate_common(amount, self.pending_invest)?;

        if !self.investor_eligible {
            return Err(ValidationError::NotEligible);
        }
        if self.is_first_investment {
            if let Some(minimum) = self.min_initial_investment {
                if amount < minimum {
                    return Err(ValidationError::BelowMinimum { minimum });
                }
            }
        }

        let available = self.available(self.pool_currency_balance, self.pending_invest);
        if amount > available {
            return Err(ValidationError::ExceedsBalance { available });
        }
        Ok(())
    }

    pub fn validate_redeem(&self, amount: Decimal) -> Result<(), ValidationError> {
        self.validate_common(amount, self.pending_redeem)?;

        let available = self.available(self.tranche_token_balance, self.pending_redeem);
        if amount > available {
            return Err(ValidationError::ExceedsBalance { available });
        }
        Ok(())
    }

    fn validate_common(&self, amount: Decimal, pending: Decimal) -> Result<(), ValidationError> {
        if self.loading {
            return Err(ValidationError::StateLoading);
        }
        if amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositive);
        }
        if pending > Decimal::ZERO && amount == pending {
            return Err(ValidationError::EqualsCurrentOrder);
        }
        if pending > Decimal::ZERO && !self.can_change_order {
            return Err(ValidationError::OrderChangeUnsupported);
        }
        Ok(())
    }

    /// An in-place change replaces the pending order, so its amount is
    /// available again.
    fn available(&self, balance: Decimal, pending: Decimal) -> Decimal {
        if self.can_change_order {
            balance + pending
        } else {
            balance
        }
    }
}
