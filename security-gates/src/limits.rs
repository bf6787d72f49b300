//! Payment amount limits
//!
//! Three bounds apply to every payment: a global minimum, a per-operation
//! maximum, and a cap on the resulting pool balance. All three are checked
//! in one pass and the first violated bound is reported verbatim.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Amount bounds for payment validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Smallest accepted payment
    pub min_payment: Decimal,
    /// Largest accepted single payment
    pub max_payment: Decimal,
    /// Cap on any single pool balance after the payment lands
    pub max_pool_balance: Decimal,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            min_payment: Decimal::new(10, 0),
            max_payment: Decimal::new(10_000, 0),
            max_pool_balance: Decimal::new(50_000, 0),
        }
    }
}

impl LimitConfig {
    /// Check a payment amount against all bounds, given the current pool
    /// balance. Returns the violated bound's description, or `None` when
    /// every bound holds.
    pub fn check(&self, amount: Decimal, current_balance: Decimal) -> Option<String> {
        if amount < self.min_payment {
            return Some(format!(
                "amount {} below minimum payment {}",
                amount, self.min_payment
            ));
        }
        if amount > self.max_payment {
            return Some(format!(
                "amount {} above maximum payment {}",
                amount, self.max_payment
            ));
        }
        let resulting = current_balance + amount;
        if resulting > self.max_pool_balance {
            return Some(format!(
                "resulting balance {} would exceed pool cap {}",
                resulting, self.max_pool_balance
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_bounds() {
        let limits = LimitConfig::default();

        assert!(limits.check(dec("9.99"), Decimal::ZERO).is_some());
        assert!(limits.check(dec("10"), Decimal::ZERO).is_none());
        assert!(limits.check(dec("10000"), Decimal::ZERO).is_none());
        assert!(limits.check(dec("10000.01"), Decimal::ZERO).is_some());
    }

    #[test]
    fn test_pool_cap_includes_current_balance() {
        let limits = LimitConfig::default();

        assert!(limits.check(dec("10000"), dec("40000")).is_none());
        let violation = limits.check(dec("10000"), dec("40000.01")).unwrap();
        assert!(violation.contains("pool cap"));
    }
}
