/// tokenflow kernel — Arithmetic Primitives
///
/// Weights and token counts are declared unsigned; delta slots are signed.
/// Every crossing between the two goes through here.

use crate::error::{ModelError, Result};

/// Contribution of a producing arc (transition → place).
pub fn produced(weight: u64) -> Result<i64> {
    i64::try_from(weight).map_err(|_| ModelError::WeightOverflow { weight })
}

/// Contribution of a consuming arc (place → transition).
pub fn consumed(weight: u64) -> Result<i64> {
    produced(weight).map(|w| -w)
}

/// Widen an unsigned count into a state vector slot.
pub fn count_to_slot(count: u64) -> Result<i64> {
    i64::try_from(count).map_err(|_| ModelError::CountOverflow { count })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_produced_ok() {
        assert_eq!(produced(0).unwrap(), 0);
        assert_eq!(produced(7).unwrap(), 7);
        assert_eq!(produced(i64::MAX as u64).unwrap(), i64::MAX);
    }

    #[test]
    fn test_consumed_negates() {
        assert_eq!(consumed(3).unwrap(), -3);
        assert_eq!(consumed(i64::MAX as u64).unwrap(), -i64::MAX);
    }

    #[test]
    fn test_weight_overflow() {
        match produced(u64::MAX) {
            Err(ModelError::WeightOverflow { weight }) => assert_eq!(weight, u64::MAX),
            other => panic!("expected WeightOverflow, got {:?}", other),
        }
        assert!(consumed(i64::MAX as u64 + 1).is_err());
    }

    #[test]
    fn test_count_overflow() {
        assert_eq!(count_to_slot(12).unwrap(), 12);
        match count_to_slot(u64::MAX) {
            Err(ModelError::CountOverflow { count }) => assert_eq!(count, u64::MAX),
            other => panic!("expected CountOverflow, got {:?}", other),
        }
    }
}
