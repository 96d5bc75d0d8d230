//! Fee arithmetic: input fees per
//! [Nut-02](https://github.com/cashubtc/nuts/blob/main/02.md) and the
//! overpaid-change shape of
//! [Nut-08](https://github.com/cashubtc/nuts/blob/main/08.md)

use std::collections::HashMap;

use crate::amount::Amount;
use crate::error::CoreError;

/// Fee required for a proof set: per-input ppk summed over all inputs, with a
/// single ceiling division at the end.
pub fn calculate_input_fee(
    proofs_count: &HashMap<String, u64>,
    keyset_fee_ppk: &HashMap<String, u64>,
) -> Result<u64, CoreError> {
    let mut sum_fee_ppk = 0u64;
    for (keyset_id, proof_count) in proofs_count {
        let fee_ppk = keyset_fee_ppk
            .get(keyset_id)
            .ok_or(CoreError::InvalidKeysetId)?;
        sum_fee_ppk += fee_ppk * proof_count;
    }
    Ok(sum_fee_ppk.div_ceil(1000))
}

/// The overpaid amount returned as change after a melt:
/// `Σ inputs − amount − actual fee − input fees`, clamped at zero.
pub fn overpaid_fees(inputs_total: u64, amount: u64, fee_paid: u64, input_fees: u64) -> u64 {
    inputs_total.saturating_sub(amount + fee_paid + input_fees)
}

/// Ascending powers of two summing to the overpaid amount.
pub fn calculate_change_amounts(overpaid: u64) -> Vec<u64> {
    Amount(overpaid).split().into_iter().collect()
}

/// Number of blank outputs a wallet must provide to receive change for a fee
/// reserve: `max(ceil(log2(fee_reserve + 1)), 1)`, zero when the reserve is
/// zero.
pub fn blank_output_count(fee_reserve: u64) -> usize {
    if fee_reserve == 0 {
        return 0;
    }
    let ceil_log2 = (64 - fee_reserve.leading_zeros()) as usize;
    ceil_log2.max(1)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::{
        blank_output_count, calculate_change_amounts, calculate_input_fee, overpaid_fees,
    };

    fn fee_for(count: u64, ppk: u64) -> u64 {
        let keyset_id = "009a1f293253e41e".to_string();
        let mut counts = HashMap::new();
        let mut fees = HashMap::new();
        if count > 0 {
            counts.insert(keyset_id.clone(), count);
        }
        fees.insert(keyset_id, ppk);
        calculate_input_fee(&counts, &fees).expect("known keyset")
    }

    #[test]
    fn test_input_fee_boundaries() {
        assert_eq!(fee_for(0, 100), 0);
        assert_eq!(fee_for(0, 0), 0);
        assert_eq!(fee_for(1, 100), 1);
        // the Nut-02 example: three inputs at 100ppk cost one sat
        assert_eq!(fee_for(3, 100), 1);
        assert_eq!(fee_for(10, 100), 1);
        assert_eq!(fee_for(11, 100), 2);
        assert_eq!(fee_for(1000, 2), 2);
        assert_eq!(fee_for(3501, 2), 8);
    }

    #[test]
    fn test_input_fee_heterogeneous_keysets() -> anyhow::Result<()> {
        let mut counts = HashMap::new();
        let mut fees = HashMap::new();
        counts.insert("00aaaaaaaaaaaaaa".to_string(), 3);
        counts.insert("00bbbbbbbbbbbbbb".to_string(), 2);
        fees.insert("00aaaaaaaaaaaaaa".to_string(), 100);
        fees.insert("00bbbbbbbbbbbbbb".to_string(), 200);

        // 300 + 400 ppk, a single ceiling
        assert_eq!(calculate_input_fee(&counts, &fees)?, 1);
        Ok(())
    }

    #[test]
    fn test_input_fee_unknown_keyset() {
        let mut counts = HashMap::new();
        counts.insert("00aaaaaaaaaaaaaa".to_string(), 1);
        assert!(calculate_input_fee(&counts, &HashMap::new()).is_err());
    }

    #[test]
    fn test_blank_output_count() {
        // the Nut-08 example
        assert_eq!(blank_output_count(1000), 10);
        assert_eq!(blank_output_count(256), 9);
        assert_eq!(blank_output_count(512), 10);
        assert_eq!(blank_output_count(0), 0);
        assert_eq!(blank_output_count(1), 1);
        assert_eq!(blank_output_count(2), 2);
    }

    #[test]
    fn test_change_amounts() {
        assert_eq!(calculate_change_amounts(900), vec![4, 128, 256, 512]);
        assert_eq!(calculate_change_amounts(17), vec![1, 16]);
        assert!(calculate_change_amounts(0).is_empty());
    }

    #[test]
    fn test_overpaid_fees() {
        assert_eq!(overpaid_fees(120, 100, 3, 0), 17);
        assert_eq!(overpaid_fees(120, 100, 20, 0), 0);
        // never negative
        assert_eq!(overpaid_fees(100, 100, 3, 2), 0);
    }
}
