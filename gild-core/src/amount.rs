//! This module defines the `Amount` and `SplitAmount` structs, which are used for
//! representing and splitting amounts into cashu denominations.
//!
//! The `Amount` struct represents an amount in satoshis. Its `split` method
//! decomposes the amount into the powers of two that are set in its binary
//! representation, in ascending order. This decomposition drives the shape of
//! overpaid-fee change as described in
//! [Nut-08](https://github.com/cashubtc/nuts/blob/main/08.md).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount(pub u64);

impl Amount {
    pub fn split(&self) -> SplitAmount {
        split_amount(self.0).into()
    }
}

impl From<u64> for Amount {
    fn from(amount: u64) -> Self {
        Self(amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAmount(Vec<u64>);

impl From<Vec<u64>> for SplitAmount {
    fn from(from: Vec<u64>) -> Self {
        Self(from)
    }
}

impl SplitAmount {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn amounts(&self) -> &[u64] {
        &self.0
    }
}

impl IntoIterator for SplitAmount {
    type Item = u64;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// split a decimal amount into a vector of powers of 2, in ascending order
fn split_amount(amount: u64) -> Vec<u64> {
    (0..u64::BITS)
        .filter(|i| amount & (1 << i) != 0)
        .map(|i| 1 << i)
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::amount::Amount;

    #[test]
    fn test_split_amount() -> anyhow::Result<()> {
        let bits = super::split_amount(13);
        assert_eq!(bits, vec![1, 4, 8]);

        let bits = super::split_amount(63);
        assert_eq!(bits, vec![1, 2, 4, 8, 16, 32]);

        let bits = super::split_amount(64);
        assert_eq!(bits, vec![64]);

        let bits = super::split_amount(900);
        assert_eq!(bits, vec![4, 128, 256, 512]);

        assert!(super::split_amount(0).is_empty());
        Ok(())
    }

    #[test]
    fn test_split_is_increasing_and_sums() -> anyhow::Result<()> {
        for amount in [1u64, 2, 3, 17, 255, 256, 900, 4095, 123_456] {
            let split: Vec<u64> = Amount(amount).split().into_iter().collect();
            assert!(split.windows(2).all(|w| w[0] < w[1]));
            assert!(split.iter().all(|a| a.is_power_of_two()));
            assert_eq!(split.iter().sum::<u64>(), amount);
        }
        Ok(())
    }
}
