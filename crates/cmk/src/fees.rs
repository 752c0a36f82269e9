//! Calculate fees
//!
//! <https://github.com/cashubtc/nuts/blob/main/02.md>

use std::collections::HashMap;

use tracing::instrument;

use crate::nuts::Id;
use crate::{Amount, Error};

/// Fee required for proof set
///
/// Sum of `input_fee_ppk` over every proof, rounded up to a whole unit.
#[instrument(skip_all)]
pub fn calculate_fee(
    proofs_count: &HashMap<Id, u64>,
    keyset_fee: &HashMap<Id, u64>,
) -> Result<Amount, Error> {
    let mut sum_fee: u64 = 0;

    for (keyset_id, proof_count) in proofs_count {
        let keyset_fee_ppk = keyset_fee
            .get(keyset_id)
            .ok_or(Error::UnknownKeySet(*keyset_id))?;

        let proofs_fee = keyset_fee_ppk
            .checked_mul(*proof_count)
            .ok_or(Error::AmountOverflow)?;

        sum_fee = sum_fee
            .checked_add(proofs_fee)
            .ok_or(Error::AmountOverflow)?;
    }

    let fee = (sum_fee.checked_add(999).ok_or(Error::AmountOverflow)?) / 1000;

    Ok(fee.into())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_calc_fee() {
        let keyset_id = Id::from_str("001711afb1de20cb").unwrap();

        let mut keyset_fees = HashMap::new();
        keyset_fees.insert(keyset_id, 2);

        let cases = [(1, 1), (500, 1), (1000, 2), (2000, 4), (3500, 7), (3501, 8)];

        for (count, expected) in cases {
            let proofs_count = HashMap::from([(keyset_id, count)]);
            let sum_fee = calculate_fee(&proofs_count, &keyset_fees).unwrap();
            assert_eq!(sum_fee, Amount::from(expected), "{count} proofs");
        }
    }

    #[test]
    fn zero_ppk_is_free() {
        let keyset_id = Id::from_str("001711afb1de20cb").unwrap();
        let keyset_fees = HashMap::from([(keyset_id, 0)]);
        let proofs_count = HashMap::from([(keyset_id, 40)]);

        assert_eq!(
            calculate_fee(&proofs_count, &keyset_fees).unwrap(),
            Amount::ZERO
        );
    }

    #[test]
    fn unknown_keyset_is_rejected() {
        let keyset_id = Id::from_str("001711afb1de20cb").unwrap();
        let proofs_count = HashMap::from([(keyset_id, 1)]);

        assert!(matches!(
            calculate_fee(&proofs_count, &HashMap::new()),
            Err(Error::UnknownKeySet(_))
        ));
    }
}
