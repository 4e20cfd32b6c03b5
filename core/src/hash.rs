//! Poseidon hash primitive
//!
//! The account tree commits with Poseidon over the BN254 scalar field,
//! using circom-compatible parameters so the same hashes can be recomputed
//! inside a proving circuit. Two fixed arities are used:
//!
//! - width 5 for account leaves: `Poseidon(pk_x, pk_y, balance, nonce, token)`
//! - width 2 for inner nodes: `Poseidon(left, right)`
//!
//! Hashes are `Fr` field elements in memory and 32-byte big-endian arrays
//! at the ledger boundary.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use light_poseidon::{Poseidon, PoseidonError, PoseidonHasher};

/// Hash 2 field elements (for Merkle tree pairs)
pub fn combine(left: &Fr, right: &Fr) -> Result<Fr, PoseidonError> {
    let mut hasher = Poseidon::<Fr>::new_circom(2)?;
    hasher.hash(&[*left, *right])
}

/// Hash an arbitrary fixed-arity input (for account leaves)
pub fn hash_fields(inputs: &[Fr]) -> Result<Fr, PoseidonError> {
    let mut hasher = Poseidon::<Fr>::new_circom(inputs.len())?;
    hasher.hash(inputs)
}

/// Convert a field element to a 32-byte array (big-endian)
pub fn field_to_bytes(value: &Fr) -> [u8; 32] {
    let bytes = value.into_bigint().to_bytes_be();
    let mut result = [0u8; 32];
    let start = 32_usize.saturating_sub(bytes.len());
    result[start..].copy_from_slice(&bytes);
    result
}

/// Convert a 32-byte array to a field element (big-endian, reduced mod p)
pub fn bytes_to_field(bytes: &[u8; 32]) -> Fr {
    Fr::from_be_bytes_mod_order(bytes)
}

/// Decimal rendering for logs
pub fn field_to_decimal(value: &Fr) -> String {
    value.into_bigint().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_deterministic() {
        let a = Fr::from(123u64);
        let b = Fr::from(456u64);

        let h1 = combine(&a, &b).unwrap();
        let h2 = combine(&a, &b).unwrap();

        assert_eq!(h1, h2, "Hash should be deterministic");
    }

    #[test]
    fn test_combine_order_matters() {
        let a = Fr::from(123u64);
        let b = Fr::from(456u64);

        let h1 = combine(&a, &b).unwrap();
        let h2 = combine(&b, &a).unwrap();

        assert_ne!(h1, h2, "Hash order should matter");
    }

    #[test]
    fn test_hash_fields_width() {
        let inputs = [Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)];
        let h1 = hash_fields(&inputs).unwrap();
        let h2 = hash_fields(&inputs[..2]).unwrap();
        assert_ne!(h1, h2, "Different widths should not collide on a prefix");
    }

    #[test]
    fn test_bytes_round_trip() {
        let value = combine(&Fr::from(7u64), &Fr::from(11u64)).unwrap();
        let bytes = field_to_bytes(&value);
        assert_eq!(bytes_to_field(&bytes), value);
    }
}
