//! Shamir secret sharing over the Ed25519 scalar field.
//!
//! A polynomial of degree k-1 carries the secret as its constant term;
//! share i is the evaluation at x = i (indices start at 1 so x = 0 never
//! leaks the secret). Any k shares reconstruct the constant term by
//! Lagrange interpolation at zero.

use cordon_core::{CordonError, CordonResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use curve25519_dalek::scalar::Scalar;
use rand::Rng;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Reconstruction threshold for `n` approvers: floor(0.8 × n), at least 1.
pub fn threshold_for(n: usize) -> usize {
    ((n as f64) * 0.8).floor().max(1.0) as usize
}

/// Polynomial f(x) = a_0 + a_1·x + … + a_{k-1}·x^{k-1} with the secret
/// as a_0.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ShamirPolynomial {
    coefficients: Vec<Scalar>,
}

impl ShamirPolynomial {
    /// Random polynomial of degree `threshold - 1` with `secret` as the
    /// constant term.
    pub fn from_secret<R: Rng>(secret: Scalar, threshold: usize, rng: &mut R) -> Self {
        debug_assert!(threshold > 0);
        let mut coefficients = vec![secret];
        for _ in 1..threshold {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            coefficients.push(Scalar::from_bytes_mod_order(bytes));
        }
        Self { coefficients }
    }

    /// Evaluate at `x` by Horner's method.
    pub fn evaluate(&self, x: Scalar) -> Scalar {
        let mut result = Scalar::ZERO;
        for coeff in self.coefficients.iter().rev() {
            result = result * x + coeff;
        }
        result
    }
}

/// One share: the evaluation of the polynomial at index `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretShare {
    /// Share index, 1-based.
    pub index: u32,
    /// f(index).
    pub value: Scalar,
}

/// Split `secret` into `n` shares with reconstruction threshold `k`.
pub fn split<R: Rng>(secret: Scalar, n: usize, k: usize, rng: &mut R) -> Vec<SecretShare> {
    debug_assert!(k <= n);
    let polynomial = ShamirPolynomial::from_secret(secret, k, rng);
    (1..=n as u32)
        .map(|index| SecretShare {
            index,
            value: polynomial.evaluate(Scalar::from(index)),
        })
        .collect()
}

/// Reconstruct the secret from shares by Lagrange interpolation at zero.
/// The caller enforces the threshold; this fails only on an empty or
/// index-duplicating share set.
pub fn reconstruct(shares: &[SecretShare]) -> CordonResult<Scalar> {
    if shares.is_empty() {
        return Err(CordonError::serialization(
            "cannot interpolate with zero shares",
        ));
    }

    let mut result = Scalar::ZERO;
    for (i, share_i) in shares.iter().enumerate() {
        let x_i = Scalar::from(share_i.index);
        let mut basis = Scalar::ONE;
        for (j, share_j) in shares.iter().enumerate() {
            if i == j {
                continue;
            }
            if share_i.index == share_j.index {
                return Err(CordonError::serialization(format!(
                    "duplicate share index {}",
                    share_i.index
                )));
            }
            let x_j = Scalar::from(share_j.index);
            // L_i(0) *= -x_j / (x_i - x_j)
            basis *= (-x_j) * (x_i - x_j).invert();
        }
        result += share_i.value * basis;
    }
    Ok(result)
}

/// Encode a share for out-of-band delivery: base64 over 4 index bytes
/// plus the 32 canonical scalar bytes.
pub fn encode_share(share: &SecretShare) -> String {
    let mut bytes = Vec::with_capacity(36);
    bytes.extend_from_slice(&share.index.to_be_bytes());
    bytes.extend_from_slice(share.value.as_bytes());
    BASE64.encode(bytes)
}

/// Decode a share from its base64 form.
pub fn decode_share(encoded: &str) -> CordonResult<SecretShare> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| CordonError::serialization(format!("share encoding: {e}")))?;
    if bytes.len() != 36 {
        return Err(CordonError::serialization(format!(
            "share must be 36 bytes, got {}",
            bytes.len()
        )));
    }
    let mut index_bytes = [0u8; 4];
    index_bytes.copy_from_slice(&bytes[..4]);
    let mut value_bytes = [0u8; 32];
    value_bytes.copy_from_slice(&bytes[4..]);

    let value = Option::<Scalar>::from(Scalar::from_canonical_bytes(value_bytes))
        .ok_or_else(|| CordonError::serialization("share value is not a canonical scalar"))?;
    Ok(SecretShare {
        index: u32::from_be_bytes(index_bytes),
        value,
    })
}
