//! VRF verification precompile at address 0x2713.
//!
//! Verifies an ECVRF-SECP256K1-SHA256-TAI proof and returns the VRF output.
//! Input layout (packed, no ABI padding):
//!
//! ```text
//! | alpha (32) | public key, compressed SEC1 (33) | proof (81) |
//! ```
//!
//! The proof is `gamma (33) || c (16) || s (32)`. On success the output is the
//! 32-byte VRF hash `beta`. Any failure yields no output.

use crate::error::{ExecutionError, VrfError};
use crate::precompiles::NativeContract;
use alloy_primitives::{address, Address, Bytes};
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, ProjectivePoint, PublicKey, Scalar};
use sha2::{Digest, Sha256};

/// VRF precompile address (0x0000000000000000000000000000000000002713).
pub const VRF_PRECOMPILE_ADDRESS: Address = address!("0x0000000000000000000000000000000000002713");

/// Fixed gas cost of one verification.
pub const VRF_VERIFY_GAS: u64 = 5_000;

const SUITE: u8 = 0xfe;
const POINT_LEN: usize = 33;
const CHALLENGE_LEN: usize = 16;
const SCALAR_LEN: usize = 32;
const PROOF_LEN: usize = POINT_LEN + CHALLENGE_LEN + SCALAR_LEN;
const ALPHA_LEN: usize = 32;

/// The VRF verification precompile.
#[derive(Debug, Clone, Copy, Default)]
pub struct VrfVerify;

impl NativeContract for VrfVerify {
    fn required_gas(&self, _input: &[u8]) -> u64 {
        VRF_VERIFY_GAS
    }

    fn run(&self, input: &[u8]) -> Result<Bytes, ExecutionError> {
        if input.len() <= ALPHA_LEN + POINT_LEN {
            return Err(ExecutionError::precompile(
                VrfError::InputTooShort(input.len()).to_string(),
            ));
        }
        let alpha = &input[..ALPHA_LEN];
        let public_key = &input[ALPHA_LEN..ALPHA_LEN + POINT_LEN];
        let proof = &input[ALPHA_LEN + POINT_LEN..];
        verify(public_key, alpha, proof)
            .map(|beta| Bytes::copy_from_slice(&beta))
            .map_err(|e| ExecutionError::precompile(e.to_string()))
    }
}

/// Verify `proof` for `alpha` under `public_key`, returning `beta`.
pub fn verify(public_key: &[u8], alpha: &[u8], proof: &[u8]) -> Result<[u8; 32], VrfError> {
    let y = PublicKey::from_sec1_bytes(public_key)
        .map_err(|_| VrfError::InvalidPublicKey)?
        .to_projective();
    let (gamma, c, s) = decode_proof(proof)?;

    let h = hash_to_curve(&y, alpha)?;
    let u = ProjectivePoint::GENERATOR * s - y * c;
    let v = h * s - gamma * c;

    let expected = hash_points(&[h, gamma, u, v]);
    if expected != c {
        return Err(VrfError::VerificationFailed);
    }
    Ok(proof_to_hash(&gamma))
}

/// Produce a proof of `alpha` under `secret`.
///
/// The nonce is derived from the secret key and the hashed point, so equal
/// inputs give equal proofs.
pub fn prove(secret: &[u8; 32], alpha: &[u8]) -> Result<([u8; PROOF_LEN], [u8; 32]), VrfError> {
    let x: Scalar = Option::from(Scalar::from_repr(FieldBytes::from(*secret)))
        .ok_or(VrfError::InvalidPublicKey)?;
    let y = ProjectivePoint::GENERATOR * x;
    let h = hash_to_curve(&y, alpha)?;
    let gamma = h * x;

    let nonce_digest = Sha256::new()
        .chain_update(secret)
        .chain_update(compress(&h))
        .finalize();
    let k = <Scalar as Reduce<k256::U256>>::reduce_bytes(&nonce_digest);

    let c = hash_points(&[h, gamma, ProjectivePoint::GENERATOR * k, h * k]);
    let s = k + c * x;

    let mut proof = [0u8; PROOF_LEN];
    proof[..POINT_LEN].copy_from_slice(&compress(&gamma));
    proof[POINT_LEN..POINT_LEN + CHALLENGE_LEN]
        .copy_from_slice(&c.to_repr()[SCALAR_LEN - CHALLENGE_LEN..]);
    proof[POINT_LEN + CHALLENGE_LEN..].copy_from_slice(&s.to_repr());
    Ok((proof, proof_to_hash(&gamma)))
}

/// Compressed public key for `secret`.
pub fn public_key(secret: &[u8; 32]) -> Result<[u8; POINT_LEN], VrfError> {
    let x: Scalar = Option::from(Scalar::from_repr(FieldBytes::from(*secret)))
        .ok_or(VrfError::InvalidPublicKey)?;
    Ok(compress(&(ProjectivePoint::GENERATOR * x)))
}

fn decode_proof(proof: &[u8]) -> Result<(ProjectivePoint, Scalar, Scalar), VrfError> {
    if proof.len() != PROOF_LEN {
        return Err(VrfError::MalformedProof);
    }
    let gamma = PublicKey::from_sec1_bytes(&proof[..POINT_LEN])
        .map_err(|_| VrfError::MalformedProof)?
        .to_projective();

    let mut c_bytes = FieldBytes::default();
    c_bytes[SCALAR_LEN - CHALLENGE_LEN..].copy_from_slice(&proof[POINT_LEN..POINT_LEN + CHALLENGE_LEN]);
    let c = Option::from(Scalar::from_repr(c_bytes)).ok_or(VrfError::MalformedProof)?;

    let s_bytes = FieldBytes::clone_from_slice(&proof[POINT_LEN + CHALLENGE_LEN..]);
    let s = Option::from(Scalar::from_repr(s_bytes)).ok_or(VrfError::MalformedProof)?;
    Ok((gamma, c, s))
}

fn hash_to_curve(y: &ProjectivePoint, alpha: &[u8]) -> Result<ProjectivePoint, VrfError> {
    let pk = compress(y);
    for ctr in 0..=u8::MAX {
        let digest = Sha256::new()
            .chain_update([SUITE, 0x01])
            .chain_update(pk)
            .chain_update(alpha)
            .chain_update([ctr])
            .finalize();
        let mut candidate = [0u8; POINT_LEN];
        candidate[0] = 0x02;
        candidate[1..].copy_from_slice(&digest);
        if let Ok(point) = PublicKey::from_sec1_bytes(&candidate) {
            return Ok(point.to_projective());
        }
    }
    Err(VrfError::HashToCurve)
}

fn hash_points(points: &[ProjectivePoint]) -> Scalar {
    let mut hasher = Sha256::new().chain_update([SUITE, 0x02]);
    for point in points {
        hasher.update(compress(point));
    }
    let digest = hasher.finalize();
    let mut bytes = FieldBytes::default();
    bytes[SCALAR_LEN - CHALLENGE_LEN..].copy_from_slice(&digest[..CHALLENGE_LEN]);
    <Scalar as Reduce<k256::U256>>::reduce_bytes(&bytes)
}

fn proof_to_hash(gamma: &ProjectivePoint) -> [u8; 32] {
    Sha256::new()
        .chain_update([SUITE, 0x03])
        .chain_update(compress(gamma))
        .finalize()
        .into()
}

fn compress(point: &ProjectivePoint) -> [u8; POINT_LEN] {
    let encoded = point.to_affine().to_encoded_point(true);
    let mut out = [0u8; POINT_LEN];
    let bytes = encoded.as_bytes();
    out[..bytes.len()].copy_from_slice(bytes);
    out
}
