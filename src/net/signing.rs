//! Command Signing
//!
//! Optional anti-tamper layer for signed matches. Each peer generates a
//! keypair at match start and exchanges verifying keys during connection
//! setup; every outbound command is canonicalized (deep key-sorted JSON),
//! signed, and carried with its base64 signature. Receivers verify against
//! the sender's known key before the command may be queued.
//!
//! Ed25519 keeps signatures deterministic - no per-signature nonce to leak
//! or misuse - and `serde_json`'s BTreeMap-backed object model produces the
//! key-sorted canonical form for free.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::game::command::GameCommand;
use crate::world::entity::PlayerId;

/// Signing failures.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Canonicalization failed (should be impossible for valid commands).
    #[error("command canonicalization failed: {0}")]
    Canonicalize(#[from] serde_json::Error),
    /// Verifying key bytes were not a valid point.
    #[error("invalid verifying key")]
    BadKey,
}

/// Canonical byte form of a command: JSON with every object's keys sorted.
///
/// `serde_json::Value` objects are BTreeMaps, so serializing through
/// `Value` sorts keys at every nesting level.
pub fn canonical_bytes(command: &GameCommand) -> Result<Vec<u8>, SigningError> {
    let value = serde_json::to_value(command)?;
    Ok(serde_json::to_string(&value)?.into_bytes())
}

/// The local peer's signing half.
pub struct CommandSigner {
    key: SigningKey,
}

impl CommandSigner {
    /// Deterministic construction from 32 seed bytes. Callers supply the
    /// entropy (OS randomness at match setup); the simulation never
    /// generates keys itself.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// The verifying key to hand to peers during connection setup.
    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    /// Sign a command; returns the base64 signature for the wire.
    pub fn sign(&self, command: &GameCommand) -> Result<String, SigningError> {
        let bytes = canonical_bytes(command)?;
        let signature = self.key.sign(&bytes);
        Ok(BASE64.encode(signature.to_bytes()))
    }
}

/// Known peer verifying keys, exchanged at connection setup.
#[derive(Default)]
pub struct KeyRegistry {
    keys: BTreeMap<PlayerId, VerifyingKey>,
}

impl KeyRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer's verifying key.
    pub fn register(&mut self, peer: PlayerId, key_bytes: [u8; 32]) -> Result<(), SigningError> {
        let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| SigningError::BadKey)?;
        self.keys.insert(peer, key);
        Ok(())
    }

    /// Whether a peer has a registered key.
    pub fn has_key(&self, peer: PlayerId) -> bool {
        self.keys.contains_key(&peer)
    }

    /// Verify a command's base64 signature against a peer's known key.
    ///
    /// Any failure - unknown peer, malformed signature, verification
    /// failure, canonicalization error - is simply `false`; the caller
    /// rejects the command either way.
    pub fn verify(&self, peer: PlayerId, command: &GameCommand, signature_b64: &str) -> bool {
        let Some(key) = self.keys.get(&peer) else {
            return false;
        };
        let Ok(bytes) = canonical_bytes(command) else {
            return false;
        };
        let Ok(sig_bytes) = BASE64.decode(signature_b64) else {
            return false;
        };
        let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
            return false;
        };
        let signature = Signature::from_bytes(&sig_array);
        key.verify(&bytes, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::FixedVec2;
    use crate::game::command::CommandKind;
    use crate::world::entity::EntityId;

    fn command() -> GameCommand {
        GameCommand {
            tick: 14,
            player: PlayerId(0),
            kind: CommandKind::Move {
                units: vec![EntityId(7)],
                target: FixedVec2::from_cell(50, 60),
            },
        }
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let signer = CommandSigner::from_seed([7u8; 32]);
        let mut registry = KeyRegistry::new();
        registry
            .register(PlayerId(0), signer.verifying_key_bytes())
            .unwrap();

        let cmd = command();
        let signature = signer.sign(&cmd).unwrap();
        assert!(registry.verify(PlayerId(0), &cmd, &signature));
    }

    #[test]
    fn test_tampered_command_fails() {
        let signer = CommandSigner::from_seed([7u8; 32]);
        let mut registry = KeyRegistry::new();
        registry
            .register(PlayerId(0), signer.verifying_key_bytes())
            .unwrap();

        let cmd = command();
        let signature = signer.sign(&cmd).unwrap();

        let mut tampered = cmd.clone();
        tampered.tick = 15;
        assert!(!registry.verify(PlayerId(0), &tampered, &signature));
    }

    #[test]
    fn test_wrong_key_fails() {
        let signer = CommandSigner::from_seed([7u8; 32]);
        let other = CommandSigner::from_seed([8u8; 32]);
        let mut registry = KeyRegistry::new();
        registry
            .register(PlayerId(0), other.verifying_key_bytes())
            .unwrap();

        let cmd = command();
        let signature = signer.sign(&cmd).unwrap();
        assert!(!registry.verify(PlayerId(0), &cmd, &signature));
    }

    #[test]
    fn test_unknown_peer_and_garbage_signature() {
        let registry = KeyRegistry::new();
        assert!(!registry.verify(PlayerId(3), &command(), "AAAA"));

        let signer = CommandSigner::from_seed([7u8; 32]);
        let mut registry = KeyRegistry::new();
        registry
            .register(PlayerId(0), signer.verifying_key_bytes())
            .unwrap();
        assert!(!registry.verify(PlayerId(0), &command(), "not base64!!"));
    }

    #[test]
    fn test_canonical_form_is_stable() {
        // Signing is over deep key-sorted JSON, so byte equality of the
        // canonical form is part of the cross-peer contract.
        let a = canonical_bytes(&command()).unwrap();
        let b = canonical_bytes(&command()).unwrap();
        assert_eq!(a, b);
    }
}
