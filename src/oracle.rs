//! Randomness request/fulfill protocol and the bundled VRF adapter.
//!
//! The engines never block on randomness. An operation that needs a random
//! value records an [`OracleRequest`], moves its state machine into a shape
//! that forbids conflicting operations, and returns. The fulfillment arrives
//! later as its own atomic step, keyed to the request id and consumed at most
//! once. The oracle itself is a trusted black box behind [`RandomnessOracle`];
//! [`VrfOracle`] is the adapter implementation used by the demo binary and
//! the integration tests.

use crate::errors::{GameError, GameResult};
use async_trait::async_trait;
use dashmap::DashMap;
use schnorrkel::context::SigningContext;
use schnorrkel::{ExpansionMode, Keypair, MiniSecretKey, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

const VRF_SIGNING_CONTEXT: &[u8] = b"stakehouse";

/// Raw random value delivered by a fulfillment.
pub type Randomness = [u8; 32];

/// What an outstanding request will be used for. Each request correlates to
/// exactly one (game, purpose) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "purpose", rename_all = "snake_case")]
pub enum Purpose {
    RaffleWinner { round_id: u64 },
    DuelSeed,
    BingoSeed { game_id: u64 },
    BingoDraw { game_id: u64 },
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Purpose::RaffleWinner { round_id } => write!(f, "raffle-winner:{}", round_id),
            Purpose::DuelSeed => write!(f, "duel-seed"),
            Purpose::BingoSeed { game_id } => write!(f, "bingo-seed:{}", game_id),
            Purpose::BingoDraw { game_id } => write!(f, "bingo-draw:{}", game_id),
        }
    }
}

/// A randomness request issued by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub id: Uuid,
    pub purpose: Purpose,
}

impl OracleRequest {
    pub fn new(purpose: Purpose) -> Self {
        Self {
            id: Uuid::new_v4(),
            purpose,
        }
    }

    /// Deterministic input the VRF adapter signs over.
    pub fn input_message(&self) -> String {
        format!("{}:{}", self.id, self.purpose)
    }
}

/// Cryptographic material proving a fulfillment was honestly derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VrfProof {
    /// Hex-encoded VRF output (32 bytes).
    pub output: String,
    /// Hex-encoded VRF proof (64-byte schnorrkel signature).
    pub proof: String,
    /// Hex-encoded public key (32 bytes).
    pub public_key: String,
    /// Input message used for the VRF.
    pub input_message: String,
}

/// One random value, delivered for exactly one request.
#[derive(Debug, Clone)]
pub struct Fulfillment {
    pub request_id: Uuid,
    pub randomness: Randomness,
    pub proof: Option<VrfProof>,
}

/// The randomness service seam. Submitting a request and receiving its
/// fulfillment are always two distinct operations: `submit` returns before
/// the value exists as far as the caller can tell, and the value arrives on
/// the delivery channel handed out when the adapter was built.
#[async_trait]
pub trait RandomnessOracle: Send + Sync {
    async fn submit(&self, request: &OracleRequest) -> GameResult<()>;
}

/// Registry of outstanding requests, consumed at most once.
#[derive(Debug, Default)]
pub struct PendingRequests {
    inner: DashMap<Uuid, Purpose>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    pub fn register(&self, request: &OracleRequest) {
        self.inner.insert(request.id, request.purpose);
    }

    /// Take the purpose for a fulfillment. Unknown or already-consumed ids
    /// are rejections.
    pub fn consume(&self, request_id: Uuid) -> GameResult<Purpose> {
        self.inner
            .remove(&request_id)
            .map(|(_, purpose)| purpose)
            .ok_or(GameError::UnknownOracleRequest(request_id))
    }

    /// Drop an outstanding request so a late fulfillment for it is rejected.
    pub fn invalidate(&self, request_id: Uuid) -> bool {
        self.inner.remove(&request_id).is_some()
    }

    pub fn is_pending(&self, request_id: Uuid) -> bool {
        self.inner.contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Derive a fresh 32-byte value from a fulfillment by domain-separated
/// hashing. Deterministic for a given (randomness, domain, counter) triple.
pub fn expand_randomness(randomness: &Randomness, domain: &[u8], counter: u64) -> Randomness {
    let mut hasher = Sha256::new();
    hasher.update(randomness);
    hasher.update(domain);
    hasher.update(counter.to_le_bytes());
    hasher.finalize().into()
}

/// Interpret the first eight bytes of a value as a little-endian integer.
pub fn randomness_to_u64(randomness: &Randomness) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&randomness[..8]);
    u64::from_le_bytes(bytes)
}

/// VRF-backed oracle adapter.
///
/// Output is sha256 of a schnorrkel signature over the request's input
/// message; the signature doubles as the publicly verifiable proof.
pub struct VrfOracle {
    keypair: Arc<Keypair>,
    outbox: mpsc::UnboundedSender<Fulfillment>,
}

impl VrfOracle {
    /// Build an adapter with a random key. Returns the adapter and the
    /// delivery channel fulfillments arrive on.
    pub fn new_random() -> (Arc<Self>, mpsc::UnboundedReceiver<Fulfillment>) {
        use rand_core::OsRng;
        Self::with_keypair(Keypair::generate_with(OsRng))
    }

    /// Build an adapter with a key expanded from a fixed seed, for
    /// reproducible demo runs.
    pub fn from_seed(seed: Randomness) -> (Arc<Self>, mpsc::UnboundedReceiver<Fulfillment>) {
        match MiniSecretKey::from_bytes(&seed) {
            Ok(mini) => Self::with_keypair(mini.expand_to_keypair(ExpansionMode::Ed25519)),
            Err(_) => Self::new_random(),
        }
    }

    fn with_keypair(keypair: Keypair) -> (Arc<Self>, mpsc::UnboundedReceiver<Fulfillment>) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                keypair: Arc::new(keypair),
                outbox,
            }),
            inbox,
        )
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.keypair.public.to_bytes())
    }

    fn vrf_sign(&self, message: &[u8]) -> (Randomness, Vec<u8>) {
        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        let signature = self.keypair.sign(ctx.bytes(message));

        // Output is the hash of the signature, so it is deterministic for the
        // key and input while the signature itself serves as the proof.
        let mut hasher = Sha256::new();
        hasher.update(signature.to_bytes());
        let output: Randomness = hasher.finalize().into();

        (output, signature.to_bytes().to_vec())
    }

    /// Verify that a proof matches its claimed input and output.
    pub fn verify_proof(proof: &VrfProof, expected_input: &str) -> Result<bool, String> {
        if proof.input_message != expected_input {
            return Ok(false);
        }

        let output = hex::decode(&proof.output).map_err(|e| format!("invalid output hex: {}", e))?;
        let signature_bytes =
            hex::decode(&proof.proof).map_err(|e| format!("invalid proof hex: {}", e))?;
        let public_key_bytes =
            hex::decode(&proof.public_key).map_err(|e| format!("invalid key hex: {}", e))?;

        let public_key_array: [u8; 32] = public_key_bytes
            .try_into()
            .map_err(|_| "public key must be 32 bytes")?;
        let public_key = PublicKey::from_bytes(&public_key_array)
            .map_err(|e| format!("invalid public key: {:?}", e))?;

        let signature_array: [u8; 64] = signature_bytes
            .try_into()
            .map_err(|_| "signature must be 64 bytes")?;
        let signature = Signature::from_bytes(&signature_array)
            .map_err(|e| format!("invalid signature: {:?}", e))?;

        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        if public_key
            .verify(ctx.bytes(expected_input.as_bytes()), &signature)
            .is_err()
        {
            return Ok(false);
        }

        let mut hasher = Sha256::new();
        hasher.update(signature_array);
        let computed: Randomness = hasher.finalize().into();

        Ok(computed.as_slice() == output.as_slice())
    }
}

#[async_trait]
impl RandomnessOracle for VrfOracle {
    async fn submit(&self, request: &OracleRequest) -> GameResult<()> {
        let input_message = request.input_message();
        let (randomness, signature) = self.vrf_sign(input_message.as_bytes());

        let fulfillment = Fulfillment {
            request_id: request.id,
            randomness,
            proof: Some(VrfProof {
                output: hex::encode(randomness),
                proof: hex::encode(&signature),
                public_key: self.public_key_hex(),
                input_message,
            }),
        };

        // Delivery happens on the channel, as a separate step from this
        // submit, even though this adapter computes the value immediately.
        self.outbox
            .send(fulfillment)
            .map_err(|_| GameError::UnknownOracleRequest(request.id))?;

        tracing::debug!(request_id = %request.id, purpose = %request.purpose, "oracle request fulfilled");
        Ok(())
    }
}
