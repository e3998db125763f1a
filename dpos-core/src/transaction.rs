//! Transaction data structures and operations

use crate::{Address, CoreError, CoreResult, Gas, Hash, Nonce, Wei};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Transaction signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl Signature {
    /// Create new signature
    pub fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    /// Convert to bytes (65 bytes total)
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != 65 {
            return Err(CoreError::InvalidSignature);
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);
        let v = bytes[64];

        Ok(Self { r, s, v })
    }
}

/// What a transaction does when executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub enum TxAction {
    /// Plain value transfer
    Transfer { to: Address, value: Wei },
    /// Opt the sender into validator eligibility
    BecomeCandidate,
    /// Back a candidate with the sender's stake
    Delegate { candidate: Address },
    /// Withdraw the sender's stake from a candidate
    UnDelegate { candidate: Address },
}

/// Transaction data structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub struct Transaction {
    /// Transaction nonce (number of transactions sent from this address)
    pub nonce: Nonce,
    /// Gas price in wei
    pub gas_price: Wei,
    /// Maximum gas to use for this transaction
    pub gas_limit: Gas,
    /// Action performed by this transaction
    pub action: TxAction,
    /// Transaction signature
    pub signature: Option<Signature>,
}

impl Transaction {
    /// Create a new transaction
    pub fn new(nonce: Nonce, gas_price: Wei, gas_limit: Gas, action: TxAction) -> Self {
        Self {
            nonce,
            gas_price,
            gas_limit,
            action,
            signature: None,
        }
    }

    /// Create a simple transfer transaction
    pub fn transfer(nonce: Nonce, to: Address, value: Wei, gas_price: Wei, gas_limit: Gas) -> Self {
        Self::new(nonce, gas_price, gas_limit, TxAction::Transfer { to, value })
    }

    /// Create a candidate-registration transaction
    pub fn become_candidate(nonce: Nonce, gas_price: Wei, gas_limit: Gas) -> Self {
        Self::new(nonce, gas_price, gas_limit, TxAction::BecomeCandidate)
    }

    /// Create a delegation transaction
    pub fn delegate(nonce: Nonce, candidate: Address, gas_price: Wei, gas_limit: Gas) -> Self {
        Self::new(nonce, gas_price, gas_limit, TxAction::Delegate { candidate })
    }

    /// Encode transaction for hashing (without signature)
    pub fn encode_for_signing(&self) -> CoreResult<Vec<u8>> {
        let tx_data = TransactionForSigning {
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            action: self.action.clone(),
        };

        bincode::encode_to_vec(&tx_data, bincode::config::standard())
            .map_err(|e| CoreError::Bincode(e.to_string()))
    }

    /// Calculate transaction hash (including signature)
    pub fn hash(&self) -> CoreResult<Hash> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CoreError::Bincode(e.to_string()))?;
        let hash_bytes = Keccak256::digest(&encoded);
        Ok(Hash::from_slice(hash_bytes.as_slice()))
    }

    /// Calculate hash for signing (without signature)
    pub fn signing_hash(&self) -> CoreResult<Hash> {
        let encoded = self.encode_for_signing()?;
        let hash_bytes = Keccak256::digest(&encoded);
        Ok(Hash::from_slice(hash_bytes.as_slice()))
    }

    /// Sign the transaction with private key
    pub fn sign(&mut self, private_key: &[u8]) -> CoreResult<()> {
        let signing_hash = self.signing_hash()?;
        let signature = sign_hash(private_key, &signing_hash)?;
        self.signature = Some(Signature::from_bytes(&signature)?);
        Ok(())
    }

    /// Get the sender address from signature
    pub fn sender(&self) -> CoreResult<Address> {
        let signature = match &self.signature {
            Some(sig) => sig,
            None => return Err(CoreError::InvalidSignature),
        };

        recover_signer(&self.signing_hash()?, &signature.to_bytes())
    }

    /// Verify transaction signature
    pub fn verify_signature(&self) -> CoreResult<bool> {
        match self.sender() {
            Ok(_) => Ok(true),
            Err(CoreError::InvalidSignature) => Ok(false),
            Err(CoreError::Crypto(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Sign a 32-byte hash with a secp256k1 private key, producing a 65-byte
/// recoverable signature (r ‖ s ‖ v).
pub fn sign_hash(private_key: &[u8], hash: &Hash) -> CoreResult<[u8; 65]> {
    let secp = secp256k1::Secp256k1::new();
    let secret_key = secp256k1::SecretKey::from_slice(private_key)
        .map_err(|e| CoreError::Crypto(e.to_string()))?;

    let message = secp256k1::Message::from_digest_slice(hash.as_bytes())
        .map_err(|e| CoreError::Crypto(e.to_string()))?;

    let sig = secp.sign_ecdsa_recoverable(message, &secret_key);
    let (recovery_id, sig_bytes) = sig.serialize_compact();

    let mut out = [0u8; 65];
    out[0..64].copy_from_slice(&sig_bytes);
    out[64] = recovery_id as u8;
    Ok(out)
}

/// Recover the signer address from a 65-byte recoverable signature over `hash`.
pub fn recover_signer(hash: &Hash, signature: &[u8]) -> CoreResult<Address> {
    if signature.len() != 65 {
        return Err(CoreError::InvalidSignature);
    }

    let secp = secp256k1::Secp256k1::new();
    let recovery_id = secp256k1::ecdsa::RecoveryId::from_u8_masked(signature[64]);

    let recoverable_sig =
        secp256k1::ecdsa::RecoverableSignature::from_compact(&signature[0..64], recovery_id)
            .map_err(|e| CoreError::Crypto(e.to_string()))?;

    let message = secp256k1::Message::from_digest_slice(hash.as_bytes())
        .map_err(|e| CoreError::Crypto(e.to_string()))?;

    let public_key = secp
        .recover_ecdsa(message, &recoverable_sig)
        .map_err(|e| CoreError::Crypto(e.to_string()))?;

    Ok(address_from_public_key(&public_key))
}

/// Derive an address from a secp256k1 public key (last 20 bytes of the
/// Keccak256 hash of the uncompressed key).
pub fn address_from_public_key(public_key: &secp256k1::PublicKey) -> Address {
    let pubkey_bytes = public_key.serialize_uncompressed();
    let pubkey_hash = Keccak256::digest(&pubkey_bytes[1..]); // Skip first byte (0x04)
    let mut addr_bytes = [0u8; 20];
    addr_bytes.copy_from_slice(&pubkey_hash[12..32]);
    Address::new(addr_bytes)
}

/// Helper struct for encoding transaction data for signing
#[derive(Serialize, bincode::Encode)]
struct TransactionForSigning {
    nonce: Nonce,
    gas_price: Wei,
    gas_limit: Gas,
    action: TxAction,
}
