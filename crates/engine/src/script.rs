//! Deterministic inscription locking script.
//!
//! The payload is wrapped in an unexecuted envelope inside a P2SH redeem
//! script. Construction is a pure function of (signer pubkey, payload
//! bytes): same inputs, same script, same address — which is what makes
//! crash recovery possible, since the script itself is never persisted.

use bitcoin::{
    opcodes::{
        all::{OP_CHECKSIG, OP_ENDIF, OP_IF},
        OP_FALSE,
    },
    script::{Builder as ScriptBuilder, PushBytesBuf},
    Address, Network, ScriptBuf,
};
use secp256k1::PublicKey;

use crate::errors::{MintError, MintResult};

/// Envelope marker pushed right after `OP_IF`.
pub const ENVELOPE_MARKER: &[u8] = b"ord";

/// Content type advertised for the payload.
pub const CONTENT_TYPE: &[u8] = b"application/json";

/// Ledger-enforced ceiling on a P2SH redeem script.
pub const MAX_REDEEM_SCRIPT_SIZE: usize = 520;

/// A built locking script and the deposit address it hashes to.
#[derive(Clone, Debug)]
pub struct InscriptionScript {
    pub redeem_script: ScriptBuf,
    pub address: Address,
}

/// Builds the redeem script embedding `payload` and derives its P2SH
/// address.
///
/// Layout:
///
/// ```text
/// OP_FALSE OP_IF
///   <"ord"> OP_1 <content-type> OP_0 <payload>
/// OP_ENDIF
/// <signer pubkey> OP_CHECKSIG
/// ```
///
/// The envelope branch never executes; spending requires only a signature
/// for the embedded pubkey.
pub fn build_inscription_script(
    signer_pubkey: &[u8],
    payload: &[u8],
    network: Network,
) -> MintResult<InscriptionScript> {
    let pubkey = PublicKey::from_slice(signer_pubkey)
        .map_err(|e| MintError::BadKey(format!("invalid signer pubkey: {e}")))?;

    let redeem_script = ScriptBuilder::new()
        .push_opcode(OP_FALSE)
        .push_opcode(OP_IF)
        .push_slice(push_buf(ENVELOPE_MARKER)?)
        .push_int(1)
        .push_slice(push_buf(CONTENT_TYPE)?)
        .push_int(0)
        .push_slice(push_buf(payload)?)
        .push_opcode(OP_ENDIF)
        .push_slice(pubkey.serialize())
        .push_opcode(OP_CHECKSIG)
        .into_script();

    if redeem_script.len() > MAX_REDEEM_SCRIPT_SIZE {
        return Err(MintError::Script(format!(
            "redeem script is {} bytes, ledger limit is {MAX_REDEEM_SCRIPT_SIZE}",
            redeem_script.len()
        )));
    }

    let address = Address::p2sh(&redeem_script, network)
        .map_err(|e| MintError::Script(format!("p2sh derivation: {e}")))?;

    Ok(InscriptionScript {
        redeem_script,
        address,
    })
}

fn push_buf(bytes: &[u8]) -> MintResult<PushBytesBuf> {
    PushBytesBuf::try_from(bytes.to_vec())
        .map_err(|e| MintError::Script(format!("push too large: {e}")))
}

#[cfg(test)]
mod tests {
    use bitcoin::opcodes::all::OP_PUSHNUM_1;
    use secp256k1::{Secp256k1, SecretKey};

    use super::*;

    fn test_pubkey() -> Vec<u8> {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[0x5a; 32]).unwrap();
        PublicKey::from_secret_key(&secp, &sk).serialize().to_vec()
    }

    #[test]
    fn test_script_deterministic() {
        let payload = br#"{"p":"crt-721","op":"mint","tick":"cert","id":7,"to":"x"}"#;
        let a = build_inscription_script(&test_pubkey(), payload, Network::Regtest).unwrap();
        let b = build_inscription_script(&test_pubkey(), payload, Network::Regtest).unwrap();
        assert_eq!(a.redeem_script, b.redeem_script);
        assert_eq!(a.address, b.address);
    }

    #[test]
    fn test_distinct_payloads_distinct_addresses() {
        let pk = test_pubkey();
        let a = build_inscription_script(&pk, b"payload-one", Network::Regtest).unwrap();
        let b = build_inscription_script(&pk, b"payload-two", Network::Regtest).unwrap();
        assert_ne!(a.address, b.address);
    }

    #[test]
    fn test_envelope_layout() {
        let script = build_inscription_script(&test_pubkey(), b"{}", Network::Regtest)
            .unwrap()
            .redeem_script;
        let bytes = script.as_bytes();
        assert_eq!(bytes[0], OP_FALSE.to_u8());
        assert_eq!(bytes[1], OP_IF.to_u8());
        // 3-byte marker push.
        assert_eq!(&bytes[2..6], [3, b'o', b'r', b'd']);
        assert_eq!(bytes[6], OP_PUSHNUM_1.to_u8());
        assert_eq!(*bytes.last().unwrap(), OP_CHECKSIG.to_u8());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = vec![b'a'; MAX_REDEEM_SCRIPT_SIZE];
        let err = build_inscription_script(&test_pubkey(), &payload, Network::Regtest)
            .unwrap_err();
        assert!(matches!(err, MintError::Script(_)));
    }

    #[test]
    fn test_garbage_pubkey_rejected() {
        let err =
            build_inscription_script(&[0u8; 33], b"{}", Network::Regtest).unwrap_err();
        assert!(matches!(err, MintError::BadKey(_)));
    }
}
