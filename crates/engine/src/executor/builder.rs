//! Commit/reveal transaction construction and signing.
//!
//! Fees are estimated by sizing a dummy-signed clone of the transaction,
//! iterating until the fee implied by the size is covered by the selected
//! inputs. Selection is largest-first over mature, unleased outputs.

use bitcoin::{
    absolute::LockTime,
    hashes::Hash,
    script::{Builder as ScriptBuilder, PushBytesBuf},
    sighash::{EcdsaSighashType, SighashCache},
    transaction::Version,
    Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};

use crate::{
    client::Utxo,
    errors::{MintError, MintResult},
    executor::leases::UtxoLeaseSet,
};

/// Outputs below this are unrelayable; change under it is folded into the
/// fee instead.
pub(crate) const DUST_LIMIT: Amount = Amount::from_sat(546);

/// Worst-case DER signature length used when sizing dummy-signed inputs.
const DUMMY_SIG_LEN: usize = 72;

fn txin(outpoint: OutPoint) -> TxIn {
    TxIn {
        previous_output: outpoint,
        script_sig: ScriptBuf::new(),
        sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
        witness: Witness::new(),
    }
}

fn new_tx(input: Vec<TxIn>, output: Vec<TxOut>) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output,
    }
}

fn push_buf(bytes: Vec<u8>) -> MintResult<PushBytesBuf> {
    PushBytesBuf::try_from(bytes)
        .map_err(|e| MintError::Script(format!("push too large: {e}")))
}

/// Virtual size of the transaction with placeholder signatures attached.
///
/// `reveal_redeem` marks input 0 as the P2SH envelope spend; all other
/// inputs are sized as P2WPKH spends.
fn dummy_signed_vsize(
    inputs: &[TxIn],
    outputs: &[TxOut],
    reveal_redeem: Option<&ScriptBuf>,
) -> MintResult<usize> {
    let mut tx = new_tx(inputs.to_vec(), outputs.to_vec());
    for (i, input) in tx.input.iter_mut().enumerate() {
        if i == 0 {
            if let Some(redeem) = reveal_redeem {
                input.script_sig = ScriptBuilder::new()
                    .push_slice(push_buf(vec![0u8; DUMMY_SIG_LEN])?)
                    .push_slice(push_buf(redeem.to_bytes())?)
                    .into_script();
                continue;
            }
        }
        input.witness = Witness::from_slice(&[vec![0u8; DUMMY_SIG_LEN], vec![0u8; 33]]);
    }
    Ok(tx.vsize())
}

fn total_amount(utxos: &[Utxo]) -> Amount {
    utxos.iter().fold(Amount::ZERO, |acc, u| acc + u.amount)
}

/// Largest-first selection over spendable outputs.
///
/// Spendable means mature per the confirmation floor and not leased to an
/// in-flight transaction. Errors with the shortfall when the pool cannot
/// cover `target`.
pub(crate) fn select_utxos(
    available: &[Utxo],
    target: Amount,
    min_confirmations: u64,
    leases: &UtxoLeaseSet,
) -> MintResult<Vec<Utxo>> {
    let mut spendable: Vec<&Utxo> = available
        .iter()
        .filter(|u| u.is_mature(min_confirmations) && !leases.is_leased(&u.outpoint))
        .collect();
    spendable.sort_by_key(|u| std::cmp::Reverse(u.amount));

    let mut chosen = Vec::new();
    let mut total = Amount::ZERO;
    for utxo in spendable {
        chosen.push(utxo.clone());
        total += utxo.amount;
        if total >= target {
            return Ok(chosen);
        }
    }
    Err(MintError::InsufficientFunds {
        needed: target.to_sat(),
        have: total.to_sat(),
    })
}

pub(crate) struct BuiltCommit {
    pub tx: Transaction,
    /// Funding outputs the transaction spends, aligned with `tx.input`.
    pub selected: Vec<Utxo>,
}

/// Builds the commit: funds `deposit_value` at the deposit script out of
/// the signer wallet, change back to the wallet.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_commit_tx(
    available: &[Utxo],
    deposit_spk: ScriptBuf,
    deposit_value: Amount,
    change_spk: ScriptBuf,
    fee_rate_sat_per_vb: u64,
    min_confirmations: u64,
    leases: &UtxoLeaseSet,
) -> MintResult<BuiltCommit> {
    // Seed with a 1-in/2-out guess; the loop below only ever raises the
    // fee, and selection errors out once the wallet cannot keep up, so
    // this terminates.
    let mut fee = Amount::from_sat(141 * fee_rate_sat_per_vb);
    loop {
        let selected = select_utxos(available, deposit_value + fee, min_confirmations, leases)?;
        let total = total_amount(&selected);
        let change = total - deposit_value - fee;

        let inputs: Vec<TxIn> = selected.iter().map(|u| txin(u.outpoint)).collect();
        let mut outputs = vec![TxOut {
            value: deposit_value,
            script_pubkey: deposit_spk.clone(),
        }];
        if change >= DUST_LIMIT {
            outputs.push(TxOut {
                value: change,
                script_pubkey: change_spk.clone(),
            });
        }

        let vsize = dummy_signed_vsize(&inputs, &outputs, None)?;
        let implied = Amount::from_sat(vsize as u64 * fee_rate_sat_per_vb);
        if implied <= fee {
            // Sub-dust change was folded into the fee above.
            return Ok(BuiltCommit {
                tx: new_tx(inputs, outputs),
                selected,
            });
        }
        fee = implied;
    }
}

#[derive(Debug)]
pub(crate) struct BuiltReveal {
    pub tx: Transaction,
    /// Wallet outputs added on top of the deposit to cover the fee.
    pub extras: Vec<Utxo>,
}

/// Builds the reveal: spends the deposit output (input 0, the envelope
/// spend) plus wallet outputs as needed, paying everything above the
/// change back as fee.
///
/// The fee is the larger of the size-implied fee and `min_fee`; paying
/// less than `min_fee` produces a transaction the ledger accepts but the
/// indexer ignores.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_reveal_tx(
    deposit: &Utxo,
    wallet: &[Utxo],
    redeem_script: &ScriptBuf,
    change_spk: ScriptBuf,
    fee_rate_sat_per_vb: u64,
    min_fee: Amount,
    min_confirmations: u64,
    leases: &UtxoLeaseSet,
) -> MintResult<BuiltReveal> {
    let mut extras: Vec<Utxo> = Vec::new();
    loop {
        let mut inputs = vec![txin(deposit.outpoint)];
        inputs.extend(extras.iter().map(|u| txin(u.outpoint)));
        let outputs = vec![TxOut {
            value: DUST_LIMIT,
            script_pubkey: change_spk.clone(),
        }];

        let vsize = dummy_signed_vsize(&inputs, &outputs, Some(redeem_script))?;
        let fee = Amount::from_sat(vsize as u64 * fee_rate_sat_per_vb).max(min_fee);
        let total = deposit.amount + total_amount(&extras);

        if total >= fee + DUST_LIMIT {
            let outputs = vec![TxOut {
                value: total - fee,
                script_pubkey: change_spk.clone(),
            }];
            return Ok(BuiltReveal {
                tx: new_tx(inputs, outputs),
                extras,
            });
        }

        // Deposit alone cannot carry the fee; pull one more wallet output.
        let next = wallet
            .iter()
            .filter(|u| {
                u.is_mature(min_confirmations)
                    && !leases.is_leased(&u.outpoint)
                    && !extras.iter().any(|e| e.outpoint == u.outpoint)
            })
            .max_by_key(|u| u.amount);
        match next {
            Some(u) => extras.push(u.clone()),
            None => {
                return Err(MintError::InsufficientFunds {
                    needed: (fee + DUST_LIMIT).to_sat(),
                    have: total.to_sat(),
                })
            }
        }
    }
}

/// Value the commit must lock at the deposit address so the reveal can pay
/// its fee and still leave a relayable change output.
pub(crate) fn required_commit_value(
    redeem_script: &ScriptBuf,
    change_spk: &ScriptBuf,
    fee_rate_sat_per_vb: u64,
    min_fee: Amount,
) -> MintResult<Amount> {
    let inputs = vec![txin(OutPoint::null())];
    let outputs = vec![TxOut {
        value: DUST_LIMIT,
        script_pubkey: change_spk.clone(),
    }];
    let vsize = dummy_signed_vsize(&inputs, &outputs, Some(redeem_script))?;
    let fee = Amount::from_sat(vsize as u64 * fee_rate_sat_per_vb).max(min_fee);
    Ok(fee + DUST_LIMIT)
}

/// Signs a run of P2WPKH inputs starting at `offset`, one witness per
/// input. `utxos` must align with `tx.input[offset..]`.
pub(crate) fn sign_p2wpkh_inputs(
    secp: &Secp256k1<All>,
    tx: &mut Transaction,
    utxos: &[Utxo],
    offset: usize,
    secret_key: &SecretKey,
    public_key: &PublicKey,
) -> MintResult<()> {
    let mut sighashes = Vec::with_capacity(utxos.len());
    {
        let mut cache = SighashCache::new(&*tx);
        for (i, utxo) in utxos.iter().enumerate() {
            let sighash = cache
                .p2wpkh_signature_hash(
                    offset + i,
                    &utxo.script_pubkey,
                    utxo.amount,
                    EcdsaSighashType::All,
                )
                .map_err(|e| MintError::Script(format!("p2wpkh sighash: {e}")))?;
            sighashes.push(sighash);
        }
    }
    for (i, sighash) in sighashes.into_iter().enumerate() {
        let msg = Message::from_digest(sighash.to_byte_array());
        let signature = bitcoin::ecdsa::Signature {
            signature: secp.sign_ecdsa(&msg, secret_key),
            sighash_type: EcdsaSighashType::All,
        };
        tx.input[offset + i].witness = Witness::p2wpkh(&signature, public_key);
    }
    Ok(())
}

/// Signs input 0 as the P2SH envelope spend: scriptSig carries the
/// signature and the full redeem script.
pub(crate) fn sign_reveal_input(
    secp: &Secp256k1<All>,
    tx: &mut Transaction,
    redeem_script: &ScriptBuf,
    secret_key: &SecretKey,
) -> MintResult<()> {
    let sighash = SighashCache::new(&*tx)
        .legacy_signature_hash(0, redeem_script, EcdsaSighashType::All.to_u32())
        .map_err(|e| MintError::Script(format!("legacy sighash: {e}")))?;
    let msg = Message::from_digest(sighash.to_byte_array());
    let mut sig_bytes = secp.sign_ecdsa(&msg, secret_key).serialize_der().to_vec();
    sig_bytes.push(EcdsaSighashType::All.to_u32() as u8);

    tx.input[0].script_sig = ScriptBuilder::new()
        .push_slice(push_buf(sig_bytes)?)
        .push_slice(push_buf(redeem_script.to_bytes())?)
        .into_script();
    Ok(())
}
