//! Background reservation sweeper.
//!
//! Complements lazy expiry on read: reservations nobody touches again
//! still get their identifiers back into the pool. Each candidate expiry
//! is an independent compare-and-swap in the store, so a confirm landing
//! mid-sweep simply wins and the sweeper moves on.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use mintio_db_types::{traits::MintDatabase, types::ExpireOutcome};
use mintio_params::MintParams;
use tokio::sync::watch;
use tracing::*;

use crate::{errors::MintResult, now_ms};

pub struct SweeperContext<D> {
    pub db: Arc<D>,
    pub params: Arc<MintParams>,
    pub sweep_interval: Duration,
}

/// One sweep: scan candidates, attempt to expire each. Returns how many
/// rows this pass actually expired.
pub fn sweep_once<D: MintDatabase>(db: &D, params: &MintParams) -> MintResult<u64> {
    let now = now_ms();
    let grace = params.confirming_grace_ms;
    let mut reaped = 0;
    for id in db.get_expired_candidates(now, grace)? {
        match db.expire_reservation(id, now, grace)? {
            ExpireOutcome::Expired(token) => {
                info!(%id, %token, "expired stale reservation, identifier recycled");
                reaped += 1;
            }
            ExpireOutcome::LostRace(status) => {
                debug!(%id, ?status, "expiry raced a finalizing transition");
            }
            ExpireOutcome::NotReapable => {}
        }
    }
    Ok(reaped)
}

/// Long-running sweeper task. Exits cleanly on shutdown signal.
pub async fn reservation_sweeper_task<D: MintDatabase>(
    ctx: SweeperContext<D>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(ctx.sweep_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(interval = ?ctx.sweep_interval, "reservation sweeper started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sweep_once(ctx.db.as_ref(), &ctx.params) {
                    Ok(0) => {}
                    Ok(n) => debug!(reaped = %n, "sweep pass complete"),
                    // One bad pass is not fatal; the next tick retries.
                    Err(e) => error!(err = %e, "sweep pass failed"),
                }
            }
            res = shutdown_rx.changed() => {
                if res.is_err() || *shutdown_rx.borrow() {
                    info!("reservation sweeper shutting down");
                    return Ok(());
                }
            }
        }
    }
}
