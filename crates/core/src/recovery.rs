//! Startup reconciliation of persisted state with what is on disk.
//!
//! Runs once before requests are accepted: every site first, then every
//! glidein. A failure recovering one entity marks it FAILED and never stops
//! the others.

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::error::CorralError;
use crate::events::{Failure, GlideinEventCode};
use crate::glidein::{GlideinMachine, GlideinState};
use crate::metrics;
use crate::site::{SiteMachine, SiteState, INSTALL_DIR, UNINSTALL_DIR};

/// Outcome of one recovery pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub sites: usize,
    pub glideins: usize,
    pub failed: usize,
}

pub async fn recover(ctx: &Context) -> Result<RecoveryReport, CorralError> {
    let mut report = RecoveryReport::default();

    let site_ids = ctx.store.list_site_ids()?;
    info!("Recovering {} sites", site_ids.len());
    let results = join_all(site_ids.iter().map(|&id| recover_site(ctx, id))).await;
    report.sites = results.len();
    report.failed += results.iter().filter(|ok| !**ok).count();

    let glidein_ids = ctx.store.list_glidein_ids()?;
    info!("Recovering {} glideins", glidein_ids.len());
    let results = join_all(glidein_ids.iter().map(|&id| recover_glidein(ctx, id))).await;
    report.glideins = results.len();
    report.failed += results.iter().filter(|ok| !**ok).count();

    info!(
        "Recovery complete: {} sites, {} glideins, {} failed",
        report.sites, report.glideins, report.failed
    );
    Ok(report)
}

async fn recover_site(ctx: &Context, id: i64) -> bool {
    let handle = match ctx.registry.find_site(id) {
        Ok(handle) => handle,
        Err(CorralError::NotFound { .. }) => {
            debug!("Site {} is already gone", id);
            return true;
        }
        Err(e) => {
            error!("Unable to load site {} for recovery: {}", id, e);
            metrics::RECOVERY_FAILURES.with_label_values(&["site"]).inc();
            return false;
        }
    };
    let mut machine = handle.lock().await;
    // A cascading delete may have run while we waited for the lock.
    if !ctx.registry.is_site_cached(id) {
        return true;
    }
    info!("Recovering site {} in state {}", id, machine.site().state);

    match recover_site_state(ctx, &mut machine).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Recovery of site {} failed: {}", id, e.detail());
            metrics::RECOVERY_FAILURES.with_label_values(&["site"]).inc();
            let failure = Failure::new("State recovery failed").with_detail(e.detail());
            if let Err(e) = machine.fail(ctx, failure, Utc::now()) {
                error!("Site {} left for the next recovery: {}", id, e);
            }
            false
        }
    }
}

async fn recover_site_state(ctx: &Context, machine: &mut SiteMachine) -> Result<(), CorralError> {
    match machine.site().state {
        SiteState::New => Ok(()),
        SiteState::Failed => {
            // Dependents may have missed SITE_FAILED if the process died right after the save.
            machine.notify_glideins(ctx, GlideinEventCode::SiteFailed);
            Ok(())
        }
        SiteState::Staging => {
            if machine.job_files(ctx, INSTALL_DIR).has_log() {
                machine.reattach(ctx, INSTALL_DIR).await
            } else if machine.has_credential(ctx).await? {
                machine.submit_install(ctx).await
            } else {
                Err(CorralError::Recovery(
                    "Install job log and credential are both missing".to_string(),
                ))
            }
        }
        SiteState::Removing => {
            if machine.job_files(ctx, UNINSTALL_DIR).has_log() {
                machine.reattach(ctx, UNINSTALL_DIR).await
            } else if machine.has_credential(ctx).await? {
                machine.submit_uninstall(ctx).await
            } else {
                Err(CorralError::Recovery(
                    "Uninstall job log and credential are both missing".to_string(),
                ))
            }
        }
        SiteState::Ready => {
            machine.notify_glideins(ctx, GlideinEventCode::SiteReady);
            Ok(())
        }
        SiteState::Exiting => {
            let glideins = ctx.store.glidein_ids(machine.id())?;
            if glideins.is_empty() {
                machine.update_state(ctx, SiteState::Removing, "Removing site", None, Utc::now())?;
                machine.submit_uninstall(ctx).await
            } else {
                machine.notify_glideins(ctx, GlideinEventCode::Remove);
                Ok(())
            }
        }
        SiteState::Deleted => machine.delete(ctx, Utc::now()).await,
    }
}

async fn recover_glidein(ctx: &Context, id: i64) -> bool {
    let handle = match ctx.registry.find_glidein(id) {
        Ok(handle) => handle,
        Err(CorralError::NotFound { .. }) => {
            debug!("Glidein {} is already gone", id);
            return true;
        }
        Err(e) => {
            error!("Unable to load glidein {} for recovery: {}", id, e);
            metrics::RECOVERY_FAILURES.with_label_values(&["glidein"]).inc();
            return false;
        }
    };
    let mut machine = handle.lock().await;
    // A cascading delete may have run while we waited for the lock.
    if !ctx.registry.is_glidein_cached(id) {
        return true;
    }
    info!("Recovering glidein {} in state {}", id, machine.glidein().state);

    match recover_glidein_state(ctx, &mut machine).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Recovery of glidein {} failed: {}", id, e.detail());
            metrics::RECOVERY_FAILURES.with_label_values(&["glidein"]).inc();
            let failure = Failure::new("State recovery failed").with_detail(e.detail());
            if let Err(e) = machine.fail(ctx, failure, Utc::now()) {
                error!("Glidein {} left for the next recovery: {}", id, e);
            }
            false
        }
    }
}

async fn recover_glidein_state(
    ctx: &Context,
    machine: &mut GlideinMachine,
) -> Result<(), CorralError> {
    match machine.glidein().state {
        GlideinState::New | GlideinState::Waiting | GlideinState::Finished | GlideinState::Failed => {
            Ok(())
        }
        GlideinState::Submitted | GlideinState::Queued | GlideinState::Running => {
            if machine.job_files(ctx).has_log() {
                machine.reattach(ctx).await
            } else if machine.has_credential(ctx).await? {
                machine.submit_job(ctx).await
            } else {
                Err(CorralError::Recovery(
                    "Glidein job log and credential are both missing".to_string(),
                ))
            }
        }
        GlideinState::Removing => {
            if machine.job_files(ctx).has_log() {
                machine.reattach(ctx).await?;
                machine.cancel_job(ctx).await;
                Ok(())
            } else {
                machine.delete(ctx, Utc::now()).await
            }
        }
        GlideinState::Deleted => machine.delete(ctx, Utc::now()).await,
    }
}
