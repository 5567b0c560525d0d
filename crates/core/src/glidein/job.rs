//! The pilot batch job.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::path::Path;

use super::Glidein;
use crate::condor::{BatchJob, GatewayOverride};
use crate::config::Config;
use crate::site::{ExecutionService, Site};

pub(crate) const JOB_DIR: &str = "job";

/// Name of the user-supplied Condor configuration inside the job directory.
pub(crate) const CONDOR_CONFIG_FILE: &str = "glidein_condor_config";

static DEBUG_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ ,;:]+").unwrap());

/// Build the pilot job for `glidein` on `site`.
///
/// When the glidein carries its own Condor configuration, the caller writes
/// it to [`CONDOR_CONFIG_FILE`] in the job directory before submitting.
pub(crate) fn pilot_job(
    config: &Config,
    glidein_dir: &Path,
    site: &Site,
    glidein: &Glidein,
    credential: Vec<u8>,
) -> BatchJob {
    let service = &site.glidein_service;
    let mut job = BatchJob::new(
        glidein_dir.join(JOB_DIR),
        service.service_type,
        &service.contact,
        &config.executables.start,
    );
    job.gateway_override = pilot_override(glidein, service);

    job.input_files.push(config.executables.run.clone());
    match glidein.condor_config {
        Some(_) => job.input_files.push(CONDOR_CONFIG_FILE.to_string()),
        None => job
            .input_files
            .push(config.executables.glidein_condor_config.clone()),
    }
    job.output_files.push("status".to_string());

    job.environment = site.environment.clone();
    job.env("CORRAL_SERVER", &config.orchestrator.service_url)
        .env("CORRAL_SITE_ID", site.id.to_string())
        .env("CORRAL_SITE_NAME", &site.name)
        .env("CORRAL_GLIDEIN_ID", glidein.id.to_string())
        .env("CORRAL_USERNAME", &glidein.local_username);

    job.flag("-installPath", &site.install_path)
        .flag("-localPath", &site.local_path)
        .flag("-condorHost", &glidein.condor_host)
        // Leave the pilot a minute to exit before the local scheduler kills it.
        .flag("-wallTime", glidein.wall_time.saturating_sub(1));
    if let Some(broker) = &glidein.gcb_broker {
        job.flag("-gcbBroker", broker);
    }
    if let Some(address) = &glidein.ccb_address {
        job.flag("-ccbAddress", address);
    }
    if glidein.idle_time > 0 {
        job.flag("-idleTime", glidein.idle_time);
    }
    if let Some(debug) = &glidein.condor_debug {
        for level in DEBUG_SEPARATOR.split(debug).filter(|l| !l.is_empty()) {
            job.flag("-debug", level);
        }
    }
    job.flag("-numCpus", glidein.num_cpus);
    if let Some(high) = glidein.highport.filter(|p| *p > 0) {
        job.flag("-highport", high);
    }
    if let Some(low) = glidein.lowport.filter(|p| *p > 0) {
        job.flag("-lowport", low);
    }

    job.credential = Some(credential);
    job
}

/// The user's override followed by every sizing key it does not already set.
pub(crate) fn pilot_override(glidein: &Glidein, service: &ExecutionService) -> Option<GatewayOverride> {
    let mut text = glidein.rsl.clone().unwrap_or_default();

    if service.service_type.uses_rsl() {
        let mut append = |key: &str, value: String| {
            if !text.contains(&format!("({}=", key)) {
                text.push_str(&format!("({}={})", key, value));
            }
        };
        if let Some(project) = &service.project {
            append("project", project.clone());
        }
        if let Some(queue) = &service.queue {
            append("queue", queue.clone());
        }
        append("hostCount", glidein.host_count.to_string());
        append("count", glidein.count.to_string());
        append("jobType", "multiple".to_string());
        append("maxTime", glidein.wall_time.to_string());
        Some(GatewayOverride::Rsl(text))
    } else if service.service_type.uses_xml() {
        let mut append = |key: &str, value: String| {
            if !text.contains(&format!("<{}>", key)) {
                text.push_str(&format!("<{key}>{}</{key}>", value));
            }
        };
        append("count", glidein.count.to_string());
        append("hostCount", glidein.host_count.to_string());
        if let Some(project) = &service.project {
            append("project", project.clone());
        }
        if let Some(queue) = &service.queue {
            append("queue", queue.clone());
        }
        append("maxTime", glidein.wall_time.to_string());
        append("jobType", "multiple".to_string());
        Some(GatewayOverride::Xml(text))
    } else {
        None
    }
}
