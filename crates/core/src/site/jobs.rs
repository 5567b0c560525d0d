//! Install and uninstall batch jobs.

use std::path::Path;

use super::{CondorSelector, ExecutionService, Site};
use crate::condor::{BatchJob, GatewayOverride};
use crate::config::Config;

pub(crate) const INSTALL_DIR: &str = "install";
pub(crate) const UNINSTALL_DIR: &str = "uninstall";

/// Staging jobs must finish within this many minutes.
const STAGING_MAX_TIME: u32 = 5;

/// Build the job that installs the pilot software on the site.
pub(crate) fn install_job(
    config: &Config,
    site_dir: &Path,
    site: &Site,
    credential: Vec<u8>,
) -> BatchJob {
    let mut job = staging_job(
        config,
        &site_dir.join(INSTALL_DIR),
        site,
        &config.executables.install,
    );

    job.flag("-installPath", &site.install_path);
    match &site.condor {
        CondorSelector::Version(version) => job.flag("-condorVersion", version),
        CondorSelector::Package(package) => job.flag("-condorPackage", package),
    };
    if let Some(rls) = &config.executables.rls {
        job.flag("-rls", rls);
    }
    if let Some(mapper) = &config.executables.mapper {
        job.flag("-mapper", mapper);
    }

    job.credential = Some(credential);
    job
}

/// Build the job that removes the pilot software from the site.
pub(crate) fn uninstall_job(
    config: &Config,
    site_dir: &Path,
    site: &Site,
    credential: Option<Vec<u8>>,
) -> BatchJob {
    let mut job = staging_job(
        config,
        &site_dir.join(UNINSTALL_DIR),
        site,
        &config.executables.uninstall,
    );
    job.flag("-installPath", &site.install_path);
    job.credential = credential;
    job
}

fn staging_job(config: &Config, dir: &Path, site: &Site, executable: &str) -> BatchJob {
    let service = &site.staging_service;
    let mut job = BatchJob::new(dir, service.service_type, &service.contact, executable);
    job.gateway_override = staging_override(service);

    job.environment = site.environment.clone();
    job.env("CORRAL_SERVER", &config.orchestrator.service_url)
        .env("CORRAL_SITE_ID", site.id.to_string())
        .env("CORRAL_SITE_NAME", &site.name)
        .env("CORRAL_USERNAME", &site.local_username);

    job.output_files.push("status".to_string());
    job
}

/// Project, queue and a short time limit in the gateway's own dialect.
pub(crate) fn staging_override(service: &ExecutionService) -> Option<GatewayOverride> {
    if service.service_type.uses_rsl() {
        let mut rsl = String::new();
        if let Some(project) = &service.project {
            rsl.push_str(&format!("(project={})", project));
        }
        if let Some(queue) = &service.queue {
            rsl.push_str(&format!("(queue={})", queue));
        }
        rsl.push_str(&format!("(maxTime={})", STAGING_MAX_TIME));
        Some(GatewayOverride::Rsl(rsl))
    } else if service.service_type.uses_xml() {
        let mut xml = String::new();
        if let Some(project) = &service.project {
            xml.push_str(&format!("<project>{}</project>", project));
        }
        if let Some(queue) = &service.queue {
            xml.push_str(&format!("<queue>{}</queue>", queue));
        }
        xml.push_str(&format!("<maxTime>{}</maxTime>", STAGING_MAX_TIME));
        Some(GatewayOverride::Xml(xml))
    } else {
        None
    }
}
