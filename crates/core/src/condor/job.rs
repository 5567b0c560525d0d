//! Batch job description and its on-disk layout.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::types::{EnvironmentVariable, GatewayOverride, GridType};
use super::CondorError;

const LOG_FILE: &str = "log";
const ERROR_FILE: &str = "error";
const OUTPUT_FILE: &str = "output";
const SUBMIT_FILE: &str = "submit";
const JOBID_FILE: &str = "jobid";
const CREDENTIAL_FILE: &str = "credential";

/// Files Condor reads and writes for one job, all under a single directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFiles {
    dir: PathBuf,
}

impl JobFiles {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            dir: std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    pub fn error(&self) -> PathBuf {
        self.dir.join(ERROR_FILE)
    }

    pub fn output(&self) -> PathBuf {
        self.dir.join(OUTPUT_FILE)
    }

    pub fn submit_file(&self) -> PathBuf {
        self.dir.join(SUBMIT_FILE)
    }

    pub fn jobid_file(&self) -> PathBuf {
        self.dir.join(JOBID_FILE)
    }

    pub fn credential(&self) -> PathBuf {
        self.dir.join(CREDENTIAL_FILE)
    }

    pub fn has_log(&self) -> bool {
        self.log().exists()
    }

    /// Persist the scheduler-assigned id so a restarted process can reattach.
    pub async fn save_job_id(&self, job_id: &str) -> Result<(), CondorError> {
        tokio::fs::write(self.jobid_file(), format!("{}\n", job_id)).await?;
        Ok(())
    }

    pub async fn read_job_id(&self) -> Result<String, CondorError> {
        let contents = match tokio::fs::read_to_string(self.jobid_file()).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CondorError::MissingJobId {
                    dir: self.dir.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let job_id = contents.trim();
        if job_id.is_empty() {
            return Err(CondorError::MissingJobId {
                dir: self.dir.clone(),
            });
        }
        Ok(job_id.to_string())
    }

    /// Remove the job directory and everything in it. Missing is fine.
    pub async fn remove(&self) -> Result<(), CondorError> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// One submission unit handed to Condor-G.
///
/// Built fresh for every submission attempt. The job directory is kept after
/// a failure so the log and error files can be inspected.
#[derive(Debug, Clone)]
pub struct BatchJob {
    files: JobFiles,
    pub grid_type: GridType,
    pub grid_contact: String,
    pub executable: String,
    /// Whether the executable lives on the submit host and must be transferred.
    pub local_executable: bool,
    pub arguments: Vec<String>,
    pub environment: Vec<EnvironmentVariable>,
    pub gateway_override: Option<GatewayOverride>,
    pub requirements: Option<String>,
    pub remote_directory: Option<String>,
    /// Delegated proxy written next to the submit file before submission.
    pub credential: Option<Vec<u8>>,
    pub input_files: Vec<String>,
    pub output_files: Vec<String>,
    pub job_id: Option<String>,
}

impl BatchJob {
    pub fn new(
        dir: impl AsRef<Path>,
        grid_type: GridType,
        grid_contact: impl Into<String>,
        executable: impl Into<String>,
    ) -> Self {
        Self {
            files: JobFiles::new(dir),
            grid_type,
            grid_contact: grid_contact.into(),
            executable: executable.into(),
            local_executable: true,
            arguments: Vec::new(),
            environment: Vec::new(),
            gateway_override: None,
            requirements: None,
            remote_directory: None,
            credential: None,
            input_files: Vec::new(),
            output_files: Vec::new(),
            job_id: None,
        }
    }

    pub fn files(&self) -> &JobFiles {
        &self.files
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.arguments.push(arg.into());
        self
    }

    /// Push a `-flag value` pair.
    pub fn flag(&mut self, flag: &str, value: impl ToString) -> &mut Self {
        self.arguments.push(flag.to_string());
        self.arguments.push(value.to_string());
        self
    }

    pub fn env(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.environment.push(EnvironmentVariable::new(name, value));
        self
    }

    /// Render the Condor submit description for this job.
    pub fn render_descriptor(&self) -> String {
        let mut out = String::new();
        let files = &self.files;

        out.push_str("universe = grid\n");
        let _ = writeln!(
            out,
            "grid_resource = {} {}",
            self.grid_type.as_str(),
            self.grid_contact
        );
        out.push_str("stream_input = False\n");
        out.push_str("stream_output = False\n");
        out.push_str("stream_error = False\n");
        out.push_str("transfer_input = True\n");
        out.push_str("transfer_output = True\n");
        out.push_str("transfer_error = True\n");

        match &self.gateway_override {
            Some(GatewayOverride::Rsl(rsl)) => {
                let _ = writeln!(out, "globus_rsl = {}", rsl);
            }
            Some(GatewayOverride::Xml(xml)) => {
                let _ = writeln!(out, "globus_xml = {}", xml);
            }
            None => {}
        }

        if self.credential.is_some() {
            let _ = writeln!(out, "x509userproxy = {}", files.credential().display());
        }

        let _ = writeln!(out, "executable = {}", self.executable);
        if !self.local_executable {
            out.push_str("transfer_executable = false\n");
        }

        if !self.arguments.is_empty() {
            let args: Vec<String> = self.arguments.iter().map(|a| quote_argument(a)).collect();
            let _ = writeln!(out, "arguments = \"{}\"", args.join(" "));
        }

        if !self.environment.is_empty() {
            out.push_str("environment = ");
            for var in &self.environment {
                let _ = write!(out, "{}={};", var.name, var.value);
            }
            out.push('\n');
        }

        let _ = writeln!(out, "log = {}", files.log().display());
        let _ = writeln!(out, "output = {}", files.output().display());
        let _ = writeln!(out, "error = {}", files.error().display());
        out.push_str("notification = Never\n");

        if let Some(requirements) = &self.requirements {
            let _ = writeln!(out, "requirements = {}", requirements);
        }
        if let Some(remote) = &self.remote_directory {
            let _ = writeln!(out, "remote_initialdir = {}", remote);
        }
        let _ = writeln!(out, "initialdir = {}", files.dir().display());

        if !self.input_files.is_empty() {
            let _ = writeln!(out, "transfer_input_files = {}", self.input_files.join(","));
        }
        if !self.output_files.is_empty() {
            let _ = writeln!(
                out,
                "transfer_output_files = {}",
                self.output_files.join(",")
            );
        }
        if !self.input_files.is_empty() || !self.output_files.is_empty() {
            out.push_str("when_to_transfer_output = ON_EXIT\n");
        }

        out.push_str("queue\n");
        out
    }
}

/// Quote one argument using Condor's new-style argument syntax.
fn quote_argument(arg: &str) -> String {
    let escaped = arg.replace('"', "\"\"");
    if escaped.is_empty() || escaped.chars().any(|c| c.is_whitespace() || c == '\'') {
        format!("'{}'", escaped.replace('\'', "''"))
    } else {
        escaped
    }
}

/// Split a new-style argument string back into its arguments.
fn split_arguments(raw: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut started = false;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' if in_quotes && chars.peek() == Some(&'\'') => {
                chars.next();
                current.push('\'');
            }
            '\'' => {
                in_quotes = !in_quotes;
                started = true;
            }
            '"' if chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
                started = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if started {
                    args.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if started {
        args.push(current);
    }
    args
}

/// A parsed submit description, used to inspect what was written.
#[derive(Debug, Clone, Default)]
pub struct SubmitDescription {
    entries: Vec<(String, String)>,
    queued: bool,
}

impl SubmitDescription {
    pub fn parse(text: &str) -> Self {
        let mut description = SubmitDescription::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line == "queue" || line.starts_with("queue ") {
                description.queued = true;
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                description
                    .entries
                    .push((key.trim().to_string(), value.trim().to_string()));
            }
        }
        description
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// A comma-separated value split into its items.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn arguments(&self) -> Vec<String> {
        self.get("arguments")
            .map(|v| split_arguments(v.trim_matches('"')))
            .unwrap_or_default()
    }

    pub fn environment(&self) -> Vec<EnvironmentVariable> {
        self.get("environment")
            .map(|v| {
                v.split(';')
                    .filter_map(|pair| pair.split_once('='))
                    .map(|(name, value)| EnvironmentVariable::new(name, value))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the description ends with a `queue` statement.
    pub fn is_queued(&self) -> bool {
        self.queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> BatchJob {
        let mut job = BatchJob::new(
            "/var/corral/glidein-7/job",
            GridType::Gt2,
            "grid.example.org/jobmanager-pbs",
            "/opt/corral/glidein_start",
        );
        job.flag("-installPath", "/home/user/glidein")
            .flag("-wallTime", 59)
            .arg("-debug")
            .arg("D_FULLDEBUG D_NETWORK");
        job.env("CORRAL_SITE_ID", "3").env("CORRAL_GLIDEIN_ID", "7");
        job
    }

    #[test]
    fn test_transfer_lists_round_trip() {
        let mut job = sample_job();
        job.input_files = vec![
            "/opt/corral/glidein_run".to_string(),
            "/opt/corral/glidein_condor_config".to_string(),
        ];
        job.output_files = vec!["status".to_string()];

        let text = job.render_descriptor();
        assert!(text.contains(
            "transfer_input_files = /opt/corral/glidein_run,/opt/corral/glidein_condor_config\n"
        ));
        assert!(text.contains("transfer_output_files = status\n"));
        assert!(text.contains("when_to_transfer_output = ON_EXIT\n"));
        assert!(text.ends_with("queue\n"));

        let parsed = SubmitDescription::parse(&text);
        assert_eq!(parsed.list("transfer_input_files"), job.input_files);
        assert_eq!(parsed.list("transfer_output_files"), job.output_files);
        assert!(parsed.is_queued());
    }

    #[test]
    fn test_no_transfer_directive_without_files() {
        let text = sample_job().render_descriptor();
        assert!(!text.contains("transfer_input_files"));
        assert!(!text.contains("when_to_transfer_output"));
    }

    #[test]
    fn test_header_and_paths() {
        let text = sample_job().render_descriptor();
        let parsed = SubmitDescription::parse(&text);
        assert_eq!(parsed.get("universe"), Some("grid"));
        assert_eq!(
            parsed.get("grid_resource"),
            Some("gt2 grid.example.org/jobmanager-pbs")
        );
        assert_eq!(parsed.get("log"), Some("/var/corral/glidein-7/job/log"));
        assert_eq!(parsed.get("error"), Some("/var/corral/glidein-7/job/error"));
        assert_eq!(parsed.get("initialdir"), Some("/var/corral/glidein-7/job"));
        assert_eq!(parsed.get("notification"), Some("Never"));
        assert!(parsed.get("x509userproxy").is_none());
        assert!(parsed.get("transfer_executable").is_none());
    }

    #[test]
    fn test_arguments_and_environment_round_trip() {
        let job = sample_job();
        let parsed = SubmitDescription::parse(&job.render_descriptor());
        assert_eq!(parsed.arguments(), job.arguments);
        assert_eq!(parsed.environment(), job.environment);
        assert!(job
            .render_descriptor()
            .contains("environment = CORRAL_SITE_ID=3;CORRAL_GLIDEIN_ID=7;\n"));
    }

    #[test]
    fn test_optional_lines() {
        let mut job = sample_job();
        job.local_executable = false;
        job.credential = Some(b"proxy".to_vec());
        job.requirements = Some("Arch == \"X86_64\"".to_string());
        job.remote_directory = Some("/scratch".to_string());
        job.gateway_override = Some(GatewayOverride::Rsl("(queue=debug)".to_string()));

        let parsed = SubmitDescription::parse(&job.render_descriptor());
        assert_eq!(parsed.get("transfer_executable"), Some("false"));
        assert_eq!(
            parsed.get("x509userproxy"),
            Some("/var/corral/glidein-7/job/credential")
        );
        assert_eq!(parsed.get("requirements"), Some("Arch == \"X86_64\""));
        assert_eq!(parsed.get("remote_initialdir"), Some("/scratch"));
        assert_eq!(parsed.get("globus_rsl"), Some("(queue=debug)"));
        assert!(parsed.get("globus_xml").is_none());
    }

    #[test]
    fn test_quote_argument() {
        assert_eq!(quote_argument("plain"), "plain");
        assert_eq!(quote_argument("two words"), "'two words'");
        assert_eq!(quote_argument("it's"), "'it''s'");
        assert_eq!(quote_argument(""), "''");
    }

    #[tokio::test]
    async fn test_job_id_marker() {
        let dir = tempfile::tempdir().unwrap();
        let files = JobFiles::new(dir.path());

        assert!(matches!(
            files.read_job_id().await,
            Err(CondorError::MissingJobId { .. })
        ));

        files.save_job_id("42.0").await.unwrap();
        assert_eq!(files.read_job_id().await.unwrap(), "42.0");

        files.remove().await.unwrap();
        assert!(!dir.path().exists());
        files.remove().await.unwrap();
    }
}
