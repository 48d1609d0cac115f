use std::path::Path;
use std::process::{Command, ExitStatus};

use anyhow::{Context, Result};
use log::{info, warn};

/// Captured result of running sbatch
pub struct Submission {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Submission {
    /// SLURM job id from `Submitted batch job <id>`, if sbatch accepted the job
    pub fn job_id(&self) -> Option<&str> {
        self.stdout
            .lines()
            .find_map(|line| line.trim().strip_prefix("Submitted batch job "))
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Run `<sbatch> <directive script>` and print what it said
///
/// The directive path is the only argument. A rejected job is not an error here: sbatch's stderr
/// is printed as is and the exit status is logged. Failing to start the process at all is.
pub fn send_job_and_report(sbatch: &str, directive: &Path) -> Result<Submission> {
    println!("sending {}", directive.display());

    let mut command = Command::new(sbatch);
    let cmd = command.arg(directive);
    info!("Running sbatch process");
    info!("{:?}", &cmd);
    let output = cmd.output().with_context(|| format!("Failed to execute {sbatch}"))?;

    let submission = Submission {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    println!("output:");
    println!("{}", submission.stdout);
    println!("err:");
    println!("{}", submission.stderr);

    if !submission.status.success() {
        warn!("{sbatch} exited with {}", submission.status);
    }
    match submission.job_id() {
        Some(id) => info!("SLURM job id: {id}"),
        None => warn!("No job id in {sbatch} output"),
    }

    Ok(submission)
}
