use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use tinytemplate::{format_unescaped, TinyTemplate};

use crate::slurm::settings::SlurmSettings;

/// Rendered SBATCH directive script
///
/// SLURM job options are parsed by sbatch from `#SBATCH` headers [before executable commands](https://slurm.schedmd.com/sbatch.html#SECTION_DESCRIPTION).
/// Some are set from the job configuration:
/// - job name
/// - job time
/// - number of GPUs
/// - node constraint and node list (only written when configured)
///
/// Other options are fixed: one node, one task, 4 CPUs, 20000 MB RAM, the preemptible `killable`
/// partition and a USR1 signal 120 seconds before the time limit. stdout and stderr both go to
/// `slurm.out` in the job working directory.
pub struct DirectiveScript {
    pub content: String,
}

/// Rendering context for the directive script
#[derive(Serialize)]
struct DirectiveContext<'a> {
    job_name: &'a str,
    log_path: String,
    time: &'a str,
    n_gpus: u32,
    constraint: Option<&'a str>,
    nodelist: Option<&'a str>,
    launcher: String,
}

impl DirectiveScript {
    /// Render the directive script using TinyTemplate
    pub fn render(settings: &SlurmSettings, work_dir: &Path, launcher: &Path) -> Result<DirectiveScript> {
        /// included directive template
        static DIRECTIVE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/directive.txt"));
        let mut tt = TinyTemplate::new();
        // paths and constraints are shell text, not HTML
        tt.set_default_formatter(&format_unescaped);
        tt.add_template("directive", DIRECTIVE)?;

        let context = DirectiveContext {
            job_name: &settings.run_name,
            log_path: work_dir.join("slurm.out").display().to_string(),
            time: &settings.time,
            n_gpus: settings.n_gpus,
            constraint: settings.constraint.as_deref(),
            nodelist: settings.nodelist.as_deref(),
            launcher: launcher.display().to_string(),
        };

        let content = tt.render("directive", &context).context("Rendering directive script")?;
        Ok(DirectiveScript { content })
    }

    /// Write the directive script to disk, replacing any existing file
    pub fn write(&self, out_path: &Path) -> Result<PathBuf> {
        if out_path.exists() {
            warn!("{} already exists and will be overwritten", out_path.display());
        }
        info!("Writing directive script to {}", out_path.display());
        fs::write(out_path, &self.content).with_context(|| format!("Can't write {}", out_path.display()))?;
        Ok(out_path.to_path_buf())
    }
}
