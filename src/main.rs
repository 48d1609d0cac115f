use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use crate::config::compose::ConfigSource;
use crate::config::interpolation;
use crate::config::overrides::Override;
use crate::slurm::job::JobRequest;
use crate::slurm::submit::send_job_and_report;
use crate::workdir::{from_launch_dir, WorkingDirectory};

mod config;
mod slurm;
mod workdir;

/// Render a SLURM job from a layered YAML config and submit it with sbatch
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing the primary config and config groups
    #[arg(long, default_value = "configs")]
    config_dir: PathBuf,

    /// Primary config file name, without .yaml
    #[arg(long, default_value = "config")]
    config_name: String,

    /// Job working directory (default: hydra.run.dir, a fresh outputs/<date>/<time> directory)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Training entry point started by the launcher script
    #[arg(long, default_value = "train.py")]
    entry_point: PathBuf,

    /// Job submission command
    #[arg(long, default_value = "sbatch")]
    sbatch: String,

    /// Write the job files but don't submit anything
    #[arg(long)]
    dry_run: bool,

    /// Print the resolved config and exit
    #[arg(long)]
    cfg: bool,

    /// With --cfg, resolve ${...} interpolations before printing
    #[arg(long, requires = "cfg")]
    resolve: bool,

    /// Config overrides: key=value, +key=value, ++key=value, ~key
    overrides: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    info!("terve! preparing a SLURM job :)");
    let args = Args::parse();

    let launch_dir = env::current_dir().context("Can't read current directory")?;
    let overrides = args
        .overrides
        .iter()
        .map(|o| o.parse::<Override>())
        .collect::<Result<Vec<_>, _>>()?;

    let source = ConfigSource::new(launch_dir.join(&args.config_dir), &args.config_name);
    let composed = source.compose(&overrides)?;
    let cfg = composed.job;

    if args.cfg {
        let shown = match args.resolve {
            true => interpolation::resolve(&cfg)?,
            false => cfg,
        };
        print!("{}", serde_yaml::to_string(&shown)?);
        return Ok(());
    }

    let job = JobRequest::new(&cfg)?;
    let wd = match &args.work_dir {
        Some(path) => WorkingDirectory::pinned(&launch_dir, path),
        None => WorkingDirectory::pinned(&launch_dir, &composed.run_dir),
    };
    let files = job.create(&wd, &from_launch_dir(&launch_dir, &args.entry_point))?;
    info!("Launcher {}, config {}", files.launcher.display(), files.config.display());
    println!("{}", files.directive.display());

    match args.dry_run {
        true => info!("--dry-run set, not submitting {}", files.directive.display()),
        false => {
            send_job_and_report(&args.sbatch, &files.directive)?;
        }
    }

    Ok(())
}
