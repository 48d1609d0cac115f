use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde_yaml::Value;

use crate::slurm::directive::DirectiveScript;
use crate::slurm::launcher::create_run_script_and_config;
use crate::slurm::settings::SlurmSettings;
use crate::workdir::WorkingDirectory;

/// The files written for one job
///
/// `directive` is what gets submitted to SLURM via sbatch. It runs `launcher`, which reads
/// `config` from the `run/` directory next to it.
#[derive(Debug)]
pub struct JobFiles {
    pub directive: PathBuf,
    pub launcher: PathBuf,
    pub config: PathBuf,
}

/// A resolved config ready to be written out as a SLURM job
pub struct JobRequest<'a> {
    pub config: &'a Value,
    pub settings: SlurmSettings,
}

impl<'a> JobRequest<'a> {
    /// Checks the `slurm` section, nothing is written if it's missing or invalid
    pub fn new(config: &'a Value) -> Result<JobRequest<'a>> {
        let settings = SlurmSettings::from_config(config)?;
        Ok(JobRequest { config, settings })
    }

    /// Write the directive script, the persisted config and the launcher into `wd`
    ///
    /// `run/` must not exist yet, a second job in the same working directory is refused.
    pub fn create(&self, wd: &WorkingDirectory, entry_point: &Path) -> Result<JobFiles> {
        info!("Creating job {} in working directory {}", self.settings.run_name, wd.path.display());
        let yaml = serde_yaml::to_string(self.config).context("Serialising resolved config")?;
        wd.create()?;

        let directive = wd.path.join("slurm.sh");
        let launcher = wd.path.join("run.sh");
        DirectiveScript::render(&self.settings, &wd.path, &launcher)?.write(&directive)?;

        let run_dir = wd.path.join("run");
        fs::create_dir(&run_dir).with_context(|| format!("Can't create run directory {}", run_dir.display()))?;
        let config = create_run_script_and_config(&run_dir, &yaml, &launcher, entry_point)?;

        Ok(JobFiles { directive, launcher, config })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::config::error::ConfigError;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                found.extend(files_in(&path));
            } else {
                found.push(path);
            }
        }
        found.sort();
        found
    }

    #[test]
    fn missing_slurm_section_writes_nothing() {
        let dir = tempdir().unwrap();
        let wd = WorkingDirectory { path: dir.path().join("job") };
        let cfg = yaml("model: {layers: 2}");

        let err = JobRequest::new(&cfg)
            .and_then(|job| job.create(&wd, Path::new("train.py")))
            .err()
            .unwrap();

        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::MissingSlurm)));
        assert_eq!(err.to_string(), "add slurm.run_name, slurm.n_gpus, slurm.time");
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn invalid_slurm_section_writes_nothing() {
        let dir = tempdir().unwrap();
        let wd = WorkingDirectory { path: dir.path().join("job") };
        let cfg = yaml("slurm: {run_name: exp1, n_gpus: many, time: '1:00:00'}");

        let result = JobRequest::new(&cfg).and_then(|job| job.create(&wd, Path::new("train.py")));

        assert!(result.is_err());
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn creates_exactly_three_files() {
        let dir = tempdir().unwrap();
        let wd = WorkingDirectory { path: dir.path().join("job") };
        let cfg = yaml("slurm: {run_name: exp1, n_gpus: 4, time: '12:00:00'}\nmodel: {layers: 2}\n");

        let files = JobRequest::new(&cfg).unwrap().create(&wd, Path::new("/code/train.py")).unwrap();

        let run_dir = wd.path.join("run");
        assert_eq!(files.directive, wd.path.join("slurm.sh"));
        assert_eq!(files.launcher, wd.path.join("run.sh"));
        assert_eq!(files.config, run_dir.join("run_config.yaml"));
        let mut expected = vec![files.config.clone(), files.launcher.clone(), files.directive.clone()];
        expected.sort();
        assert_eq!(files_in(&wd.path), expected);

        let directive = fs::read_to_string(&files.directive).unwrap();
        assert!(directive.contains("#SBATCH --job-name=exp1\n"));
        assert!(directive.contains("#SBATCH --time=12:00:00\n"));
        assert!(directive.contains("#SBATCH --gpus=4\n"));
        assert!(directive.contains(&format!("#SBATCH --output={}\n", wd.path.join("slurm.out").display())));
        assert!(directive.ends_with(&format!("srun sh {}\n", files.launcher.display())));

        let launcher = fs::read_to_string(&files.launcher).unwrap();
        assert!(launcher.contains(&format!("--config-dir {} --config-name run_config", run_dir.display())));
    }

    #[test]
    fn persisted_config_parses_back_to_the_same_tree() {
        let dir = tempdir().unwrap();
        let wd = WorkingDirectory { path: dir.path().to_path_buf() };
        let cfg = yaml(
            "slurm: {run_name: '${model.name}', n_gpus: 1, time: '1:00:00', constraint: null}\n\
             model: {name: gpt, dropout: 0.1, layers: [64, 64], tied: true}\n",
        );

        let files = JobRequest::new(&cfg).unwrap().create(&wd, Path::new("train.py")).unwrap();

        let written: Value = serde_yaml::from_str(&fs::read_to_string(files.config).unwrap()).unwrap();
        assert_eq!(written, cfg);
    }

    #[test]
    fn existing_run_directory_is_refused() {
        let dir = tempdir().unwrap();
        let wd = WorkingDirectory { path: dir.path().to_path_buf() };
        fs::create_dir(dir.path().join("run")).unwrap();
        let cfg = yaml("slurm: {run_name: exp1, n_gpus: 1, time: '1:00:00'}");
        assert!(JobRequest::new(&cfg).unwrap().create(&wd, Path::new("train.py")).is_err());
    }
}
