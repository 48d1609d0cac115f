use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use tinytemplate::{format_unescaped, TinyTemplate};

/// Name of the persisted config, the training entry point gets it as `--config-name`
pub static CONFIG_NAME: &str = "run_config";

/// Rendered launcher script
///
/// Starts the training entry point with the persisted config directory and name, and pins the
/// training run's own output directory to the same place.
pub struct LauncherScript {
    pub content: String,
}

/// Rendering context for the launcher
#[derive(Serialize)]
struct LauncherContext {
    entry_point: String,
    run_dir: String,
    config_name: &'static str,
}

impl LauncherScript {
    pub fn render(entry_point: &Path, run_dir: &Path) -> Result<LauncherScript> {
        /// included launcher template
        static LAUNCHER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/launcher.txt"));
        let mut tt = TinyTemplate::new();
        tt.set_default_formatter(&format_unescaped);
        tt.add_template("launcher", LAUNCHER)?;

        let context = LauncherContext {
            entry_point: entry_point.display().to_string(),
            run_dir: run_dir.display().to_string(),
            config_name: CONFIG_NAME,
        };
        let content = tt.render("launcher", &context).context("Rendering launcher script")?;
        Ok(LauncherScript { content })
    }

    pub fn write(&self, out_path: &Path) -> Result<PathBuf> {
        info!("Writing launcher script to {}", out_path.display());
        fs::write(out_path, &self.content).with_context(|| format!("Can't write {}", out_path.display()))?;
        Ok(out_path.to_path_buf())
    }
}

/// Write the serialised config into an existing run directory
pub fn write_run_config(run_dir: &Path, yaml: &str) -> Result<PathBuf> {
    let out_path = run_dir.join(format!("{}.yaml", CONFIG_NAME));
    info!("Writing resolved config to {}", out_path.display());
    fs::write(&out_path, yaml).with_context(|| format!("Can't write {}", out_path.display()))?;
    Ok(out_path)
}

/// Persist the config, then write a launcher pointing at it
pub fn create_run_script_and_config(run_dir: &Path, yaml: &str, launcher_path: &Path, entry_point: &Path) -> Result<PathBuf> {
    let config = write_run_config(run_dir, yaml)?;
    LauncherScript::render(entry_point, run_dir)?.write(launcher_path)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn launcher_points_at_run_dir_and_config_name() {
        let script = LauncherScript::render(Path::new("/code/train.py"), Path::new("/jobs/a/run")).unwrap();
        assert_eq!(
            script.content,
            "python /code/train.py  --config-dir /jobs/a/run --config-name run_config hydra.run.dir=/jobs/a/run\n"
        );
    }

    #[test]
    fn writes_config_and_launcher() {
        let dir = tempdir().unwrap();
        let run_dir = dir.path().join("run");
        fs::create_dir(&run_dir).unwrap();
        let launcher = dir.path().join("run.sh");

        let config = create_run_script_and_config(&run_dir, "a: 1\n", &launcher, Path::new("/code/train.py")).unwrap();

        assert_eq!(config, run_dir.join("run_config.yaml"));
        assert_eq!(fs::read_to_string(&config).unwrap(), "a: 1\n");
        let content = fs::read_to_string(&launcher).unwrap();
        assert!(content.contains(&format!("--config-dir {}", run_dir.display())));
        assert!(content.contains("--config-name run_config"));
    }

    #[test]
    fn missing_run_dir_is_an_error() {
        let dir = tempdir().unwrap();
        let result = write_run_config(&dir.path().join("nope"), "a: 1\n");
        assert!(result.is_err());
    }
}
