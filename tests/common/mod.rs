use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        Ok(Self { temp_dir })
    }

    /// Get the temp directory path for fixtures and outputs
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write a file below the temp directory, creating parent directories
    pub fn write(&self, rel: &str, content: &str) -> Result<PathBuf> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Write an executable shell script
    pub fn write_script(&self, rel: &str, content: &str) -> Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let path = self.write(rel, content)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    /// Standard metadata tree used by most tests
    pub fn manifest_tree(&self) -> Result<PathBuf> {
        self.write("tree/package.list", "curl\n")?;
        self.write("tree/server/ubuntu/focal/package.list", "curl\nwget\n\n")?;
        self.write("tree/server/debian/bullseye/package.list", "nginx\n")?;
        Ok(self.path().join("tree"))
    }

    /// Config pointing ssh and scp at `ssh_script`
    pub fn config_for(&self, ssh_script: &Path) -> Result<PathBuf> {
        let script = ssh_script.display();
        self.write(
            "aptpack.toml",
            &format!(
                "[remote]\nhost = \"builder\"\nuser = \"echelon\"\nssh_program = \"{script}\"\nscp_program = \"{script}\"\n"
            ),
        )
    }
}
