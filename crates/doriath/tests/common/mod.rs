use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn write_config(&self, content: &str) {
        fs::write(self.root.path().join("doriath.yml"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_dockerfile(&self, dir: &str, content: &str) {
        let dir_path = self.root.path().join(dir);
        fs::create_dir_all(&dir_path).unwrap();
        fs::write(dir_path.join("Dockerfile"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }
}
