use std::fs;
use std::{env, path::PathBuf};

use rand::Rng;
use rstest::fixture;

/// A scratch directory for data files, removed on drop
pub struct TmpDir {
    temp_dir: PathBuf,
}

impl TmpDir {
    pub fn get_path(&self) -> &PathBuf {
        &self.temp_dir
    }

    pub fn create_file_name(&self, name: &str, content: Option<&str>) -> PathBuf {
        let path = self.temp_dir.join(name);
        fs::write(&path, content.unwrap_or("")).expect("failed to make temp file");
        path
    }
}

impl Drop for TmpDir {
    fn drop(&mut self) {
        _ = fs::remove_dir_all(&self.temp_dir);
    }
}

#[fixture]
pub fn tmp_dir() -> TmpDir {
    let mut rng = rand::thread_rng();
    let rand_name: u32 = rng.gen();
    let temp_dir = env::temp_dir().join(format!("apptp-test-{}", rand_name));
    fs::create_dir_all(&temp_dir).expect("failed to make temp directory");
    TmpDir { temp_dir }
}
