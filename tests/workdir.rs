//! Test fixture helper: creates a scratch directory, writes fixture
//! CSVs into it, and runs a `Query` straight through
//! [`sidx::execute_with_config`].

use std::path::{Path, PathBuf};

use sidx::{EngineConfig, EngineResult, Query};

pub struct Workdir {
    dir: tempfile::TempDir,
}

impl Workdir {
    pub fn new(name: &str) -> Workdir {
        let dir = tempfile::Builder::new()
            .prefix(&format!("sidx-test-{name}-"))
            .tempdir()
            .unwrap();
        Workdir { dir }
    }

    /// Writes `rows` (header row included) as CSV to `filename` inside
    /// the scratch directory and returns its path.
    pub fn create(&self, filename: &str, rows: Vec<Vec<String>>) -> PathBuf {
        let path = self.dir.path().join(filename);
        let mut writer = csv::WriterBuilder::new().from_path(&path).unwrap();
        for row in rows {
            writer.write_record(&row).unwrap();
        }
        writer.flush().unwrap();
        path
    }

    pub fn path(&self, filename: &str) -> PathBuf {
        self.dir.path().join(filename)
    }

    /// Runs `query` with `config` and returns the captured CSV output
    /// as a string.
    pub fn run(&self, query: &Query, config: &EngineConfig) -> EngineResult<String> {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        sidx::execute_with_config(query, config, &mut writer)?;
        Ok(String::from_utf8(writer.into_inner().unwrap()).unwrap())
    }

    pub fn build_index(&self, path: &Path, block_size: u32) -> sidx::index::Index {
        sidx::index::build(path, block_size, sidx::index::TypeInference::On).unwrap()
    }
}
