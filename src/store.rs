use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::fs;

use crate::{
    types::YearRecord,
    utils::{winners_file, year_file},
};

/// Reads and writes the per-year snapshots under one data directory.
#[derive(Debug, Clone)]
pub struct DataStore {
    dir: PathBuf,
}

impl DataStore {
    pub async fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .context(format!("could not create data directory {:?}", dir))?;
        Ok(DataStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn write_year(&self, year: u16, record: &YearRecord) -> anyhow::Result<PathBuf> {
        let path = year_file(&self.dir, year);
        let contents = serde_json::to_string(record)?;
        fs::write(&path, contents)
            .await
            .context(format!("could not write {:?}", path))?;
        Ok(path)
    }

    pub async fn read_year(&self, year: u16) -> anyhow::Result<YearRecord> {
        let path = year_file(&self.dir, year);
        let contents = fs::read_to_string(&path)
            .await
            .context(format!("could not read {:?}", path))?;
        let record = serde_json::from_str(&contents)
            .context(format!("{:?} is not a year record", path))?;
        Ok(record)
    }

    pub async fn write_winners(&self, year: u16, records: &[String]) -> anyhow::Result<PathBuf> {
        let path = winners_file(&self.dir, year);
        let contents = serde_json::to_string(records)?;
        fs::write(&path, contents)
            .await
            .context(format!("could not write {:?}", path))?;
        Ok(path)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::ListingKind;
    use rand::{distributions::Alphanumeric, thread_rng, Rng};

    macro_rules! aw {
        ($e:expr) => {
            tokio_test::block_on($e)
        };
    }

    fn tmp_dir(name: &str) -> PathBuf {
        let suffix: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(11)
            .map(char::from)
            .collect();
        PathBuf::from(format!("/tmp/harvester-{}-{}", name, suffix))
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tmp_dir("create").join("nested");
        let store = aw!(DataStore::open(&dir)).unwrap();
        assert!(store.dir().exists());
        std::fs::remove_dir_all(dir.parent().unwrap()).unwrap();
    }

    #[test]
    fn year_file_only_holds_captured_listings() {
        let dir = tmp_dir("year");
        let store = aw!(DataStore::open(&dir)).unwrap();

        let mut record = YearRecord::default();
        record.set(ListingKind::Finalists, r#"[{"nid":"1"}]"#.into());
        let path = aw!(store.write_year(1990, &record)).unwrap();
        assert_eq!(path, dir.join("1990.json"));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let keys = raw.as_object().unwrap().keys().collect::<Vec<_>>();
        assert_eq!(keys, vec!["finalists"]);
        assert_eq!(aw!(store.read_year(1990)).unwrap(), record);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn winners_file_is_overwritten() {
        let dir = tmp_dir("winners");
        let store = aw!(DataStore::open(&dir)).unwrap();

        aw!(store.write_winners(2000, &["{\"a\":1}".to_string(), "{}".to_string()])).unwrap();
        let path = aw!(store.write_winners(2000, &[])).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "[]");

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_year_file_is_an_error() {
        let dir = tmp_dir("missing");
        let store = aw!(DataStore::open(&dir)).unwrap();
        assert!(aw!(store.read_year(1917)).is_err());
        std::fs::remove_dir_all(dir).unwrap();
    }
}
