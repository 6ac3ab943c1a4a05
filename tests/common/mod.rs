// Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use coverme::{UploadResult, Vault};
use indexmap::IndexMap;

pub fn fixed_now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 9)
        .unwrap()
        .and_hms_opt(7, 5, 1)
        .unwrap()
}

pub fn fixed_ctx() -> coverme::RunContext {
    let env = BTreeMap::from([("STAGE".to_string(), "prod".to_string())]);
    coverme::RunContext::fixed(fixed_now(), env)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Error,
    Unsuccessful,
}

/// One recorded upload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub vault: String,
    pub name: String,
    pub archive: PathBuf,
    pub file_existed: bool,
}

/// In-memory vault that records every call in a shared log.
#[derive(Debug, Clone)]
pub struct FakeVault {
    key: String,
    behavior: Behavior,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Vault for FakeVault {
    async fn upload(&self, archive: &Path, upload_name: Option<&str>) -> anyhow::Result<UploadResult> {
        let name = coverme::vault::remote_name(archive, upload_name);
        self.calls.lock().unwrap().push(Call {
            vault: self.key.clone(),
            name: name.clone(),
            archive: archive.to_path_buf(),
            file_existed: archive.is_file(),
        });
        match self.behavior {
            Behavior::Succeed => Ok(UploadResult::ok([("key", name)])),
            Behavior::Error => anyhow::bail!("simulated outage"),
            Behavior::Unsuccessful => Ok(UploadResult::failed()),
        }
    }
}

/// Fake vaults for `keys`, all writing to one call log.
pub fn fake_vaults(
    keys: &[(&str, Behavior)],
) -> (IndexMap<String, FakeVault>, Arc<Mutex<Vec<Call>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let vaults = keys
        .iter()
        .map(|(key, behavior)| {
            (
                key.to_string(),
                FakeVault {
                    key: key.to_string(),
                    behavior: *behavior,
                    calls: Arc::clone(&calls),
                },
            )
        })
        .collect();
    (vaults, calls)
}

/// Stand-in for pg_dump/mysqldump: writes a small dump to the `--file=` or
/// `--result-file=` target, and exits 1 when the database is named `broken`.
#[cfg(unix)]
pub fn fake_dump_tool(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake_dump");
    fs::write(
        &path,
        r#"#!/bin/sh
out=""
for arg in "$@"; do
  case "$arg" in
    --file=*) out="${arg#--file=}" ;;
    --result-file=*) out="${arg#--result-file=}" ;;
    broken) exit 1 ;;
  esac
done
printf 'CREATE TABLE items (id integer);\n' > "$out"
"#,
    )
    .unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Entries left in a directory.
pub fn entries(dir: &Path) -> usize {
    fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
