//! Saves the raw body of every URL listed in `urls.txt`.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use url::Url;

use crate::addons::contract::{Addon, AddonContext, AddonError};

pub const URL_LIST_FILE: &str = "urls.txt";
pub const OUTPUT_DIR: &str = "snapshots";

const MIN_PAUSE_MS: u64 = 1000;
const MAX_PAUSE_MS: u64 = 3000;

/// Fetches each listed URL in order with a polite pause in between.
/// Timeouts skip the URL; any other failure stops the add-on.
#[derive(Debug, Default)]
pub struct SnapshotAddon {
    saved: usize,
    skipped: usize,
}

impl SnapshotAddon {
    pub fn saved(&self) -> usize {
        self.saved
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[async_trait]
impl Addon for SnapshotAddon {
    async fn execute(&mut self, ctx: &AddonContext) -> Result<(), AddonError> {
        let list = ctx.directory().join(URL_LIST_FILE);
        let targets = read_url_list(&list)?;
        if targets.is_empty() {
            log::warn!("{} lists no urls; nothing to archive", list.display());
            return Ok(());
        }

        let output = ctx.directory().join(OUTPUT_DIR);
        fs::create_dir_all(&output)?;

        for (index, target) in targets.iter().enumerate() {
            if index > 0 {
                ctx.wait_ms_between(MIN_PAUSE_MS, MAX_PAUSE_MS).await?;
            }

            let response = match ctx.fetch(target).await {
                Ok(response) => response,
                Err(err) if err.is_timeout() => {
                    log::warn!("skipping {target}: {err}");
                    self.skipped += 1;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let file = output.join(snapshot_file_name(index, &response.url));
            fs::write(&file, &response.body)?;
            log::info!("{} {} -> {}", response.status, target, file.display());
            self.saved += 1;
        }

        log::info!("snapshot finished: {} saved, {} skipped", self.saved, self.skipped);
        Ok(())
    }
}

fn read_url_list(path: &Path) -> Result<Vec<String>, AddonError> {
    let raw = fs::read_to_string(path)
        .map_err(|err| AddonError::message(format!("cannot read {}: {err}", path.display())))?;
    Ok(parse_url_list(&raw))
}

fn parse_url_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}

fn snapshot_file_name(index: usize, url: &Url) -> String {
    let host: String = url
        .host_str()
        .unwrap_or("unknown")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("{:03}-{host}.html", index + 1)
}
