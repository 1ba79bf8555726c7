use std::io::{Read, Write};
use std::sync::OnceLock;

use const_format::concatcp;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;

use crate::github::{Release, ReleaseProvider};
use crate::{Error, Result};

const USER_AGENT: &str = concatcp!(
    "meshtastic-upgrade/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/meshtastic/firmware)"
);
const GITHUB_API: &str = "https://api.github.com/repos";
const DOWNLOAD_CHUNK: usize = 1024 * 1024;

pub const FIRMWARE_REPO: &str = "meshtastic/firmware";

static CLIENT_CELL: OnceLock<Client> = OnceLock::new();

fn get_client() -> Result<&'static Client> {
    if let Some(client) = CLIENT_CELL.get() {
        return Ok(client);
    }

    let client = Client::builder().user_agent(USER_AGENT).timeout(None).build()?;
    Ok(CLIENT_CELL.get_or_init(|| client))
}

/// Releases of a GitHub repository, read through the REST API.
pub struct GithubReleases {
    base: String,
    client: Client,
}

impl GithubReleases {
    pub fn new(repo: &str) -> Result<Self> {
        Ok(Self {
            base: format!("{GITHUB_API}/{repo}"),
            client: get_client()?.clone(),
        })
    }

    fn api_get(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.base);
        log::debug!("GET {url}");
        self.client
            .get(url)
            .header("Accept", "application/vnd.github+json")
    }
}

impl ReleaseProvider for GithubReleases {
    fn list_releases(&self, count: u8) -> Result<Vec<Release>> {
        let response = self.api_get(&format!("/releases?per_page={count}")).send()?;

        if !response.status().is_success() {
            return Err(Error::HttpStatus {
                status: response.status(),
                url: response.url().to_string(),
            });
        }

        Ok(response.json()?)
    }

    fn release_by_tag(&self, tag: &str) -> Result<Option<Release>> {
        let response = self.api_get(&format!("/releases/tags/{tag}")).send()?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::HttpStatus {
                status: response.status(),
                url: response.url().to_string(),
            });
        }

        Ok(Some(response.json()?))
    }

    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .header("Accept", "application/octet-stream")
            .send()?;

        if !response.status().is_success() {
            return Err(Error::HttpStatus {
                status: response.status(),
                url: url.to_string(),
            });
        }

        let total_size = response.content_length().unwrap_or(0);
        let mut written: u64 = 0;
        let mut buffer = vec![0; DOWNLOAD_CHUNK];
        let mut last_decile = 0;

        loop {
            let bytes_read = response.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            sink.write_all(&buffer[..bytes_read])?;
            written += bytes_read as u64;

            if total_size > 0 {
                let decile = written * 10 / total_size;
                if decile > last_decile {
                    last_decile = decile;
                    log::debug!("Downloaded {written}/{total_size} bytes");
                }
            }
        }

        Ok(written)
    }
}
