use crate::config::IngestionConfig;
use crate::errors::{AppResult, FetchError};
use crate::utils::redact_url;
use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

/// Build the HTTP client used for guide downloads
pub fn build_client(config: &IngestionConfig) -> AppResult<Client> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .build()?;
    Ok(client)
}

/// Stream `url` into `destination`, replacing any previous file.
///
/// Returns the number of bytes written. The body is written through a
/// temporary sibling file so a failed download never leaves a truncated
/// guide in place of the last good one.
pub async fn download_to_file(
    client: &Client,
    url: &str,
    destination: &Path,
    buffer_size: usize,
) -> AppResult<u64> {
    let display_url = redact_url(url);
    info!("Downloading guide from {}", display_url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(&display_url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Http {
            url: display_url,
            status: status.as_u16(),
        }
        .into());
    }

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let partial = destination.with_extension("part");
    let result = write_body(response, &partial, destination, buffer_size, &display_url).await;
    let written = match result {
        Ok(written) => written,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };

    debug!("Wrote {} bytes to {}", written, destination.display());
    Ok(written)
}

async fn write_body(
    response: reqwest::Response,
    partial: &Path,
    destination: &Path,
    buffer_size: usize,
    display_url: &str,
) -> AppResult<u64> {
    let file = tokio::fs::File::create(partial).await?;
    let mut writer = BufWriter::with_capacity(buffer_size.max(1024), file);
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::from_reqwest(display_url, e))?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    writer.flush().await?;
    drop(writer);
    tokio::fs::rename(partial, destination).await?;
    Ok(written)
}
