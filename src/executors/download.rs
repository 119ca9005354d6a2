//! Download executor.
//!
//! Validates the source URL, composes a contained destination path, streams
//! the body to a `.part` file, and atomically renames it into place. The
//! result blob records `{url, path, bytes, contentType}`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::traits::{ErrorCode, ExecEnv, ExecError, ExecResult, JobExecutor};
use crate::database::models::Job;
use crate::utils::filename::sanitize_filename;
use crate::utils::path::safe_join;

const USER_AGENT: &str = "asd-server";
const WRITE_BUFFER: usize = 128 * 1024;
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_DESTINATION: &str = "videos";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DownloadParams {
    url: String,
    filename: String,
    path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadResult {
    url: String,
    path: String,
    bytes: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    content_type: String,
}

pub struct DownloadExecutor {
    client: reqwest::Client,
}

impl DownloadExecutor {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for DownloadExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Compose the destination path from the params, the output root, and the
/// URL-derived filename.
fn resolve_destination(
    base_dir: &str,
    params: &DownloadParams,
    url: &Url,
    job_id: &str,
) -> ExecResult<PathBuf> {
    let mut filename = sanitize_filename(&params.filename);
    if filename.is_empty() {
        let from_url = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default();
        filename = sanitize_filename(from_url);
    }
    if filename.is_empty() {
        filename = job_id.to_string();
    }

    let rel = params.path.trim();
    if rel.is_empty() {
        return Ok(Path::new(base_dir).join(filename));
    }

    let mut dst = safe_join(Path::new(base_dir), rel)
        .map_err(|e| ExecError::invalid_params(e.to_string()))?;
    if rel.ends_with('/') || dst == Path::new(base_dir) {
        dst = dst.join(filename);
    }
    Ok(dst)
}

#[async_trait]
impl JobExecutor for DownloadExecutor {
    async fn execute(
        &self,
        _cancel: &CancellationToken,
        job: &Job,
        env: &ExecEnv,
    ) -> ExecResult<()> {
        let params: DownloadParams =
            serde_json::from_value(job.params_value()).unwrap_or_default();

        if params.url.trim().is_empty() {
            return Err(ExecError::invalid_params("missing params.url"));
        }
        let url = Url::parse(params.url.trim())
            .map_err(|_| ExecError::invalid_params("invalid params.url"))?;
        if url.host_str().is_none() {
            return Err(ExecError::invalid_params("invalid params.url"));
        }
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ExecError::invalid_params("unsupported url scheme"));
        }

        let base_dir = {
            let trimmed = env.destination.trim();
            if trimmed.is_empty() { DEFAULT_DESTINATION } else { trimmed }
        };
        let dst_path = resolve_destination(base_dir, &params, &url, &job.id)?;

        if env.is_canceled().await? {
            return Ok(());
        }

        if let Some(parent) = dst_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ExecError::new(
                    ErrorCode::IoError,
                    format!("failed to create destination directory: {e}"),
                )
            })?;
        }

        let tmp_path = PathBuf::from(format!("{}.part", dst_path.display()));
        let result = self
            .stream_to_file(&url, &tmp_path, &dst_path, env)
            .await;

        match result {
            Ok(Some(download)) => {
                env.update_result(&serde_json::to_value(&download).map_err(|e| {
                    ExecError::new(ErrorCode::ExecutorError, e.to_string())
                })?)
                .await?;
                env.update_progress(1.0).await?;
                Ok(())
            }
            // Canceled mid-stream: the partial file is gone, nothing to record.
            Ok(None) => Ok(()),
            Err(err) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                Err(err)
            }
        }
    }
}

impl DownloadExecutor {
    /// Stream the response body into `tmp_path`, then rename into place.
    /// Returns `None` when the job was canceled mid-transfer.
    async fn stream_to_file(
        &self,
        url: &Url,
        tmp_path: &Path,
        dst_path: &Path,
        env: &ExecEnv,
    ) -> ExecResult<Option<DownloadResult>> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| {
                ExecError::new(ErrorCode::NetworkError, format!("http request failed: {e}"))
            })?;

        if resp.status().as_u16() >= 400 {
            return Err(ExecError::new(
                ErrorCode::HttpStatus,
                format!("http error: {}", resp.status()),
            ));
        }

        let total = resp.content_length();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let file = tokio::fs::File::create(tmp_path).await.map_err(|e| {
            ExecError::new(ErrorCode::IoError, format!("failed to create temp file: {e}"))
        })?;
        let mut out = BufWriter::with_capacity(WRITE_BUFFER, file);

        let mut stream = resp.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_tick = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                ExecError::new(
                    ErrorCode::NetworkError,
                    format!("failed while reading http response: {e}"),
                )
            })?;

            out.write_all(&chunk).await.map_err(|e| {
                ExecError::new(ErrorCode::IoError, format!("failed to write temp file: {e}"))
            })?;
            downloaded += chunk.len() as u64;

            // Cancellation poll and progress report share a throttle tick so
            // the row is not re-read on every chunk.
            if last_tick.elapsed() >= PROGRESS_INTERVAL {
                last_tick = Instant::now();

                if env.is_canceled().await? {
                    drop(out);
                    let _ = tokio::fs::remove_file(tmp_path).await;
                    return Ok(None);
                }

                if let Some(total) = total.filter(|t| *t > 0) {
                    let progress =
                        (downloaded as f64 / total as f64).clamp(0.0, 0.999);
                    env.update_progress(progress).await?;
                }
            }
        }

        out.flush().await.map_err(|e| {
            ExecError::new(ErrorCode::IoError, format!("failed to flush temp file: {e}"))
        })?;
        drop(out);

        tokio::fs::rename(tmp_path, dst_path).await.map_err(|e| {
            ExecError::new(
                ErrorCode::IoError,
                format!("failed to move temp file into place: {e}"),
            )
        })?;

        Ok(Some(DownloadResult {
            url: url.to_string(),
            path: dst_path.to_string_lossy().into_owned(),
            bytes: downloaded,
            content_type,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(url: &str, filename: &str, path: &str) -> DownloadParams {
        DownloadParams {
            url: url.to_string(),
            filename: filename.to_string(),
            path: path.to_string(),
        }
    }

    #[test]
    fn filename_falls_back_to_url_then_job_id() {
        let url = Url::parse("https://cdn.example.com/videos/ep-01.mp4").unwrap();
        let p = params("https://cdn.example.com/videos/ep-01.mp4", "", "");
        let dst = resolve_destination("videos", &p, &url, "job-1").unwrap();
        assert_eq!(dst, Path::new("videos/ep-01.mp4"));

        let url = Url::parse("https://cdn.example.com/").unwrap();
        let p = params("https://cdn.example.com/", "", "");
        let dst = resolve_destination("videos", &p, &url, "job-1").unwrap();
        assert_eq!(dst, Path::new("videos/job-1"));
    }

    #[test]
    fn explicit_path_is_contained() {
        let url = Url::parse("https://cdn.example.com/a.mp4").unwrap();
        let p = params("https://cdn.example.com/a.mp4", "", "subscriptions/s1/ep-01.mp4");
        let dst = resolve_destination("videos", &p, &url, "job-1").unwrap();
        assert_eq!(dst, Path::new("videos/subscriptions/s1/ep-01.mp4"));
    }

    #[test]
    fn directory_path_gets_filename_appended() {
        let url = Url::parse("https://cdn.example.com/a.mp4").unwrap();
        let p = params("https://cdn.example.com/a.mp4", "named.mp4", "shows/x/");
        let dst = resolve_destination("videos", &p, &url, "job-1").unwrap();
        assert_eq!(dst, Path::new("videos/shows/x/named.mp4"));
    }

    #[test]
    fn traversal_is_invalid_params() {
        let url = Url::parse("https://cdn.example.com/a.mp4").unwrap();
        let p = params("https://cdn.example.com/a.mp4", "", "../escape");
        let err = resolve_destination("videos", &p, &url, "job-1").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }
}
