//! Model artifact handling: cached download, executable bits, and launching a
//! local llamafile server that speaks the OpenAI chat-completions protocol.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures_util::StreamExt;
use indicatif::ProgressBar;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("process error: {0}")]
    Process(String),
    #[error("artifact not found: {0}")]
    MissingArtifact(PathBuf),
}

/// A downloadable file, cached locally under its URL's filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Artifact {
    pub name: &'static str,
    pub url: &'static str,
}

impl Artifact {
    /// Last path segment of the URL, used as the cache filename.
    pub fn filename(&self) -> &'static str {
        self.url
            .split('?')
            .next()
            .unwrap_or(self.url)
            .rsplit('/')
            .next()
            .unwrap_or(self.url)
    }
}

/// Self-contained model llamafile; running it serves the model locally.
pub const MODEL: Artifact = Artifact {
    name: "mistral-7b-instruct-v0.2.Q3_K_M",
    url: "https://huggingface.co/jartine/Mistral-7B-Instruct-v0.2-llamafile/resolve/main/mistral-7b-instruct-v0.2.Q3_K_M.llamafile",
};

/// Standalone llamafile server binary, for weights-only model files.
pub const SERVER: Artifact = Artifact {
    name: "llamafile-0.6.1",
    url: "https://github.com/Mozilla-Ocho/llamafile/releases/download/0.6.1/llamafile-0.6.1",
};

/// Local artifact cache directory.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("stylemask")
        .join("models")
}

/// Download an artifact into `cache_dir/<filename>` with a progress bar sized
/// from the `content-length` header. Creates the cache directory if needed and
/// returns the destination path.
pub async fn download_artifact(
    client: &reqwest::Client,
    artifact: &Artifact,
    cache_dir: &Path,
) -> Result<PathBuf, ServeError> {
    tokio::fs::create_dir_all(cache_dir).await?;
    let dest = cache_dir.join(artifact.filename());

    log::info!("downloading {} -> {}", artifact.url, dest.display());

    let response = client.get(artifact.url).send().await?.error_for_status()?;
    let total = response.content_length().unwrap_or(0);

    let bar = ProgressBar::new(total);

    let mut file = tokio::fs::File::create(&dest).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        bar.inc(chunk.len() as u64);
    }
    file.flush().await?;
    bar.finish();

    Ok(dest)
}

/// Download an artifact unless it is already cached.
///
/// Returns the cached path and whether a download actually happened.
pub async fn ensure_artifact(
    client: &reqwest::Client,
    artifact: &Artifact,
    cache_dir: &Path,
) -> Result<(PathBuf, bool), ServeError> {
    let dest = cache_dir.join(artifact.filename());
    if dest.exists() {
        return Ok((dest, false));
    }

    let dest = download_artifact(client, artifact, cache_dir).await?;
    Ok((dest, true))
}

/// Remove every cached artifact.
pub async fn clear_cache(cache_dir: &Path) -> Result<(), ServeError> {
    if cache_dir.exists() {
        tokio::fs::remove_dir_all(cache_dir).await?;
    }
    Ok(())
}

/// Set the owner-executable bit so a downloaded llamafile can run.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<(), ServeError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)?;
    let mut permissions = metadata.permissions();
    permissions.set_mode(permissions.mode() | 0o100);
    std::fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<(), ServeError> {
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeResult {
    pub success: bool,
    pub exit_code: Option<i32>,
}

/// Handle to a running local model server.
pub struct ServerHandle {
    /// Combined stdout/stderr lines from the server process.
    pub output_rx: mpsc::Receiver<String>,
    pub done: tokio::task::JoinHandle<Result<ServeResult, ServeError>>,
}

/// Launch a cached llamafile as a local server, detached from stdin.
///
/// The llamafile exposes an OpenAI-compatible API on its default port;
/// `--nobrowser` keeps it from opening a browser window.
pub async fn serve_artifact(path: &Path) -> Result<ServerHandle, ServeError> {
    if !path.exists() {
        return Err(ServeError::MissingArtifact(path.to_path_buf()));
    }

    make_executable(path)?;

    // llamafiles are polyglot scripts; `sh` runs them regardless of the
    // host's binfmt configuration.
    let mut cmd = Command::new("sh");
    cmd.arg(path)
        .arg("--nobrowser")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| ServeError::Process(e.to_string()))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (tx, rx) = mpsc::channel(200);

    if let Some(stdout) = stdout {
        let tx_stdout = tx.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if tx_stdout.send(line).await.is_err() {
                    break;
                }
            }
        });
    }

    if let Some(stderr) = stderr {
        let tx_stderr = tx.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if tx_stderr.send(line).await.is_err() {
                    break;
                }
            }
        });
    }

    let done = tokio::spawn(async move {
        let status = child
            .wait()
            .await
            .map_err(|e| ServeError::Process(e.to_string()))?;
        Ok(ServeResult {
            success: status.success(),
            exit_code: status.code(),
        })
    });

    Ok(ServerHandle {
        output_rx: rx,
        done,
    })
}
