//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own fake tools, SoundFont
//! directory and temp directory.

use super::constants::*;
use super::fixtures::create_test_toolchain;
use legato_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use legato_server::synthesis::{SynthesisPipeline, SynthesisPipelineConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance backed by a real pipeline running fake tools
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Directory the pipeline searches for SoundFonts
    pub soundfont_dir: PathBuf,

    /// Directory holding the pipeline's intermediate files
    pub temp_dir: PathBuf,

    // Private fields - keep resources alive until drop
    _toolchain_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port with the default fake toolchain
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawns a test server whose render stage gives up after a short timeout
    pub async fn spawn_with_short_render_timeout() -> Self {
        Self::spawn_with(|config| {
            config.fluidsynth_timeout = Duration::from_millis(SHORT_RENDER_TIMEOUT_MS);
        })
        .await
    }

    /// Spawns a test server after letting the caller adjust the pipeline config
    ///
    /// # Panics
    ///
    /// Panics if:
    /// - The fake toolchain cannot be created
    /// - Port binding fails
    /// - Server doesn't become ready within timeout
    pub async fn spawn_with(customize: impl FnOnce(&mut SynthesisPipelineConfig)) -> Self {
        let (toolchain_dir, mut pipeline_config) =
            create_test_toolchain().expect("Failed to create fake toolchain");
        customize(&mut pipeline_config);

        let soundfont_dir = pipeline_config.soundfont_dir.clone();
        let temp_dir = pipeline_config
            .temp_dir
            .clone()
            .expect("Fake toolchain always sets a temp dir");

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            host: "127.0.0.1".to_string(),
            port,
            ..Default::default()
        };
        let app = make_app(config, Arc::new(SynthesisPipeline::new(pipeline_config)))
            .expect("Failed to build app");

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            soundfont_dir,
            temp_dir,
            _toolchain_dir: toolchain_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Removes every SoundFont the pipeline could use
    pub fn remove_soundfonts(&self) {
        for entry in std::fs::read_dir(&self.soundfont_dir).expect("Failed to list soundfonts") {
            let path = entry.expect("Failed to read soundfont entry").path();
            std::fs::remove_file(&path).expect("Failed to remove soundfont");
        }
    }

    /// Number of intermediate or output files left in the pipeline temp directory
    pub fn temp_file_count(&self) -> usize {
        std::fs::read_dir(&self.temp_dir)
            .expect("Failed to list temp dir")
            .count()
    }

    /// Waits for the server to become ready by polling the / endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => {
                    // Server is ready
                    return;
                }
                _ => {
                    // Server not ready yet, wait and retry
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Send shutdown signal
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
        // TempDir will be cleaned up automatically
    }
}
