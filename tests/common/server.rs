//! Test server management.
//!
//! Spawns and manages mdsyncd instances for integration testing.

use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

/// A test server instance.
pub struct TestServer {
    child: Child,
    port: u16,
    _data_dir: TempDir,
}

impl TestServer {
    /// Spawn a server with default sync settings.
    pub async fn spawn(port: u16) -> anyhow::Result<Self> {
        Self::spawn_with_dispatch(port, "concurrent").await
    }

    /// Spawn a server using the given dispatch mode (`concurrent` or `ordered`).
    pub async fn spawn_with_dispatch(port: u16, dispatch: &str) -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;

        let config_path = data_dir.path().join("config.toml");
        let config_content = format!(
            r#"
[server]
name = "test.server"
metrics_port = 0

[listen]
address = "127.0.0.1:{port}"
redirect_location = "/index"

[sync]
dispatch = "{dispatch}"
outbound_queue = 64
"#
        );
        std::fs::write(&config_path, config_content)?;

        let child = Command::new(env!("CARGO_BIN_EXE_mdsyncd"))
            .arg(&config_path)
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .spawn()?;

        let server = Self {
            child,
            port,
            _data_dir: data_dir,
        };

        // Wait for server to start listening
        server.wait_until_ready().await?;

        Ok(server)
    }

    /// Wait until the server is accepting connections.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..30 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server failed to start within 3 seconds")
    }

    /// Get the server address.
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Upgrade URL for a document.
    pub fn url(&self, doc_name: &str, doc_id: i64) -> String {
        format!(
            "ws://{}/ws?DocName={}&DocId={}",
            self.address(),
            doc_name,
            doc_id
        )
    }

    /// Create a new test client bound to a document on this server.
    pub async fn connect(
        &self,
        doc_name: &str,
        doc_id: i64,
    ) -> anyhow::Result<super::client::TestClient> {
        super::client::TestClient::connect(&self.url(doc_name, doc_id), doc_id).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Kill the server process
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
