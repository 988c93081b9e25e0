use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use podwatch::cluster::{ChannelEventSource, InMemoryCluster};
use podwatch::config::Config;
use podwatch::controller::AlertController;
use podwatch::status::InMemoryStatusReporter;
use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[allow(dead_code)]
pub fn temp_yaml_file(name: &str, contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let path = temp_dir.path().join(name);
    fs::write(&path, contents).expect("failed to write yaml file");
    (temp_dir, path)
}

/// Config with short deadlines and fast reconnects
#[allow(dead_code)]
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.watcher.lookup_timeout_secs = 2;
    config.watcher.reconnect.initial_backoff_ms = 10;
    config.watcher.reconnect.max_backoff_ms = 50;
    config.watcher.reconnect.max_attempts = 0;
    config.notifier.timeout_secs = 5;
    config
}

/// Mock webhook answering every POST with `status`
#[allow(dead_code)]
pub async fn webhook(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

/// Controller wired to in-memory collaborators
#[allow(dead_code)]
pub struct Pipeline {
    pub source: Arc<ChannelEventSource>,
    pub cluster: Arc<InMemoryCluster>,
    pub status: Arc<InMemoryStatusReporter>,
    pub controller: Arc<AlertController>,
}

#[allow(dead_code)]
pub fn pipeline() -> Pipeline {
    let source = Arc::new(ChannelEventSource::new());
    let cluster = Arc::new(InMemoryCluster::new());
    let status = Arc::new(InMemoryStatusReporter::new());
    let controller = Arc::new(AlertController::new(
        &fast_config(),
        source.clone(),
        cluster.clone(),
        status.clone(),
    ));
    Pipeline {
        source,
        cluster,
        status,
        controller,
    }
}

/// Poll `condition` until it holds or five seconds pass
#[allow(dead_code)]
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Number of requests the mock server has received
#[allow(dead_code)]
pub async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|r| r.len())
        .unwrap_or_default()
}
