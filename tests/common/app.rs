use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;

use scimemo_backend::config::{Config, StorageConfig};
use scimemo_backend::routes::build_router;
use scimemo_backend::state::AppState;
use scimemo_backend::store::{open_backend, BackendKind, SharedRepository};

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub repo: SharedRepository,
    pub config: Config,
    _temp_dir: TempDir,
}

/// 每个测试一个临时目录下的 Config，直接构造以避免 set_var 的并发竞态
pub fn test_config(temp_dir: &TempDir, backend: BackendKind, seed: bool) -> Config {
    let path = |name: &str| temp_dir.path().join(name).to_string_lossy().to_string();
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: path("logs"),
        cors_origin: "http://localhost:3000".to_string(),
        storage: StorageConfig {
            backend,
            data_file_path: path("flashcards-data.json"),
            sqlite_path: path("flashcards.sqlite3"),
            sled_path: path("flashcards.sled"),
            default_domain: "通用".to_string(),
            seed_sample_data: seed,
            import_overwrite_clears_domains: false,
        },
    }
}

pub async fn spawn_app_with(backend: BackendKind, seed: bool) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(&temp_dir, backend, seed);
    spawn_from_config(config, temp_dir)
}

pub fn spawn_from_config(config: Config, temp_dir: TempDir) -> TestApp {
    let repo = open_backend(config.storage.backend, &config).expect("open backend");
    let state = AppState::new(Arc::clone(&repo), &config);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        repo,
        config,
        _temp_dir: temp_dir,
    }
}

/// 默认：嵌入式后端，不写入示例数据
pub async fn spawn_test_server() -> TestApp {
    spawn_app_with(BackendKind::Embedded, false).await
}
