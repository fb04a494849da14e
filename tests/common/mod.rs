//! Common test utilities for E2E tests

use circlet::{AppState, config};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

/// A registered user with a live session token
pub struct TestUser {
    pub id: String,
    pub username: String,
    pub token: String,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            database: config::DatabaseConfig {
                path: db_path.clone(),
            },
            auth: config::AuthConfig {
                session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
                session_max_age: 604800,
            },
            feed: config::FeedConfig {
                default_limit: 20,
                max_limit: 50,
            },
            enrichment: config::EnrichmentConfig {
                probe_links: false,
                probe_timeout_ms: 2000,
            },
            events: config::EventsConfig {
                delivery_timeout_seconds: 10,
            },
            cors: config::CorsConfig {
                allowed_origins: vec![],
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        // Build the real router so tests exercise production route composition
        let app = circlet::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Register a user through the API and log them in
    pub async fn register_user(&self, username: &str) -> TestUser {
        let response = self
            .client
            .post(&self.url("/api/auth/register"))
            .json(&serde_json::json!({
                "username": username,
                "password": "password123",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "registration failed for {}", username);
        let user: Value = response.json().await.unwrap();

        let response = self
            .client
            .post(&self.url("/api/auth/login"))
            .json(&serde_json::json!({
                "username": username,
                "password": "password123",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "login failed for {}", username);
        let login: Value = response.json().await.unwrap();

        TestUser {
            id: user["id"].as_str().unwrap().to_string(),
            username: user["username"].as_str().unwrap().to_string(),
            token: login["access_token"].as_str().unwrap().to_string(),
        }
    }

    /// Create a circle through the API and return its id
    pub async fn create_circle(&self, token: &str, name: &str, is_public: bool) -> String {
        let response = self
            .client
            .post(&self.url("/api/circles"))
            .header("Authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({
                "name": name,
                "is_public": is_public,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "circle creation failed for {}", name);
        let circle: Value = response.json().await.unwrap();
        circle["id"].as_str().unwrap().to_string()
    }

    /// Create a standard text post and return its JSON
    pub async fn create_post(&self, token: &str, circle_id: &str, text: &str) -> Value {
        let response = self
            .client
            .post(&self.url(&format!("/api/circles/{}/posts", circle_id)))
            .header("Authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({
                "content": {
                    "post_type": "standard",
                    "text": text,
                    "tags": [],
                }
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "post creation failed");
        response.json().await.unwrap()
    }
}
