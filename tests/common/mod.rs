//! Common test utilities - DuelTest harness for end-to-end testing

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dueld::combat::ScriptedDice;
use dueld::{Config, Server};
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Test harness that runs a real dueld server on a random port
///
/// Dice are scripted so every roll is predictable.
pub struct DuelTest {
    pub addr: SocketAddr,
    pub client: Client,
    server: Arc<Server>,
    handle: Option<JoinHandle<()>>,
}

impl DuelTest {
    /// In-memory database, default rules
    pub async fn start(faces: &[u8]) -> Result<Self> {
        Self::start_with(Config::default(), faces).await
    }

    pub async fn start_with(config: Config, faces: &[u8]) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Config {
            bind_addr: addr,
            ..config
        };
        let dice = Arc::new(ScriptedDice::new(faces.to_vec()));
        let server = Arc::new(Server::with_dice(config, dice).await?);
        let server_clone = server.clone();

        // Spawn the server in a background task
        let handle = tokio::spawn(async move {
            if let Err(e) = server_clone.serve(listener).await {
                eprintln!("Server error: {}", e);
            }
        });

        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;

        // Poll until server is ready (max 2 seconds)
        let mut ready = false;
        for _ in 0..20 {
            if client
                .get(format!("http://{}/health", addr))
                .send()
                .await
                .is_ok()
            {
                ready = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        if !ready {
            panic!("Server failed to start within 2 seconds");
        }

        Ok(Self {
            addr,
            client,
            server,
            handle: Some(handle),
        })
    }

    /// Get the base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await?)
    }

    /// Make a POST request with JSON body
    pub async fn post<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await?)
    }

    /// POST and decode a successful JSON body
    pub async fn post_ok<T: serde::Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Value> {
        let resp = self.post(path, body).await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            anyhow::bail!("POST {} failed with {}: {}", path, status, body);
        }
        Ok(body)
    }

    /// GET and decode a successful JSON body
    pub async fn get_ok(&self, path: &str) -> Result<Value> {
        let resp = self.get(path).await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            anyhow::bail!("GET {} failed with {}: {}", path, status, body);
        }
        Ok(body)
    }

    /// Get direct access to the database for test setup/assertions
    pub fn pool(&self) -> sqlx::SqlitePool {
        self.server.db().pool().clone()
    }

    /// Stop the server and wait for it to drain
    pub async fn stop(mut self) {
        self.server.shutdown();
        if let Some(handle) = self.handle.take() {
            handle.await.ok();
        }
    }

    /// Connect a player's event stream and consume the welcome frame
    pub async fn connect_ws(&self, player_id: i64) -> Result<WsClient> {
        let url = format!("ws://{}/ws?player_id={}", self.addr, player_id);
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (write, read) = ws_stream.split();
        let mut client = WsClient { write, read };
        let welcome = client.recv_json_timeout(Duration::from_secs(2)).await?;
        anyhow::ensure!(welcome["type"] == "welcome", "expected welcome, got {}", welcome);
        Ok(client)
    }
}

impl Drop for DuelTest {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}

/// WebSocket client for testing
pub struct WsClient {
    write: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        Message,
    >,
    read: futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    >,
}

impl WsClient {
    /// Send a ping message
    pub async fn send_ping(&mut self) -> Result<()> {
        let msg = serde_json::json!({ "type": "ping" });
        self.write
            .send(Message::Text(msg.to_string().into()))
            .await?;
        Ok(())
    }

    /// Receive the next message as JSON
    pub async fn recv_json(&mut self) -> Result<Value> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(serde_json::from_str(&text)?);
                }
                Some(Ok(Message::Close(_))) | None => {
                    anyhow::bail!("WebSocket closed");
                }
                Some(Err(e)) => return Err(e.into()),
                _ => continue, // Skip binary/ping/pong frames
            }
        }
    }

    /// Receive with timeout
    pub async fn recv_json_timeout(&mut self, timeout: Duration) -> Result<Value> {
        match tokio::time::timeout(timeout, self.recv_json()).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("Timeout waiting for WebSocket message"),
        }
    }

    /// Skip ahead to the next event of one type
    pub async fn expect(&mut self, event_type: &str) -> Result<Value> {
        loop {
            let msg = self.recv_json_timeout(Duration::from_secs(3)).await?;
            if msg["type"] == event_type {
                return Ok(msg);
            }
        }
    }

    /// Close the connection
    pub async fn close(&mut self) -> Result<()> {
        self.write.close().await?;
        Ok(())
    }
}
