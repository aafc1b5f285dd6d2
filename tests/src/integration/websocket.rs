//! # WebSocket Session Tests
//!
//! One connection per bus, driven through a real socket:
//!
//! 1. **Default filter**: a client that never subscribes gets every allowed type
//! 2. **Control frames**: `{"subscribe": [...]}` narrows, `[]` silences, unknown
//!    names are dropped without a disconnect
//! 3. **Rate limit**: 150 events in one window, at most 100 written
//! 4. **Teardown**: subscriber counts return to baseline after disconnect
//! 5. **Setup errors**: 401 before upgrade, 403 for foreign origins

#[cfg(test)]
mod tests {
    use crate::integration::harness::{wait_until, within, TestServer};
    use futures::{SinkExt, StreamExt};
    use serde_json::Value;
    use shared_types::{TerminalEvent, WatcherEvent, WatcherEventKind};
    use stream_gateway::{EventBuses, GatewayConfig};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::{Error as WsError, Message};
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    async fn connect(server: &TestServer, path: &str) -> Client {
        let (client, _) = connect_async(server.ws_url(path)).await.expect("upgrade");
        client
    }

    /// Next JSON text frame, skipping control frames. `None` after 300 ms.
    async fn next_json(client: &mut Client) -> Option<Value> {
        loop {
            let msg = within(300, client.next()).await??.ok()?;
            if msg.is_text() {
                return serde_json::from_str(msg.to_text().ok()?).ok();
            }
            if msg.is_close() {
                return None;
            }
        }
    }

    async fn send_control(client: &mut Client, body: &str) {
        client.send(Message::text(body)).await.expect("send control");
        // No ack on the control channel; give the read loop a moment
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    fn file_changed(path: &str) -> WatcherEvent {
        WatcherEvent::new(WatcherEventKind::FileChanged, path)
    }

    // =============================================================================
    // TESTS
    // =============================================================================

    #[tokio::test]
    async fn test_default_subscription_receives_all_types() {
        let server = TestServer::spawn_default().await;
        let watcher = server.buses.watcher.clone().unwrap();
        let mut client = connect(&server, "/ws/watcher").await;
        assert!(wait_until(|| watcher.subscriber_count() == 1).await);

        watcher.publish(file_changed("/tmp/a"));
        watcher.publish(WatcherEvent::new(WatcherEventKind::GitBranchChanged, "/repo"));
        watcher.publish(WatcherEvent::renamed("/tmp/a", "/tmp/b"));

        let types: Vec<String> = [
            next_json(&mut client).await.unwrap(),
            next_json(&mut client).await.unwrap(),
            next_json(&mut client).await.unwrap(),
        ]
        .iter()
        .map(|v| v["type"].as_str().unwrap().to_string())
        .collect();
        assert_eq!(types, ["file_changed", "git_branch_changed", "file_renamed"]);
    }

    #[tokio::test]
    async fn test_zero_timestamp_stamped_on_write() {
        let server = TestServer::spawn_default().await;
        let watcher = server.buses.watcher.clone().unwrap();
        let mut client = connect(&server, "/ws/watcher").await;
        assert!(wait_until(|| watcher.subscriber_count() == 1).await);

        let event = file_changed("/tmp/x");
        assert!(event.timestamp.is_none());
        watcher.publish(event);

        let json = next_json(&mut client).await.unwrap();
        assert_eq!(json["type"], "file_changed");
        assert_eq!(json["path"], "/tmp/x");
        let stamped = json["timestamp"].as_str().unwrap();
        assert!(stamped.parse::<chrono::DateTime<chrono::Utc>>().is_ok());
    }

    #[tokio::test]
    async fn test_empty_subscribe_stops_delivery() {
        let server = TestServer::spawn_default().await;
        let watcher = server.buses.watcher.clone().unwrap();
        let mut client = connect(&server, "/ws/watcher").await;
        assert!(wait_until(|| watcher.subscriber_count() == 1).await);

        watcher.publish(file_changed("/before"));
        assert!(next_json(&mut client).await.is_some());

        send_control(&mut client, r#"{"subscribe": []}"#).await;
        watcher.publish(file_changed("/after"));
        assert!(next_json(&mut client).await.is_none());
        assert_eq!(watcher.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_type_allows_nothing_without_disconnect() {
        let server = TestServer::spawn_default().await;
        let watcher = server.buses.watcher.clone().unwrap();
        let mut client = connect(&server, "/ws/watcher").await;
        assert!(wait_until(|| watcher.subscriber_count() == 1).await);

        send_control(&mut client, r#"{"subscribe": ["unknown_type"]}"#).await;
        watcher.publish(file_changed("/ignored"));
        assert!(next_json(&mut client).await.is_none());

        // Still connected: a valid subscribe takes effect
        send_control(&mut client, r#"{"subscribe": ["file_changed"]}"#).await;
        watcher.publish(WatcherEvent::new(WatcherEventKind::FileDeleted, "/filtered"));
        watcher.publish(file_changed("/seen"));

        let json = next_json(&mut client).await.unwrap();
        assert_eq!(json["path"], "/seen");
    }

    #[tokio::test]
    async fn test_malformed_control_frame_ignored() {
        let server = TestServer::spawn_default().await;
        let watcher = server.buses.watcher.clone().unwrap();
        let mut client = connect(&server, "/ws/watcher").await;
        assert!(wait_until(|| watcher.subscriber_count() == 1).await);

        send_control(&mut client, "{not json").await;
        client
            .send(Message::binary(vec![1, 2, 3]))
            .await
            .expect("send binary");

        watcher.publish(file_changed("/still-streaming"));
        let json = next_json(&mut client).await.unwrap();
        assert_eq!(json["path"], "/still-streaming");
    }

    #[tokio::test]
    async fn test_rate_limit_caps_one_window() {
        let server = TestServer::spawn_default().await;
        let watcher = server.buses.watcher.clone().unwrap();
        let mut client = connect(&server, "/ws/watcher").await;
        assert!(wait_until(|| watcher.subscriber_count() == 1).await);

        for i in 0..150 {
            watcher.publish(file_changed(&format!("/tmp/{i}")));
        }

        let mut received = 0;
        while next_json(&mut client).await.is_some() {
            received += 1;
        }
        assert_eq!(received, 100);
    }

    #[tokio::test]
    async fn test_disconnect_restores_subscriber_count() {
        let server = TestServer::spawn_default().await;
        let terminal = server.buses.terminal.clone().unwrap();
        let baseline = terminal.subscriber_count();

        let mut client = connect(&server, "/ws/terminal").await;
        assert!(wait_until(|| terminal.subscriber_count() == baseline + 1).await);
        terminal.publish(TerminalEvent::output("t1", "ls\n"));
        assert!(next_json(&mut client).await.is_some());

        client.close(None).await.expect("close");
        drop(client);

        assert!(wait_until(|| terminal.subscriber_count() == baseline).await);
        assert!(wait_until(|| server.service.tracker().live_sessions() == 0).await);
    }

    #[tokio::test]
    async fn test_abrupt_disconnect_restores_subscriber_count() {
        let server = TestServer::spawn_default().await;
        let watcher = server.buses.watcher.clone().unwrap();

        let client = connect(&server, "/ws/watcher").await;
        assert!(wait_until(|| watcher.subscriber_count() == 1).await);
        drop(client);

        assert!(wait_until(|| watcher.subscriber_count() == 0).await);
    }

    #[tokio::test]
    async fn test_bus_close_ends_session() {
        let server = TestServer::spawn_default().await;
        let watcher = server.buses.watcher.clone().unwrap();
        let mut client = connect(&server, "/ws/watcher").await;
        assert!(wait_until(|| watcher.subscriber_count() == 1).await);

        watcher.close();
        let ended = within(2000, async {
            loop {
                match client.next().await {
                    None | Some(Err(_)) => return,
                    Some(Ok(msg)) if msg.is_close() => return,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(ended.is_some());
    }

    #[tokio::test]
    async fn test_missing_token_rejected_before_upgrade() {
        let mut config = GatewayConfig::default();
        config.auth.token = Some("s3cret".to_string());
        let server = TestServer::spawn(config, EventBuses::with_capacity(16)).await;

        match connect_async(server.ws_url("/ws/watcher")).await {
            Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
            other => panic!("expected 401, got {:?}", other.map(|_| ())),
        }
        assert_eq!(server.total_subscribers(), 0);

        let (_client, _) = connect_async(server.ws_url("/ws/watcher?token=s3cret"))
            .await
            .expect("authorized upgrade");
        let watcher = server.buses.watcher.clone().unwrap();
        assert!(wait_until(|| watcher.subscriber_count() == 1).await);
    }

    #[tokio::test]
    async fn test_foreign_origin_rejected() {
        let mut config = GatewayConfig::default();
        config.websocket.allowed_origins = vec!["https://app.example.com".to_string()];
        let server = TestServer::spawn(config, EventBuses::with_capacity(16)).await;

        let mut request = server.ws_url("/ws/agent").into_client_request().unwrap();
        request
            .headers_mut()
            .insert("Origin", "https://evil.test".parse().unwrap());

        match connect_async(request).await {
            Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 403),
            other => panic!("expected 403, got {:?}", other.map(|_| ())),
        }

        let mut request = server.ws_url("/ws/agent").into_client_request().unwrap();
        request
            .headers_mut()
            .insert("Origin", "https://app.example.com".parse().unwrap());
        assert!(connect_async(request).await.is_ok());
    }
}
