//! # Combined SSE Feed Tests
//!
//! `/events` merges the watcher, config, workflow, agent and terminal buses:
//!
//! 1. **Fan-in**: events from two buses published together both arrive once
//! 2. **Query filter**: `types=` narrows the merged feed
//! 3. **Unavailable upstream**: a missing bus yields one error frame, then EOF
//! 4. **Teardown**: dropping the response releases all five subscriptions

#[cfg(test)]
mod tests {
    use crate::integration::harness::{wait_until, within, TestServer};
    use futures::StreamExt;
    use shared_types::{
        AgentEvent, ConfigEvent, WatcherEvent, WatcherEventKind, WorkflowEvent, WorkflowEventKind,
    };
    use stream_gateway::{EventBuses, GatewayConfig};

    /// One parsed `text/event-stream` frame.
    #[derive(Debug)]
    struct Frame {
        event: String,
        data: serde_json::Value,
    }

    /// Incremental frame reader over a streaming response body.
    struct FrameReader {
        body: futures::stream::BoxStream<'static, reqwest::Result<Vec<u8>>>,
        buffer: String,
    }

    impl FrameReader {
        fn new(response: reqwest::Response) -> Self {
            Self {
                body: response
                    .bytes_stream()
                    .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                    .boxed(),
                buffer: String::new(),
            }
        }

        /// Next event frame; comments (keep-alives) are skipped. `None` after
        /// 500 ms without a frame or at end of stream.
        async fn next(&mut self) -> Option<Frame> {
            loop {
                if let Some(end) = self.buffer.find("\n\n") {
                    let raw: String = self.buffer.drain(..end + 2).collect();
                    if let Some(frame) = parse_frame(&raw) {
                        return Some(frame);
                    }
                    continue;
                }
                let chunk = within(500, self.body.next()).await??.ok()?;
                self.buffer.push_str(std::str::from_utf8(&chunk).ok()?);
            }
        }
    }

    fn parse_frame(raw: &str) -> Option<Frame> {
        let mut event = None;
        let mut data = Vec::new();
        for line in raw.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                data.push(value.trim_start().to_string());
            }
        }
        Some(Frame {
            event: event?,
            data: serde_json::from_str(&data.join("\n")).ok()?,
        })
    }

    async fn open(server: &TestServer, query: &str) -> FrameReader {
        let response = reqwest::get(server.http_url(&format!("/events{query}")))
            .await
            .expect("request");
        assert_eq!(response.status(), 200);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));
        FrameReader::new(response)
    }

    // =============================================================================
    // TESTS
    // =============================================================================

    #[tokio::test]
    async fn test_fan_in_delivers_each_event_once() {
        let server = TestServer::spawn_default().await;
        let watcher = server.buses.watcher.clone().unwrap();
        let workflow = server.buses.workflow.clone().unwrap();

        let mut frames = open(&server, "").await;
        assert!(wait_until(|| workflow.subscriber_count() == 1).await);

        let publish_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move {
                watcher.publish(WatcherEvent::new(WatcherEventKind::FileChanged, "/tmp/x"))
            })
        };
        let publish_workflow = {
            let workflow = workflow.clone();
            tokio::spawn(async move {
                workflow.publish(WorkflowEvent::transition("f1", "queued", "running"))
            })
        };
        assert_eq!(publish_watcher.await.unwrap(), 1);
        assert_eq!(publish_workflow.await.unwrap(), 1);

        let mut events = Vec::new();
        while let Some(frame) = frames.next().await {
            assert_eq!(frame.data["type"], frame.event.as_str());
            assert!(frame.data["timestamp"].is_string());
            events.push(frame.event);
        }
        events.sort_unstable();
        assert_eq!(events, ["file_changed", "flow_transition"]);
    }

    #[tokio::test]
    async fn test_types_query_narrows_feed() {
        let server = TestServer::spawn_default().await;
        let watcher = server.buses.watcher.clone().unwrap();
        let workflow = server.buses.workflow.clone().unwrap();
        let agent = server.buses.agent.clone().unwrap();
        let config = server.buses.config.clone().unwrap();

        let mut frames = open(&server, "?types=flow_started&types=agent_status,config_reloaded").await;
        assert!(wait_until(|| agent.subscriber_count() == 1).await);

        watcher.publish(WatcherEvent::new(WatcherEventKind::FileChanged, "/tmp/x"));
        workflow.publish(WorkflowEvent::new(WorkflowEventKind::FlowCompleted, "f0"));
        workflow.publish(WorkflowEvent::new(WorkflowEventKind::FlowStarted, "f1"));
        agent.publish(AgentEvent::status("a1", "idle"));
        config.publish(ConfigEvent::new(shared_types::ConfigEventKind::ConfigReloaded));

        let mut events = Vec::new();
        while let Some(frame) = frames.next().await {
            events.push(frame.event);
        }
        events.sort_unstable();
        assert_eq!(events, ["agent_status", "config_reloaded", "flow_started"]);
    }

    #[tokio::test]
    async fn test_missing_bus_yields_one_error_frame() {
        let mut buses = EventBuses::with_capacity(16);
        buses.workflow = None;
        let server = TestServer::spawn(GatewayConfig::default(), buses).await;

        let body = within(
            2000,
            reqwest::get(server.http_url("/events")).await.expect("request").text(),
        )
        .await
        .expect("stream ends")
        .expect("body");

        assert_eq!(body.matches("event: error").count(), 1);
        assert!(body.contains("retry: 3000"));
        assert!(body.contains("workflow bus not configured"));
        assert!(!body.contains("event: file_changed"));
        assert_eq!(server.total_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_closed_bus_yields_one_error_frame() {
        let server = TestServer::spawn_default().await;
        server.buses.config.as_ref().unwrap().close();

        let mut frames = open(&server, "").await;
        let frame = frames.next().await.unwrap();
        assert_eq!(frame.event, "error");
        assert_eq!(frame.data["error"]["code"], "upstream_unavailable");
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_releases_subscriptions() {
        let server = TestServer::spawn_default().await;
        let baseline = server.total_subscribers();

        let frames = open(&server, "").await;
        assert!(wait_until(|| server.total_subscribers() == baseline + 5).await);
        assert_eq!(server.buses.index.as_ref().unwrap().subscriber_count(), 0);

        drop(frames);
        // The server notices the closed socket on its next write
        let watcher = server.buses.watcher.clone().unwrap();
        assert!(
            wait_until(|| {
                watcher.publish(WatcherEvent::new(WatcherEventKind::FileChanged, "/poke"));
                server.total_subscribers() == baseline
            })
            .await
        );
        assert!(wait_until(|| server.service.tracker().live_sessions() == 0).await);
    }
}
