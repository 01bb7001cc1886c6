//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 模拟 e2e 测试（mock 总线 + mock transport）
//! - 真实 HTTP 往返测试（本地 axum 服务）

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};

    /// 原部署格式的配置文档可被加载
    #[test]
    fn test_deployment_document_loads() {
        let config = ConfigLoader::load_from_str(
            r#"{
                "debug": true,
                "mqtt_server": {
                    "address": "tcp://broker:1883",
                    "username": "bridge",
                    "password": "pw"
                },
                "on_start": [ { "topic": "status/bridge", "message": "starting" } ],
                "discord": [ { "topic": "alerts/#", "webhook": "https://discord.example/hook" } ],
                "pagerduty": [ {
                    "topic": "pages/+",
                    "severity": "critical",
                    "integration_key": "key"
                } ],
                "log_analytics": [ {
                    "topic": "logs/#",
                    "workspace_id": "ws",
                    "shared_key": "c2VjcmV0",
                    "custom_log_name": "Bridge"
                } ],
                "azure_monitor": [ {
                    "topic": "logs/#",
                    "data_collecton_endpoint": "https://dce.example",
                    "immutable_id": "dcr-1",
                    "stream_name": "Custom-Bridge_CL",
                    "access_token": "token"
                } ]
            }"#,
            ConfigFormat::Json,
        )
        .unwrap();

        assert!(config.debug);
        assert_eq!(config.mqtt_server.online_topic(), "qtbot/online");
        let names: Vec<String> = config.sink_configs().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "discord[0]",
                "pagerduty[0]",
                "log_analytics[0]",
                "azure_monitor[0]"
            ]
        );
        assert_eq!(
            config.azure_monitor[0].ingestion_url(),
            "https://dce.example/dataCollectionRules/dcr-1/streams/Custom-Bridge_CL?api-version=2023-01-01"
        );
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use bus::{announce_offline, announce_online, subscribe_all, BusClient, MockBusClient};
    use chrono::{FixedOffset, TimeZone};
    use contracts::{BusConfig, DiscordConfig, Envelope, PagerDutyConfig};
    use dispatcher::transport::{HttpResponse, MockTransport};
    use dispatcher::{
        summarize, DiscordSink, Dispatcher, FailureReporter, PagerDutySink, SharedStats,
        SinkHandle, Supervisor,
    };
    use observability::DeliveryAggregator;
    use tokio::sync::mpsc;

    fn shared_stats() -> SharedStats {
        Arc::new(Mutex::new(DeliveryAggregator::new()))
    }

    fn discord_config(webhook: &str) -> DiscordConfig {
        DiscordConfig {
            topic: "#".into(),
            webhook: webhook.into(),
        }
    }

    fn discord(name: &str, transport: &MockTransport, stats: &SharedStats) -> SinkHandle {
        SinkHandle::spawn(
            DiscordSink::new(name, &discord_config("http://hook"), transport.clone()),
            FailureReporter::detached(),
            Arc::clone(stats),
        )
    }

    /// 被限流的消息先重试成功，之后的消息才发送
    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_message_is_retried_before_next() {
        let mock = MockTransport::new();
        mock.push_response(HttpResponse::new(429).with_header("X-RateLimit-Reset-After", "1.5"))
            .push_status(204)
            .push_status(204);
        let stats = shared_stats();
        let handle = discord("discord[0]", &mock, &stats);

        let start = tokio::time::Instant::now();
        assert!(handle.enqueue(Envelope::new("t", "first")));
        assert!(handle.enqueue(Envelope::new("t", "second")));
        handle.shutdown().await;

        let bodies: Vec<String> = mock.requests().iter().map(|r| r.body_text()).collect();
        assert_eq!(bodies.len(), 3);
        assert!(bodies[0].contains("first"));
        assert!(bodies[1].contains("first"));
        assert!(bodies[2].contains("second"));
        assert!(start.elapsed() >= Duration::from_millis(1500));
        assert_eq!(summarize(&stats).total_delivered, 2);
    }

    /// 一个 sink 退避等待时，其他 sink 继续投递
    #[tokio::test(start_paused = true)]
    async fn test_slow_sink_does_not_block_others() {
        let slow = MockTransport::always_status(204);
        for _ in 0..3 {
            slow.push_status(429);
        }
        let healthy = MockTransport::always_status(204);
        let stats = shared_stats();

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::with_handles(
            vec![
                ("#".to_string(), discord("slow", &slow, &stats)),
                ("#".to_string(), discord("healthy", &healthy, &stats)),
            ],
            input_rx,
            Arc::clone(&stats),
        );
        let task = dispatcher.spawn();

        for i in 0..5 {
            input_tx.send(Envelope::new("alerts/x", format!("m{i}"))).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(healthy.call_count(), 5);
        assert_eq!(slow.call_count(), 1);

        drop(input_tx);
        task.await.unwrap();

        // 3 rejected attempts plus one success per message
        assert_eq!(slow.call_count(), 8);
        let summary = summarize(&stats);
        assert_eq!(summary.total_delivered, 10);
        assert_eq!(summary.per_sink["slow"].delivered, 5);
    }

    /// Discord 请求体
    #[tokio::test]
    async fn test_discord_request_body() {
        let mock = MockTransport::always_status(204);
        let stats = shared_stats();
        let handle = SinkHandle::spawn(
            DiscordSink::new("discord[0]", &discord_config("https://discord.example/hook"), mock.clone()),
            FailureReporter::detached(),
            stats,
        );

        let received_at = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 1, 12, 30, 45)
            .unwrap();
        handle.enqueue(Envelope::with_timestamp(received_at, "alerts/door", "open"));
        handle.shutdown().await;

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://discord.example/hook");
        assert_eq!(
            requests[0].header_value("Content-Type"),
            Some("application/json")
        );
        let body: serde_json::Value = serde_json::from_str(&requests[0].body_text()).unwrap();
        assert_eq!(body, serde_json::json!({ "content": "12:30:45 alerts/door: `open`" }));
    }

    /// 总线 -> dispatcher -> PagerDuty，并校验公告顺序
    #[tokio::test]
    async fn test_bus_to_pagerduty_flow() {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let mut client = MockBusClient::new(inbound_tx);
        let bus_config = BusConfig {
            address: "tcp://localhost:1883".into(),
            username: String::new(),
            password: String::new(),
            client_id: "edge".into(),
        };

        let pagerduty = MockTransport::always_status(202);
        let stats = shared_stats();
        let mut supervisor = Supervisor::new();
        let config = PagerDutyConfig {
            topic: "pages/+".into(),
            severity: "critical".into(),
            integration_key: "routing-key".into(),
            url: String::new(),
        };
        let dispatcher = Dispatcher::with_handles(
            vec![(
                config.topic.clone(),
                SinkHandle::spawn(
                    PagerDutySink::new("pagerduty[0]", &config, pagerduty.clone()),
                    supervisor.reporter(),
                    Arc::clone(&stats),
                ),
            )],
            inbound_rx,
            Arc::clone(&stats),
        );
        let task = dispatcher.spawn();

        subscribe_all(&client, ["pages/+"]).await.unwrap();
        assert_eq!(announce_online(&client, &bus_config, &[]).await, 0);

        client.inject("pages/db", "disk full");
        client.inject("pages/db/replica", "not routed");
        client.inject("pages/web", "down");

        announce_offline(&client, &bus_config).await.unwrap();
        client.disconnect(Duration::from_secs(2)).await.unwrap();
        task.await.unwrap();

        let topics: Vec<String> = client.published().into_iter().map(|m| m.topic).collect();
        assert_eq!(topics, vec!["edge/online", "edge/log", "edge/online"]);

        let requests = pagerduty.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url, "https://events.pagerduty.com/v2/enqueue");
        let event: serde_json::Value = serde_json::from_str(&requests[0].body_text()).unwrap();
        assert_eq!(event["routing_key"], "routing-key");
        assert_eq!(event["event_action"], "trigger");
        assert_eq!(event["payload"]["summary"], "pages/db: disk full");
        assert_eq!(event["payload"]["source"], "pages/db");
        assert_eq!(event["payload"]["severity"], "critical");
        assert!(event["payload"]["timestamp"].is_string());

        supervisor.drain();
        assert!(supervisor.failures().is_empty());
        assert_eq!(summarize(&stats).total_delivered, 2);
    }

    /// 终止性失败只停止该 sink
    #[tokio::test]
    async fn test_rejection_stops_only_that_sink() {
        let rejecting = MockTransport::new();
        rejecting.push_response(HttpResponse::new(400).with_body("bad request"));
        let healthy = MockTransport::always_status(204);
        let stats = shared_stats();
        let mut supervisor = Supervisor::new();

        let spawn = |name: &str, transport: &MockTransport| {
            SinkHandle::spawn(
                DiscordSink::new(name, &discord_config("http://hook"), transport.clone()),
                supervisor.reporter(),
                Arc::clone(&stats),
            )
        };
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::with_handles(
            vec![
                ("#".to_string(), spawn("rejecting", &rejecting)),
                ("#".to_string(), spawn("healthy", &healthy)),
            ],
            input_rx,
            Arc::clone(&stats),
        );
        let task = dispatcher.spawn();

        input_tx.send(Envelope::new("a", "1")).unwrap();
        input_tx.send(Envelope::new("a", "2")).unwrap();
        drop(input_tx);
        task.await.unwrap();
        supervisor.drain();

        let failure = &supervisor.failures()["rejecting"];
        assert_eq!(failure.error.status(), Some(400));
        assert_eq!(failure.envelope.payload_str(), "1");
        assert_eq!(healthy.call_count(), 2);
        assert_eq!(rejecting.call_count(), 1);
    }
}

#[cfg(test)]
mod http_tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::Router;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use contracts::{DataSink, DiscordConfig, Envelope, LogAnalyticsConfig, PagerDutyConfig};
    use dispatcher::sinks::{sign, string_to_sign};
    use dispatcher::{DiscordSink, LogAnalyticsSink, PagerDutySink, ReqwestTransport};

    /// 记录收到的请求
    #[derive(Default)]
    struct Recorder {
        calls: AtomicUsize,
        requests: Mutex<Vec<(HeaderMap, String)>>,
    }

    impl Recorder {
        fn record(&self, headers: HeaderMap, body: String) -> usize {
            self.requests
                .lock()
                .unwrap()
                .push((headers, body));
            self.calls.fetch_add(1, Ordering::SeqCst) + 1
        }

        fn requests(&self) -> Vec<(HeaderMap, String)> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new(Duration::from_secs(5)).unwrap()
    }

    /// First call is rate limited, then accepted
    async fn discord_hook(
        State(recorder): State<Arc<Recorder>>,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        if recorder.record(headers, body) == 1 {
            (
                StatusCode::TOO_MANY_REQUESTS,
                [("X-RateLimit-Reset-After", "0.1")],
            )
                .into_response()
        } else {
            StatusCode::NO_CONTENT.into_response()
        }
    }

    async fn pagerduty_hook(
        State(recorder): State<Arc<Recorder>>,
        headers: HeaderMap,
        body: String,
    ) -> StatusCode {
        recorder.record(headers, body);
        StatusCode::ACCEPTED
    }

    async fn log_analytics_hook(
        State(recorder): State<Arc<Recorder>>,
        headers: HeaderMap,
        body: String,
    ) -> StatusCode {
        recorder.record(headers, body);
        StatusCode::OK
    }

    async fn rejecting_hook(
        State(recorder): State<Arc<Recorder>>,
        headers: HeaderMap,
        body: String,
    ) -> (StatusCode, &'static str) {
        recorder.record(headers, body);
        (StatusCode::FORBIDDEN, "invalid routing key")
    }

    #[tokio::test]
    async fn test_discord_honours_reset_after_over_http() {
        let recorder = Arc::new(Recorder::default());
        let app = Router::new()
            .route("/webhook", post(discord_hook))
            .with_state(Arc::clone(&recorder));
        let addr = serve(app).await;

        let config = DiscordConfig {
            topic: "#".into(),
            webhook: format!("http://{addr}/webhook"),
        };
        let mut sink = DiscordSink::new("discord[0]", &config, transport());

        let start = std::time::Instant::now();
        sink.write(&Envelope::new("alerts/door", "open")).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(100));
        let requests = recorder.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].1, requests[1].1);
        assert_eq!(
            requests[0].0.get("content-type").unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_pagerduty_event_over_http() {
        let recorder = Arc::new(Recorder::default());
        let app = Router::new()
            .route("/v2/enqueue", post(pagerduty_hook))
            .with_state(Arc::clone(&recorder));
        let addr = serve(app).await;

        let config = PagerDutyConfig {
            topic: "#".into(),
            severity: "warning".into(),
            integration_key: "key-1".into(),
            url: format!("http://{addr}/v2/enqueue"),
        };
        let mut sink = PagerDutySink::new("pagerduty[0]", &config, transport());
        sink.write(&Envelope::new("pages/db", "disk full")).await.unwrap();

        let requests = recorder.requests();
        assert_eq!(requests.len(), 1);
        let event: serde_json::Value = serde_json::from_str(&requests[0].1).unwrap();
        assert_eq!(event["routing_key"], "key-1");
        assert_eq!(event["payload"]["severity"], "warning");
        assert_eq!(event["payload"]["summary"], "pages/db: disk full");
    }

    #[tokio::test]
    async fn test_rejection_over_http_is_terminal() {
        let recorder = Arc::new(Recorder::default());
        let app = Router::new()
            .route("/v2/enqueue", post(rejecting_hook))
            .with_state(Arc::clone(&recorder));
        let addr = serve(app).await;

        let config = PagerDutyConfig {
            topic: "#".into(),
            severity: "info".into(),
            integration_key: "wrong".into(),
            url: format!("http://{addr}/v2/enqueue"),
        };
        let mut sink = PagerDutySink::new("pagerduty[0]", &config, transport());
        let err = sink.write(&Envelope::new("t", "x")).await.unwrap_err();

        assert_eq!(err.status(), Some(403));
        assert!(err.to_string().contains("invalid routing key"));
        assert_eq!(recorder.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_log_analytics_signature_over_http() {
        let recorder = Arc::new(Recorder::default());
        let app = Router::new()
            .route("/api/logs", post(log_analytics_hook))
            .with_state(Arc::clone(&recorder));
        let addr = serve(app).await;

        let key = STANDARD.encode(b"workspace-secret");
        let config = LogAnalyticsConfig {
            topic: "#".into(),
            workspace_id: "ws-1".into(),
            shared_key: key,
            custom_log_name: "Bridge".into(),
            url: Some(format!("http://{addr}/api/logs?api-version=2016-04-01")),
        };
        let mut sink = LogAnalyticsSink::new("log_analytics[0]", &config, transport()).unwrap();
        sink.write(&Envelope::new("logs/app", "started")).await.unwrap();

        let requests = recorder.requests();
        assert_eq!(requests.len(), 1);
        let (headers, body) = &requests[0];
        let header = |name: &str| headers.get(name).unwrap().to_str().unwrap().to_string();

        assert_eq!(header("log-type"), "Bridge");
        assert_eq!(header("time-generated-field"), "TimeGenerated");
        let date = header("x-ms-date");
        let expected = sign(&string_to_sign(body.len(), &date), b"workspace-secret").unwrap();
        assert_eq!(header("authorization"), format!("SharedKey ws-1:{expected}"));

        let record: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(record["Topic"], "logs/app");
        assert_eq!(record["Message"], "started");
        assert!(record["TimeGenerated"].as_str().unwrap().ends_with('Z'));
    }
}
