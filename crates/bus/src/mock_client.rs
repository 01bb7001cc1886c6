//! Mock 总线客户端
//!
//! 用于单元测试与端到端测试的 mock 实现，支持注入入站消息与连接丢失。

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use contracts::Envelope;
use tokio::sync::{mpsc, watch};

use crate::client::BusClient;
use crate::error::{BusError, Result};

/// 已发布的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl PublishedMessage {
    /// Payload 按 UTF-8 解码 (lossy)
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// 连接状态
#[derive(Debug, Clone, PartialEq, Eq)]
enum Connection {
    Open,
    Closed,
    Lost(String),
}

#[derive(Debug, Default)]
struct Recorded {
    /// 断开或连接丢失后置空，与真实客户端的 event loop 结束一致
    inbound: Option<mpsc::UnboundedSender<Envelope>>,
    subscriptions: Vec<String>,
    published: Vec<PublishedMessage>,
    fail_publish: bool,
    refused_topics: Vec<String>,
}

/// Mock 总线客户端
///
/// Clone 共享状态：测试保留一份句柄，另一份交给被测代码。
#[derive(Debug, Clone)]
pub struct MockBusClient {
    recorded: Arc<Mutex<Recorded>>,
    connection: Arc<watch::Sender<Connection>>,
}

impl MockBusClient {
    /// 创建 mock 客户端，入站消息写入 `inbound`
    pub fn new(inbound: mpsc::UnboundedSender<Envelope>) -> Self {
        let (connection, _) = watch::channel(Connection::Open);
        Self {
            recorded: Arc::new(Mutex::new(Recorded {
                inbound: Some(inbound),
                ..Recorded::default()
            })),
            connection: Arc::new(connection),
        }
    }

    /// 模拟收到一条 broker 消息
    pub fn inject(&self, topic: &str, payload: impl Into<Bytes>) -> bool {
        match &self.lock().inbound {
            Some(inbound) => inbound.send(Envelope::new(topic, payload)).is_ok(),
            None => false,
        }
    }

    /// 模拟连接丢失
    pub fn lose_connection(&self, reason: impl Into<String>) {
        self.lock().inbound = None;
        self.connection.send_replace(Connection::Lost(reason.into()));
    }

    /// 之后的 publish 全部失败
    pub fn fail_publishes(&self) {
        self.lock().fail_publish = true;
    }

    /// 之后发往 `topic` 的 publish 失败，其余 topic 不受影响
    pub fn fail_topic(&self, topic: &str) {
        self.lock().refused_topics.push(topic.to_string());
    }

    /// 已订阅的 topic filter
    pub fn subscriptions(&self) -> Vec<String> {
        self.lock().subscriptions.clone()
    }

    /// 已发布的消息 (按顺序)
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }

    /// 是否已主动断开
    pub fn is_disconnected(&self) -> bool {
        *self.connection.borrow() == Connection::Closed
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_open(&self) -> Result<()> {
        match &*self.connection.borrow() {
            Connection::Open => Ok(()),
            Connection::Closed => Err(BusError::request_failed("client disconnected")),
            Connection::Lost(reason) => Err(BusError::connection_lost(reason.clone())),
        }
    }
}

impl BusClient for MockBusClient {
    async fn subscribe(&self, filter: &str) -> Result<()> {
        self.ensure_open()?;
        self.lock().subscriptions.push(filter.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.ensure_open()?;
        let mut recorded = self.lock();
        if recorded.fail_publish || recorded.refused_topics.iter().any(|t| t == topic) {
            return Err(BusError::request_failed(format!("publish '{topic}' refused")));
        }
        recorded.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn closed(&mut self) -> Result<()> {
        let mut rx = self.connection.subscribe();
        let state = match rx.wait_for(|c| *c != Connection::Open).await {
            Ok(state) => state.clone(),
            Err(_) => Connection::Closed,
        };
        match state {
            Connection::Lost(reason) => Err(BusError::connection_lost(reason)),
            _ => Ok(()),
        }
    }

    async fn disconnect(&mut self, _grace: Duration) -> Result<()> {
        self.lock().inbound = None;
        self.connection.send_if_modified(|c| {
            if *c == Connection::Open {
                *c = Connection::Closed;
                true
            } else {
                false
            }
        });
        Ok(())
    }
}
