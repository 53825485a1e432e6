//! Live delivery of samples while a measurement is running.
use async_trait::async_trait;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::sink::SinkExt;
use serde::Serialize;
use tokio::sync::mpsc;

use super::error::DeliveryError;
use super::{RunResult, Sample};

/// Everything a live subscriber can receive during one run.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum LiveMessage {
    Sample(Sample),
    Result(RunResult),
}

/// Single-writer sink for one run. Samples arrive in parse order, the final
/// result after every sample, then `close` exactly once.
#[async_trait]
pub trait LiveSink: Send {
    async fn push_sample(&mut self, sample: &Sample) -> Result<(), DeliveryError>;
    async fn push_result(&mut self, result: &RunResult) -> Result<(), DeliveryError>;
    async fn close(&mut self) -> Result<(), DeliveryError>;
}

/// Streams JSON text frames over an upgraded axum WebSocket.
pub struct WebSocketSink {
    socket: WebSocket,
}

impl WebSocketSink {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }

    async fn send_json<T: Serialize + Sync>(&mut self, payload: &T) -> Result<(), DeliveryError> {
        let json_data = serde_json::to_string(payload)?;
        self.socket
            .send(Message::Text(Utf8Bytes::from(json_data)))
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}

#[async_trait]
impl LiveSink for WebSocketSink {
    async fn push_sample(&mut self, sample: &Sample) -> Result<(), DeliveryError> {
        self.send_json(sample).await
    }

    async fn push_result(&mut self, result: &RunResult) -> Result<(), DeliveryError> {
        self.send_json(result).await
    }

    async fn close(&mut self) -> Result<(), DeliveryError> {
        SinkExt::close(&mut self.socket)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}

/// Forwards messages to an in-process receiver. Closing drops the sender, so
/// the receiver sees the end of the stream.
pub struct ChannelSink {
    tx: Option<mpsc::Sender<LiveMessage>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<LiveMessage>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Creates a sink together with the receiving half.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<LiveMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    async fn send(&mut self, message: LiveMessage) -> Result<(), DeliveryError> {
        let tx = self.tx.as_ref().ok_or(DeliveryError::Closed)?;
        tx.send(message).await.map_err(|_| DeliveryError::Closed)
    }
}

#[async_trait]
impl LiveSink for ChannelSink {
    async fn push_sample(&mut self, sample: &Sample) -> Result<(), DeliveryError> {
        self.send(LiveMessage::Sample(sample.clone())).await
    }

    async fn push_result(&mut self, result: &RunResult) -> Result<(), DeliveryError> {
        self.send(LiveMessage::Result(result.clone())).await
    }

    async fn close(&mut self) -> Result<(), DeliveryError> {
        self.tx.take().map(drop).ok_or(DeliveryError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iperf3::SampleKind;

    #[tokio::test]
    async fn test_channel_sink_forwards_then_ends() {
        let (mut sink, mut rx) = ChannelSink::channel(4);
        let sample = Sample {
            kind: SampleKind::Interval,
            interval_label: "0.00-1.00".to_string(),
            ..Sample::default()
        };
        sink.push_sample(&sample).await.unwrap();
        sink.push_result(&RunResult::default()).await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(rx.recv().await, Some(LiveMessage::Sample(sample)));
        assert_eq!(rx.recv().await, Some(LiveMessage::Result(RunResult::default())));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_channel_sink_reports_dropped_receiver() {
        let (mut sink, rx) = ChannelSink::channel(1);
        drop(rx);
        assert!(matches!(
            sink.push_sample(&Sample::default()).await,
            Err(DeliveryError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_channel_sink_close_twice() {
        let (mut sink, _rx) = ChannelSink::channel(1);
        assert!(sink.close().await.is_ok());
        assert!(matches!(sink.close().await, Err(DeliveryError::Closed)));
        assert!(matches!(
            sink.push_result(&RunResult::default()).await,
            Err(DeliveryError::Closed)
        ));
    }

    #[test]
    fn test_live_message_serializes_untagged() {
        let value = serde_json::to_value(LiveMessage::Result(RunResult {
            succeeded: true,
            ..RunResult::default()
        }))
        .unwrap();
        assert_eq!(value["Success"], true);
    }
}
