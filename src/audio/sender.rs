//! The network sender task: drains the relay queue toward the transport.
//!
//! Sole consumer of the relay queue. Frames dequeued while the link is down
//! are silently discarded — retrying stale audio is not useful.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::net_link::NetCommand;

use super::relay::RelayFrame;
use super::transform;

pub async fn run_sender(
    mut relay_rx: mpsc::Receiver<RelayFrame>,
    net_tx: mpsc::Sender<NetCommand>,
    connected: Arc<AtomicBool>,
) {
    let mut sent: u64 = 0;
    let mut discarded: u64 = 0;

    while let Some(frame) = relay_rx.recv().await {
        // 仅当连接时发送，未连接直接丢弃
        if !connected.load(Ordering::Relaxed) {
            discarded += 1;
            continue;
        }

        // 服务器期望 float32 格式（范围 -1.0 到 1.0），发送前转换
        let payload = transform::encode_f32le(&frame.samples());
        if net_tx.send(NetCommand::SendBinary(payload)).await.is_err() {
            log::warn!("Network link gone, stopping sender");
            break;
        }

        sent += 1;
        if sent % 500 == 0 {
            log::debug!("Sender: {} frames forwarded, {} discarded while offline", sent, discarded);
        }
    }

    log::info!("Sender stopped: {} forwarded, {} discarded", sent, discarded);
}
