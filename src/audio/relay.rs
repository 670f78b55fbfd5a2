//! Bounded relay queue between the capture path and the network sender.
//!
//! The queue exists so the latency-critical audio loop never blocks on
//! network conditions: enqueue is non-blocking and a full queue drops the
//! frame instead of backpressuring the producer. Items are copied by value so
//! the capture buffer can be reused immediately after enqueue.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// One queued frame: 16-bit little-endian PCM bytes, capped at the
/// configured maximum item size.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayFrame {
    pcm: Vec<u8>,
}

impl RelayFrame {
    /// Copy a PCM frame into an owned relay item.
    ///
    /// Returns `None` when the frame would exceed `max_bytes`; the caller
    /// logs and drops, it never truncates audio mid-frame.
    pub fn from_pcm(samples: &[i16], max_bytes: usize) -> Option<Self> {
        if samples.len() * 2 > max_bytes {
            return None;
        }
        let mut pcm = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
        Some(Self { pcm })
    }

    pub fn len(&self) -> usize {
        self.pcm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    /// The queued bytes as i16 samples again.
    pub fn samples(&self) -> Vec<i16> {
        self.pcm
            .chunks_exact(2)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
            .collect()
    }
}

/// Producer half, used from the capture/fetcher thread only.
#[derive(Clone)]
pub struct RelaySender {
    tx: mpsc::Sender<RelayFrame>,
}

impl RelaySender {
    /// Non-blocking enqueue. Returns `false` when the queue is full (the
    /// frame is dropped) or the consumer is gone.
    pub fn try_enqueue(&self, frame: RelayFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Create the bounded relay channel. The receiver goes to the single sender
/// task; FIFO order is preserved for every frame that is accepted.
pub fn channel(depth: usize) -> (RelaySender, mpsc::Receiver<RelayFrame>) {
    let (tx, rx) = mpsc::channel(depth);
    (RelaySender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_respects_max_size() {
        assert!(RelayFrame::from_pcm(&[0i16; 100], 200).is_some());
        assert!(RelayFrame::from_pcm(&[0i16; 101], 200).is_none());
    }

    #[test]
    fn frame_round_trips_samples() {
        let frame = RelayFrame::from_pcm(&[1, -2, 32767, -32768], 64).unwrap();
        assert_eq!(frame.len(), 8);
        assert_eq!(frame.samples(), vec![1, -2, 32767, -32768]);
    }

    #[test]
    fn fifth_enqueue_on_depth_four_fails() {
        let (tx, mut rx) = channel(4);

        for i in 0..4i16 {
            let frame = RelayFrame::from_pcm(&[i], 16).unwrap();
            assert!(tx.try_enqueue(frame), "enqueue {} should succeed", i);
        }

        // 队列满，第五次入队立即失败，不阻塞
        let overflow = RelayFrame::from_pcm(&[4i16], 16).unwrap();
        assert!(!tx.try_enqueue(overflow));

        // The retained items are the first four, in arrival order.
        for i in 0..4i16 {
            let frame = rx.try_recv().expect("queue should hold four items");
            assert_eq!(frame.samples(), vec![i]);
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn enqueue_fails_after_consumer_drops() {
        let (tx, rx) = channel(2);
        drop(rx);
        assert!(!tx.try_enqueue(RelayFrame::from_pcm(&[1i16], 16).unwrap()));
    }
}
