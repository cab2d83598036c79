//! Fixed-rate resampling of an irregular frame feed.
//!
//! The capture side overwrites a single-slot mailbox with each frame it
//! admits. Independently, a timer task wakes every `1000 / fps` ms and writes
//! whatever frame the mailbox holds to the encoder input, repeating the last
//! frame when nothing new arrived. Nothing is written until the first frame
//! lands.

use super::FrameWriter;
use crate::messages::{FrameBytes, RecorderEvent};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Span;

/// Frame admitted from the capture feed
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CapturedFrame {
    pub payload: FrameBytes,
    pub timestamp: f64,
    /// Admission order, used to tell a repeat from a new frame
    pub sequence: u64,
}

/// What one timer tick writes
#[derive(Debug, Clone, PartialEq)]
struct Tick {
    frame: CapturedFrame,
    /// First time this frame is written
    fresh: bool,
}

#[derive(Debug, Default)]
struct Resampler {
    last_sequence: Option<u64>,
}

impl Resampler {
    fn new() -> Self {
        Self::default()
    }

    fn tick(&mut self, latest: Option<&CapturedFrame>) -> Option<Tick> {
        let frame = latest?.clone();
        let fresh = self.last_sequence != Some(frame.sequence);
        self.last_sequence = Some(frame.sequence);
        Some(Tick { frame, fresh })
    }
}

pub(crate) struct ResamplerHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ResamplerHandle {
    /// Stop the timer and wait until no further write can happen
    pub(crate) async fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!("Resampler task failed: {}", e);
        }
    }
}

/// Spawn the timer task writing `mailbox` to `writer` every `period`.
///
/// Each write is mirrored to `tap`; a `Frame` event goes to `events` the
/// first time a given frame is written.
pub(crate) fn spawn_resampler(
    period: Duration,
    mailbox: watch::Receiver<Option<CapturedFrame>>,
    writer: FrameWriter,
    tap: broadcast::Sender<FrameBytes>,
    events: broadcast::Sender<RecorderEvent>,
    span: Span,
) -> ResamplerHandle {
    let (cancel, mut cancelled) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let mut resampler = Resampler::new();
        let mut interval = tokio::time::interval(period);

        loop {
            tokio::select! {
                biased;
                _ = &mut cancelled => break,
                _ = interval.tick() => {}
            }

            let latest = mailbox.borrow().clone();
            let Some(Tick { frame, fresh }) = resampler.tick(latest.as_ref()) else {
                continue;
            };

            let sent = tokio::select! {
                biased;
                _ = &mut cancelled => break,
                sent = writer.send(frame.payload.clone()) => sent,
            };
            if sent.is_err() {
                tracing::debug!(parent: &span, "Encoder input closed, stopping resampler");
                break;
            }

            let _ = tap.send(frame.payload.clone());
            if fresh {
                let _ = events.send(RecorderEvent::Frame {
                    data: frame.payload,
                    timestamp: frame.timestamp,
                });
            }
        }

        tracing::debug!(parent: &span, "Resampler stopped");
    });

    ResamplerHandle {
        cancel: Some(cancel),
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::frame_buffer;

    fn captured(sequence: u64, timestamp: f64) -> CapturedFrame {
        CapturedFrame {
            payload: FrameBytes::from(vec![sequence as u8]),
            timestamp,
            sequence,
        }
    }

    #[test]
    fn test_ticks_echo_latest_frame() {
        // 10 fps for one second; frames arrive at 0ms, 250ms and 900ms
        let arrivals = [(0u64, captured(0, 0.0)), (250, captured(1, 0.25)), (900, captured(2, 0.9))];
        let mut resampler = Resampler::new();
        let mut latest: Option<CapturedFrame> = None;
        let mut writes = Vec::new();

        for tick in 0..10u64 {
            let now = tick * 100;
            for (at, frame) in &arrivals {
                if *at <= now {
                    latest = Some(frame.clone());
                }
            }
            if let Some(tick) = resampler.tick(latest.as_ref()) {
                writes.push(tick);
            }
        }

        assert_eq!(writes.len(), 10);
        let sequences: Vec<u64> = writes.iter().map(|t| t.frame.sequence).collect();
        assert_eq!(sequences, vec![0, 0, 0, 1, 1, 1, 1, 1, 1, 2]);
        let fresh: Vec<usize> = writes
            .iter()
            .enumerate()
            .filter(|(_, t)| t.fresh)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(fresh, vec![0, 3, 9]);
    }

    #[test]
    fn test_nothing_before_first_frame() {
        let mut resampler = Resampler::new();
        assert!(resampler.tick(None).is_none());
        assert!(resampler.tick(Some(&captured(4, 1.0))).unwrap().fresh);
        assert!(!resampler.tick(Some(&captured(4, 1.0))).unwrap().fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_cadence_ignores_feed_cadence() {
        let (mailbox, latest) = watch::channel(Some(captured(0, 0.0)));
        let (writer, mut reader) = frame_buffer();
        let (tap, mut tapped) = broadcast::channel(64);
        let (events, mut frame_events) = broadcast::channel(64);

        let handle = spawn_resampler(
            Duration::from_millis(100),
            latest,
            writer,
            tap,
            events,
            Span::none(),
        );

        let feeder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            mailbox.send_replace(Some(captured(1, 0.25)));
            tokio::time::sleep(Duration::from_millis(645)).await;
            mailbox.send_replace(Some(captured(2, 0.895)));
            mailbox
        });

        tokio::time::sleep(Duration::from_millis(950)).await;
        handle.cancel().await;
        let _mailbox = feeder.await.unwrap();

        let mut writes = Vec::new();
        while let Ok(frame) = reader.try_recv() {
            writes.push(frame[0]);
        }
        assert!((9..=11).contains(&writes.len()), "got {} writes", writes.len());
        assert_eq!(writes.first(), Some(&0));
        assert_eq!(writes.last(), Some(&2));
        assert!(writes.windows(2).all(|w| w[0] <= w[1]));

        let mut tapped_count = 0;
        while tapped.try_recv().is_ok() {
            tapped_count += 1;
        }
        assert_eq!(tapped_count, writes.len());

        let mut timestamps = Vec::new();
        while let Ok(RecorderEvent::Frame { timestamp, .. }) = frame_events.try_recv() {
            timestamps.push(timestamp);
        }
        assert_eq!(timestamps, vec![0.0, 0.25, 0.895]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_writes_without_frames() {
        let (_mailbox, latest) = watch::channel(None);
        let (writer, mut reader) = frame_buffer();
        let (tap, _) = broadcast::channel(8);
        let (events, _) = broadcast::channel(8);

        let handle = spawn_resampler(
            Duration::from_millis(100),
            latest,
            writer,
            tap,
            events,
            Span::none(),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel().await;

        assert!(reader.try_recv().is_err());
    }
}
