//! Implements an asynchronous heartbeat

use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;

pin_project! {
    /// Ticks every half of the peer's idle timeout, or never if the peer has none
    #[derive(Debug)]
    pub struct HeartBeat {
        #[pin]
        interval: Option<IntervalStream>,
    }
}

impl HeartBeat {
    /// A [`HeartBeat`] that never ticks
    pub fn never() -> Self {
        Self { interval: None }
    }

    /// A [`HeartBeat`] that ticks every `period`, starting one period from now
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval: Some(IntervalStream::new(interval)),
        }
    }

    /// Heartbeat for the idle-time-out the peer announced in its open, in milliseconds
    ///
    /// Empty frames are sent at half the peer's timeout so one late frame does not expire it.
    pub fn for_remote_idle_timeout(idle_time_out: Option<u32>) -> Self {
        match idle_time_out {
            Some(millis) if millis > 0 => {
                let period = Duration::from_millis(u64::from(millis) / 2).max(Duration::from_millis(1));
                Self::new(period)
            }
            _ => Self::never(),
        }
    }

    /// Whether the heartbeat ever ticks
    pub fn is_never(&self) -> bool {
        self.interval.is_none()
    }
}

impl Stream for HeartBeat {
    type Item = Instant;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.project().interval.as_pin_mut() {
            Some(stream) => stream.poll_next(cx),
            None => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::StreamExt;
    use tokio::time::Instant;

    use super::HeartBeat;

    #[test]
    fn zero_idle_timeout_disables_heartbeat() {
        assert!(HeartBeat::for_remote_idle_timeout(None).is_never());
        assert!(HeartBeat::for_remote_idle_timeout(Some(0)).is_never());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_half_the_remote_idle_timeout() {
        let start = Instant::now();
        let mut heartbeat = HeartBeat::for_remote_idle_timeout(Some(10_000));
        let first = heartbeat.next().await.unwrap();
        assert_eq!(first - start, Duration::from_secs(5));
        let second = heartbeat.next().await.unwrap();
        assert_eq!(second - first, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn never_stays_pending() {
        let mut heartbeat = HeartBeat::never();
        let ticked = tokio::time::timeout(Duration::from_secs(60), heartbeat.next()).await;
        assert!(ticked.is_err());
    }
}
