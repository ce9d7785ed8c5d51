//! Driver/operator notices and the bounded channel that carries them from the
//! core to the host's [`Notifier`](crate::interfaces::Notifier).

use crate::interfaces::Notifier;
use heapless::Deque;
use serde::{Deserialize, Serialize};

pub const MAX_PENDING_NOTICES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub tick: u64,
    pub level: NoticeLevel,
    pub car_id: Option<String>,
    pub message: String,
}

/// Fire-and-forget queue. Pushing never blocks: when full the oldest notice
/// is dropped and counted.
#[derive(Debug, Default)]
pub struct NoticeChannel {
    queue: Deque<Notice, MAX_PENDING_NOTICES>,
    tick: u64,
    dropped: u32,
}

impl NoticeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps every notice pushed from now on with `tick`.
    pub fn begin_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    pub fn push(&mut self, level: NoticeLevel, car_id: Option<&str>, message: impl Into<String>) {
        let notice = Notice {
            tick: self.tick,
            level,
            car_id: car_id.map(str::to_owned),
            message: message.into(),
        };

        if self.queue.is_full() {
            self.queue.pop_front();
            self.dropped = self.dropped.saturating_add(1);
        }
        let _ = self.queue.push_back(notice);
    }

    pub fn info(&mut self, car_id: Option<&str>, message: impl Into<String>) {
        self.push(NoticeLevel::Info, car_id, message);
    }

    pub fn warning(&mut self, car_id: Option<&str>, message: impl Into<String>) {
        self.push(NoticeLevel::Warning, car_id, message);
    }

    pub fn error(&mut self, car_id: Option<&str>, message: impl Into<String>) {
        self.push(NoticeLevel::Error, car_id, message);
    }

    pub fn emergency(&mut self, car_id: Option<&str>, message: impl Into<String>) {
        self.push(NoticeLevel::Emergency, car_id, message);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.queue.iter()
    }

    pub fn drain(&mut self) -> Vec<Notice> {
        let mut drained = Vec::with_capacity(self.queue.len());
        while let Some(notice) = self.queue.pop_front() {
            drained.push(notice);
        }
        drained
    }

    /// Hands every pending notice to `notifier`, oldest first.
    pub fn drain_into(&mut self, notifier: &mut dyn Notifier) -> usize {
        let mut delivered = 0;
        while let Some(notice) = self.queue.pop_front() {
            notifier.deliver(&notice);
            delivered += 1;
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notices_are_stamped_with_tick() {
        let mut channel = NoticeChannel::new();
        channel.begin_tick(7);
        channel.warning(Some("car-1"), "Doors fault");

        let notices = channel.drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].tick, 7);
        assert_eq!(notices[0].car_id.as_deref(), Some("car-1"));
        assert!(channel.is_empty());
    }

    #[test]
    fn test_full_channel_drops_oldest() {
        let mut channel = NoticeChannel::new();
        for i in 0..(MAX_PENDING_NOTICES + 3) {
            channel.info(None, format!("notice {}", i));
        }

        assert_eq!(channel.len(), MAX_PENDING_NOTICES);
        assert_eq!(channel.dropped(), 3);
        let first = channel.iter().next().map(|n| n.message.clone());
        assert_eq!(first.as_deref(), Some("notice 3"));
    }
}
