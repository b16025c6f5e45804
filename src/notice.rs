//! User-facing notices
//!
//! Success and error notifications emitted by the record gate and the token
//! issuer. A banner clears itself after a fixed delay; a toast stays until
//! dismissed. Expiry is evaluated against an explicit instant.

use std::time::{Duration, Instant};

/// Default lifetime of a banner notice.
pub const DEFAULT_BANNER_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Where a notice is shown, which decides how long it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeChannel {
    /// Inline alert that clears itself after the board's TTL
    Banner,
    /// Toast that persists until dismissed
    Toast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub level: NoticeLevel,
    pub channel: NoticeChannel,
    pub message: String,
    pub posted_at: Instant,
}

impl Notice {
    fn is_active(&self, now: Instant, ttl: Duration) -> bool {
        match self.channel {
            NoticeChannel::Toast => true,
            NoticeChannel::Banner => now.saturating_duration_since(self.posted_at) < ttl,
        }
    }
}

/// Collection of posted notices.
#[derive(Debug, Clone)]
pub struct NoticeBoard {
    notices: Vec<Notice>,
    next_id: u64,
    banner_ttl: Duration,
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new(DEFAULT_BANNER_TTL)
    }
}

impl NoticeBoard {
    pub fn new(banner_ttl: Duration) -> Self {
        Self {
            notices: Vec::new(),
            next_id: 1,
            banner_ttl,
        }
    }

    /// Post a notice; returns its id.
    pub fn post(
        &mut self,
        level: NoticeLevel,
        channel: NoticeChannel,
        message: impl Into<String>,
        now: Instant,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.notices.push(Notice {
            id,
            level,
            channel,
            message: message.into(),
            posted_at: now,
        });
        id
    }

    /// Remove a notice. Returns false if it was not posted or already gone.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.notices.len();
        self.notices.retain(|n| n.id != id);
        self.notices.len() != before
    }

    /// Drop every notice of the given level (used before a new attempt).
    pub fn clear_level(&mut self, level: NoticeLevel) {
        self.notices.retain(|n| n.level != level);
    }

    /// Notices visible at `now`; expired banners are pruned.
    pub fn active(&mut self, now: Instant) -> Vec<Notice> {
        let ttl = self.banner_ttl;
        self.notices.retain(|n| n.is_active(now, ttl));
        self.notices.clone()
    }
}
