//! Table announcements and which one is on display.

use std::collections::VecDeque;

use crate::net::messages::Announcement;

/// Announcements kept after they stop being displayed.
pub const MAX_HISTORY: usize = 50;

/// Holds the displayed announcement plus a bounded history.
///
/// A new announcement replaces the displayed one when its priority is at
/// least as high; equal priorities resolve to the later arrival. Lower
/// priorities go straight to history.
#[derive(Debug, Default)]
pub struct AnnouncementBoard {
    active: Option<Announcement>,
    history: VecDeque<Announcement>,
}

impl AnnouncementBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the announcement is now the displayed one.
    pub fn post(&mut self, announcement: Announcement) -> bool {
        if let Some(active) = &self.active
            && active.id == announcement.id
        {
            self.active = Some(announcement);
            return true;
        }

        let displaces = self
            .active
            .as_ref()
            .is_none_or(|active| announcement.priority >= active.priority);

        if displaces {
            if let Some(previous) = self.active.replace(announcement) {
                self.remember(previous);
            }
        } else {
            self.remember(announcement);
        }
        displaces
    }

    /// Stop displaying the current announcement.
    pub fn dismiss(&mut self) -> Option<Announcement> {
        let dismissed = self.active.take()?;
        self.remember(dismissed.clone());
        Some(dismissed)
    }

    pub fn active(&self) -> Option<&Announcement> {
        self.active.as_ref()
    }

    /// Oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Announcement> {
        self.history.iter()
    }

    fn remember(&mut self, announcement: Announcement) {
        if self.history.len() == MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(announcement);
    }
}
