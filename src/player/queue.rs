//! Play queue management.

use std::sync::Arc;

use crate::model::SharedSong;
use crate::store::QueueRecord;

/// The play queue with current position tracking.
///
/// The index may point one past the end after the current song was
/// removed; there is then no current song.
#[derive(Debug, Clone, Default)]
pub struct PlayQueue {
    songs: Vec<SharedSong>,
    index: usize,
}

impl PlayQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a queue from restored songs.
    pub fn from_songs(songs: Vec<SharedSong>, index: usize) -> Self {
        let index = index.min(songs.len().saturating_sub(1));
        Self { songs, index }
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn songs(&self) -> &[SharedSong] {
        &self.songs
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Get the current song.
    pub fn current(&self) -> Option<&SharedSong> {
        self.songs.get(self.index)
    }

    /// Insert `song` at `at`, or append it.
    ///
    /// Inserting at or before the current position shifts the current song
    /// down, so the index now points at the new song.
    pub fn add(&mut self, song: SharedSong, at: Option<usize>) {
        let at = at.unwrap_or(self.songs.len()).min(self.songs.len());
        self.songs.insert(at, song);
    }

    /// Remove the song at `index`.
    pub fn remove(&mut self, index: usize) -> Option<SharedSong> {
        if index >= self.songs.len() {
            return None;
        }

        let song = self.songs.remove(index);
        if index < self.index {
            self.index -= 1;
        }
        Some(song)
    }

    /// Move a song from one position to another, keeping the current song
    /// current.
    pub fn move_item(&mut self, from: usize, to: usize) {
        if from >= self.songs.len() || to >= self.songs.len() || from == to {
            return;
        }

        let song = self.songs.remove(from);
        self.songs.insert(to, song);

        let pos = self.index;
        if from == pos {
            self.index = to;
        } else if from < pos && to >= pos {
            self.index -= 1;
        } else if from > pos && to <= pos {
            self.index += 1;
        }
    }

    /// Make `index` the current position. Out of range is ignored.
    pub fn select(&mut self, index: usize) -> Option<&SharedSong> {
        if index >= self.songs.len() {
            return None;
        }
        self.index = index;
        self.current()
    }

    pub fn has_next(&self) -> bool {
        self.songs.len() > self.index + 1
    }

    pub fn has_previous(&self) -> bool {
        self.index > 0
    }

    /// Advance to the next song. Stays put at the end.
    pub fn skip_next(&mut self) -> Option<&SharedSong> {
        if !self.has_next() {
            return None;
        }
        self.index += 1;
        self.current()
    }

    /// Go back to the previous song. Stays put at the start.
    pub fn skip_previous(&mut self) -> Option<&SharedSong> {
        if !self.has_previous() {
            return None;
        }
        self.index -= 1;
        self.current()
    }

    /// Position of the song handle in the queue.
    pub fn position_of(&self, song: &SharedSong) -> Option<usize> {
        self.songs.iter().position(|s| Arc::ptr_eq(s, song))
    }

    pub fn clear(&mut self) {
        self.songs.clear();
        self.index = 0;
    }

    /// Persistable form: song keys and the current index.
    pub fn to_record(&self) -> QueueRecord {
        QueueRecord {
            songs: self.songs.iter().map(|song| song.read().key()).collect(),
            index: self.index,
        }
    }
}
