//!
//! meditations playback control
//! ----------------------------
//! Listening-side state for a list of meditations. A `PlaybackSlot` owns at
//! most one active audio handle, so starting a second item always stops the
//! first. `Scrubber` is the single-track elapsed/total model with
//! proportional click seeking.
//!
//! The server pages render their initial time labels from `Scrubber`, and
//! their inline player script follows the same single-flight and `m:ss`
//! rules in the browser.

use tracing::debug;
use uuid::Uuid;

/// A playable stream. Implemented by whatever actually produces sound.
pub trait AudioHandle {
    fn play(&mut self);
    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing(Uuid),
}

/// Single-flight playback: holds the one active `(id, handle)` pair.
pub struct PlaybackSlot<H: AudioHandle> {
    active: Option<(Uuid, H)>,
}

impl<H: AudioHandle> Default for PlaybackSlot<H> {
    fn default() -> Self { Self { active: None } }
}

impl<H: AudioHandle> PlaybackSlot<H> {
    pub fn new() -> Self { Self::default() }

    pub fn playing_id(&self) -> Option<Uuid> { self.active.as_ref().map(|(id, _)| *id) }

    pub fn state(&self) -> PlaybackState {
        match self.playing_id() {
            Some(id) => PlaybackState::Playing(id),
            None => PlaybackState::Idle,
        }
    }

    /// Toggle `id`: stop it if it is playing, otherwise stop the current
    /// handle and start a fresh one from `open`.
    pub fn toggle<F>(&mut self, id: Uuid, open: F) -> PlaybackState
    where
        F: FnOnce() -> H,
    {
        if let Some((current, mut handle)) = self.active.take() {
            handle.stop();
            if current == id {
                debug!(target: "playback", %id, "stopped");
                return PlaybackState::Idle;
            }
        }
        let mut handle = open();
        handle.play();
        self.active = Some((id, handle));
        debug!(target: "playback", %id, "playing");
        PlaybackState::Playing(id)
    }

    /// Natural end of stream. Stale ids are ignored.
    pub fn on_ended(&mut self, id: Uuid) -> PlaybackState {
        if self.playing_id() == Some(id) {
            self.active = None;
        }
        self.state()
    }

    pub fn stop_all(&mut self) {
        if let Some((_, mut handle)) = self.active.take() {
            handle.stop();
        }
    }
}

/// Elapsed/total time for one track. `duration` is `None` until known.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Scrubber {
    pub position: f64,
    pub duration: Option<f64>,
}

impl Scrubber {
    pub fn new() -> Self { Self::default() }

    fn known_duration(&self) -> Option<f64> { self.duration.filter(|d| d.is_finite() && *d > 0.0) }

    pub fn set_duration(&mut self, secs: f64) { self.duration = Some(secs); }

    pub fn set_position(&mut self, secs: f64) { self.position = secs; }

    /// Seek to `ratio × duration` where ratio comes from a click on the track.
    /// No-op while the duration is unknown or the track has no width.
    pub fn seek_by_click(&mut self, click_x: f64, track_left: f64, track_width: f64) -> f64 {
        let Some(duration) = self.known_duration() else { return self.position; };
        if track_width <= 0.0 { return self.position; }
        let ratio = (click_x - track_left) / track_width;
        self.position = (ratio * duration).clamp(0.0, duration);
        self.position
    }

    pub fn progress_percent(&self) -> f64 {
        match self.known_duration() {
            Some(d) => (self.position / d * 100.0).clamp(0.0, 100.0),
            None => 0.0,
        }
    }

    pub fn elapsed_label(&self) -> String { format_time(self.position) }

    pub fn total_label(&self) -> String {
        match self.known_duration() {
            Some(d) => format_time(d),
            None => "--:--".to_string(),
        }
    }
}

/// `m:ss` with zero-padded seconds.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds.floor() as u64 } else { 0 };
    format!("{}:{:02}", total / 60, total % 60)
}
