//! Progress reporting utilities using indicatif.
//!
//! This module provides the [`Progress`] struct which implements [`ProgressCallback`]
//! to display progress bars in the terminal while hashing and copying.
//!
//! Hashing runs on a worker pool, so items finish out of order. Bars are
//! advanced by [`ProgressCallback::on_item_completed`], and
//! [`ProgressCallback::on_progress`] only updates the message.

use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Progress callback for pipeline phases.
///
/// Implement this trait to receive progress updates while files are
/// hashed (`"prehash"`, `"fullhash"`) or copied (`"copy"`).
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (e.g., "prehash", "fullhash", "copy")
    /// * `total` - Total number of items to process
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called when an item starts processing.
    ///
    /// # Arguments
    ///
    /// * `current` - Position of the item in its batch (1-based)
    /// * `path` - Path being processed
    fn on_progress(&self, current: usize, path: &str);

    /// Called when an item has been processed, providing its size.
    fn on_item_completed(&self, _bytes: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called to update the progress message.
    fn on_message(&self, _message: &str) {}
}

/// Progress reporter using indicatif.
///
/// One bar is shown per running phase.
pub struct Progress {
    multi: MultiProgress,
    active: Mutex<Option<(String, ProgressBar)>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter. A quiet reporter draws nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use lakediff::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            active: Mutex::new(None),
            quiet,
        }
    }

    fn style(phase: &str) -> ProgressStyle {
        let template = match phase {
            "fullhash" | "copy" => {
                "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} ({percent}%) {msg} {per_sec} (ETA: {eta})"
            }
            _ => "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        };
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
    }

    fn label(phase: &str) -> String {
        match phase {
            "prehash" => "Prefix hashing".to_string(),
            "fullhash" => "Full hashing".to_string(),
            "copy" => "Copying".to_string(),
            other => other.to_string(),
        }
    }

    fn with_bar<F: FnOnce(&ProgressBar)>(&self, f: F) {
        if let Ok(active) = self.active.lock() {
            if let Some((_, ref pb)) = *active {
                f(pb);
            }
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        let pb = self.multi.add(ProgressBar::new(total as u64));
        pb.set_style(Self::style(phase));
        pb.set_message(Self::label(phase));
        if let Ok(mut active) = self.active.lock() {
            if let Some((_, previous)) = active.replace((phase.to_string(), pb)) {
                previous.finish_and_clear();
            }
        }
    }

    fn on_progress(&self, _current: usize, path: &str) {
        if self.quiet {
            return;
        }
        let message = truncate_path(path, 30);
        self.with_bar(|pb| pb.set_message(message));
    }

    fn on_item_completed(&self, _bytes: u64) {
        if self.quiet {
            return;
        }
        self.with_bar(|pb| pb.inc(1));
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }

        if let Ok(mut active) = self.active.lock() {
            let matches = active.as_ref().is_some_and(|(name, _)| name == phase);
            if matches {
                if let Some((_, pb)) = active.take() {
                    pb.finish_with_message(format!("{} complete", Self::label(phase)));
                }
            }
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }
        let message = message.to_string();
        self.with_bar(|pb| pb.set_message(message));
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len >= max_len {
        let tail: String = file_name.chars().skip(name_len + 3 - max_len).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
