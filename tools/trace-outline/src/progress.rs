//! Progress display for the command line
//!
//! Bars draw on stderr and hide themselves when stderr is not a terminal.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Spinner for a stage of unknown length
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Bar counting written features
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Stage spinners and the write bar, or nothing when progress is off
pub struct ProgressManager {
    enabled: bool,
}

impl ProgressManager {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn stage(&self, message: &str) -> ProgressBar {
        if self.enabled {
            create_spinner(message)
        } else {
            ProgressBar::hidden()
        }
    }

    pub fn writes(&self, total: u64) -> ProgressBar {
        if self.enabled {
            create_progress_bar(total)
        } else {
            ProgressBar::hidden()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_progress_bar_template() {
        let pb = create_progress_bar(12);
        assert_eq!(pb.length().unwrap(), 12);
        pb.inc(5);
        assert_eq!(pb.position(), 5);
        pb.finish();
    }

    #[test]
    fn test_disabled_manager_is_hidden() {
        let manager = ProgressManager::new(false);
        assert!(manager.stage("tracing").is_hidden());
        let pb = manager.writes(3);
        assert!(pb.is_hidden());
        pb.inc(1);
    }
}
