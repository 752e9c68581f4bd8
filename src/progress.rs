//! Progress bar display for installer runs

use indicatif::{ProgressBar, ProgressStyle};

/// Progress display for an installation run
pub struct ProgressDisplay {
    /// Main progress bar over the operation batch
    operation_pb: ProgressBar,
    /// Optional download progress bar (shown while archives are fetched)
    download_pb: Option<ProgressBar>,
}

impl ProgressDisplay {
    /// Create a new progress display with total operation count
    pub fn new(total_operations: u64) -> Self {
        let operation_style = ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        let operation_pb = ProgressBar::new(total_operations);
        operation_pb.set_style(operation_style);

        Self {
            operation_pb,
            download_pb: None,
        }
    }

    /// Initialize download progress bar with total archive count
    pub fn init_download_progress(&mut self, total_archives: u64) {
        let download_style = ProgressStyle::default_bar()
            .template("  [{bar:40.green/yellow}] {pos}/{len} archives {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ");

        let download_pb = ProgressBar::new(total_archives);
        download_pb.set_style(download_style);
        self.download_pb = Some(download_pb);
    }

    /// Update to show the operation currently executing
    pub fn update_operation(&self, description: &str, current: usize, total: usize) {
        let msg = format!("({}/{}) {}", current, total, description);
        self.operation_pb.set_message(msg);
    }

    /// Increment operation progress
    pub fn inc_operation(&self) {
        self.operation_pb.inc(1);
    }

    /// Update download progress
    pub fn update_download(&self, archive: &str) {
        if let Some(ref download_pb) = self.download_pb {
            download_pb.set_message(truncate_name(archive, 50));
            download_pb.inc(1);
        }
    }

    /// Finish download progress
    pub fn finish_downloads(&self) {
        if let Some(ref download_pb) = self.download_pb {
            download_pb.finish();
        }
    }

    /// Finish the whole display
    pub fn finish(&self) {
        if let Some(ref download_pb) = self.download_pb {
            download_pb.finish();
        }
        self.operation_pb.finish();
    }

    /// Abandon on error
    pub fn abandon(&self) {
        if let Some(ref download_pb) = self.download_pb {
            download_pb.abandon();
        }
        self.operation_pb.abandon();
    }
}

/// Keep the tail of long names for display, counting characters rather
/// than bytes so multi-byte names never split mid-character
fn truncate_name(name: &str, max_chars: usize) -> String {
    let count = name.chars().count();
    if count <= max_chars {
        return name.to_string();
    }
    let tail: String = name.chars().skip(count - (max_chars - 3)).collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_names_pass_through() {
        assert_eq!(truncate_name("core-1.0.zip", 50), "core-1.0.zip");
    }

    #[test]
    fn test_long_names_keep_the_tail() {
        let name = "a".repeat(60);
        let truncated = truncate_name(&name, 50);
        assert_eq!(truncated.chars().count(), 50);
        assert!(truncated.starts_with("..."));
    }

    #[test]
    fn test_multibyte_names_truncate_on_character_boundaries() {
        let name = "ü".repeat(60);
        let truncated = truncate_name(&name, 50);
        assert_eq!(truncated, format!("...{}", "ü".repeat(47)));
    }

    #[test]
    fn test_update_download_accepts_multibyte_names() {
        let mut display = ProgressDisplay::new(0);
        display.init_download_progress(1);
        display.update_download(&format!("https://repo.example/{}", "日本語".repeat(30)));
        display.finish_downloads();
    }
}
