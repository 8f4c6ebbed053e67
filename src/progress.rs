//! Progress reporting for a run.
//!
//! The pipeline only emits signals through [`ProgressSink`]; whether they
//! end up as terminal bars or nowhere is the caller's choice.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Receiver of progress signals. Called concurrently from every pipeline thread.
pub trait ProgressSink: Send + Sync {
    /// `units` more messages are expected.
    fn add_work(&self, units: u64);

    /// `units` messages went through the indexer.
    fn complete(&self, units: u64);

    /// `units` previously announced messages will never arrive.
    fn withdraw_work(&self, _units: u64) {}

    /// Discovery found `count` mailboxes.
    fn mailboxes_discovered(&self, _count: u64) {}

    /// A fetch worker finished with `mailbox`, successfully or not.
    fn mailbox_finished(&self, _mailbox: &str) {}

    /// The run is over.
    fn finish(&self) {}
}

/// Discards every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn add_work(&self, _units: u64) {}
    fn complete(&self, _units: u64) {}
}

/// Two stacked terminal bars: mailboxes fetched and messages indexed.
pub struct TerminalProgress {
    _multi: MultiProgress,
    mailboxes: ProgressBar,
    messages: ProgressBar,
}

impl TerminalProgress {
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let mailboxes = multi.add(ProgressBar::new(0));
        mailboxes.set_style(
            ProgressStyle::default_bar()
                .template("{elapsed_precise} Mailboxes [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("valid template")
                .progress_chars("#>-"),
        );

        let messages = multi.add(ProgressBar::new(0));
        messages.set_style(
            ProgressStyle::default_bar()
                .template("{elapsed_precise} Indexing  [{bar:40.green/blue}] {pos}/{len} ({eta})")
                .expect("valid template")
                .progress_chars("#>-"),
        );

        Self {
            _multi: multi,
            mailboxes,
            messages,
        }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn add_work(&self, units: u64) {
        self.messages.inc_length(units);
    }

    fn complete(&self, units: u64) {
        self.messages.inc(units);
    }

    fn withdraw_work(&self, units: u64) {
        let length = self.messages.length().unwrap_or(0);
        self.messages.set_length(length.saturating_sub(units));
    }

    fn mailboxes_discovered(&self, count: u64) {
        self.mailboxes.inc_length(count);
    }

    fn mailbox_finished(&self, mailbox: &str) {
        self.mailboxes.set_message(mailbox.to_string());
        self.mailboxes.inc(1);
    }

    fn finish(&self) {
        self.mailboxes.finish_with_message("done");
        self.messages.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_progress_counts() {
        let progress = TerminalProgress::new();
        progress.mailboxes_discovered(3);
        progress.add_work(5);
        progress.add_work(2);
        progress.complete(4);
        progress.mailbox_finished("INBOX");

        assert_eq!(progress.messages.length(), Some(7));
        assert_eq!(progress.messages.position(), 4);
        assert_eq!(progress.mailboxes.length(), Some(3));
        assert_eq!(progress.mailboxes.position(), 1);
    }

    #[test]
    fn test_withdrawn_work_shortens_bar() {
        let progress = TerminalProgress::new();
        progress.add_work(10);
        progress.complete(6);
        progress.withdraw_work(4);
        assert_eq!(progress.messages.length(), Some(6));
        assert_eq!(progress.messages.position(), 6);

        progress.withdraw_work(100);
        assert_eq!(progress.messages.length(), Some(0));
    }
}
