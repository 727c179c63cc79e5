//! Fire-and-forget announcement sink (text-to-speech on the real robot).

use tracing::info;

/// Something that can say a line of text to the people around the robot.
///
/// Calls must return promptly; slow speech engines should queue internally.
pub trait Announcer: Send + Sync {
    fn announce(&self, text: &str);
}

/// Discards every announcement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAnnouncer;

impl Announcer for NoopAnnouncer {
    fn announce(&self, _text: &str) {}
}

/// Writes announcements to the log under the `announce` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAnnouncer;

impl Announcer for LogAnnouncer {
    fn announce(&self, text: &str) {
        info!(target: "announce", "robot says: {text}");
    }
}
