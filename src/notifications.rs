//! Session notifications: a completion tone and/or a desktop notification.
//!
//! Notifying never blocks the countdown and never fails into the caller.
//! Desktop notifications are only shown once permission has been granted.

use crate::audio::AudioPlayer;
use crate::i18n::Translator;
use notify_rust::Notification;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use thiserror::Error;
use tracing::{debug, warn};

/// Something worth telling the user about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    WorkComplete,
    BreakComplete,
    LongBreakStarting,
    GoalReached,
}

impl NotifyEvent {
    /// Translation key of the notification body.
    pub fn message_key(self) -> &'static str {
        match self {
            Self::WorkComplete => "notifications.workComplete",
            Self::BreakComplete => "notifications.breakComplete",
            Self::LongBreakStarting => "messages.longBreakTime",
            Self::GoalReached => "messages.goalReached",
        }
    }

    /// Only session completions beep; the follow-up events ride along silently.
    pub fn plays_tone(self) -> bool {
        matches!(self, Self::WorkComplete | Self::BreakComplete)
    }
}

/// Which channels the user has enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub sound: bool,
    pub desktop: bool,
}

/// Platform notification permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    /// Not asked yet.
    #[default]
    Default,
    Granted,
    Denied,
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("notification permission denied")]
    PermissionDenied,
    #[error("notification service unavailable: {0}")]
    NotAvailable(String),
    #[error("failed to show notification: {0}")]
    SendFailed(#[from] notify_rust::error::Error),
}

pub trait Notifier {
    /// Fire-and-forget delivery of `event` over the enabled channels.
    fn notify(&self, event: NotifyEvent, delivery: Delivery);

    /// Asks for desktop notification permission. Called once per enabling
    /// action; must not block.
    fn request_permission(&self) {}
}

/// Notifier for headless runs.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, event: NotifyEvent, _delivery: Delivery) {
        debug!(?event, "notification suppressed");
    }
}

type Probe = fn() -> Result<(), NotificationError>;

/// Plays the tone on the calling thread; permission probes and notifications
/// run on background threads.
pub struct DesktopNotifier {
    translator: Translator,
    audio: Option<AudioPlayer>,
    permission: Arc<Mutex<Permission>>,
    probing: Arc<AtomicBool>,
    probe: Probe,
}

impl DesktopNotifier {
    /// Creates a notifier. Audio is optional; without a device only
    /// desktop notifications are delivered.
    pub fn new(translator: Translator) -> Self {
        let audio = match AudioPlayer::new() {
            Ok(player) => Some(player),
            Err(e) => {
                warn!(error = %e, "audio unavailable, completion tones disabled");
                None
            }
        };
        Self::with_parts(translator, audio, probe_notification_service)
    }

    fn with_parts(translator: Translator, audio: Option<AudioPlayer>, probe: Probe) -> Self {
        Self {
            translator,
            audio,
            permission: Arc::new(Mutex::new(Permission::Default)),
            probing: Arc::new(AtomicBool::new(false)),
            probe,
        }
    }

    pub fn permission(&self) -> Permission {
        self.permission
            .lock()
            .map(|permission| *permission)
            .unwrap_or_default()
    }

    fn show(&self, event: NotifyEvent) -> Result<(), NotificationError> {
        match self.permission() {
            Permission::Granted => {}
            Permission::Denied => return Err(NotificationError::PermissionDenied),
            Permission::Default => {
                debug!(?event, "notification permission not requested yet");
                return Ok(());
            }
        }

        let summary = self.translator.translate("app.title");
        let body = self.translator.translate(event.message_key());
        thread::spawn(move || {
            if let Err(e) = Notification::new()
                .summary(&summary)
                .body(&body)
                .show()
            {
                warn!(error = %NotificationError::from(e), "notification dropped");
            }
        });
        Ok(())
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, event: NotifyEvent, delivery: Delivery) {
        if delivery.sound && event.plays_tone() {
            if let Some(ref audio) = self.audio {
                audio.play_tone();
            }
        }

        if delivery.desktop {
            if let Err(e) = self.show(event) {
                debug!(?event, error = %e, "notification skipped");
            }
        }
    }

    fn request_permission(&self) {
        if self.permission() == Permission::Granted {
            return;
        }
        if self.probing.swap(true, Ordering::SeqCst) {
            debug!("notification permission probe already running");
            return;
        }

        let permission = Arc::clone(&self.permission);
        let probing = Arc::clone(&self.probing);
        let probe = self.probe;
        thread::spawn(move || {
            let resolved = match probe() {
                Ok(()) => Permission::Granted,
                Err(e) => {
                    warn!(error = %e, "desktop notifications unavailable");
                    Permission::Denied
                }
            };
            debug!(permission = ?resolved, "notification permission resolved");
            if let Ok(mut current) = permission.lock() {
                *current = resolved;
            }
            probing.store(false, Ordering::SeqCst);
        });
    }
}

/// Checks that a notification server is listening.
#[cfg(all(unix, not(target_os = "macos")))]
fn probe_notification_service() -> Result<(), NotificationError> {
    let info = notify_rust::get_server_information()
        .map_err(|e| NotificationError::NotAvailable(e.to_string()))?;
    debug!(server = %info.name, version = %info.version, "notification server found");
    Ok(())
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn probe_notification_service() -> Result<(), NotificationError> {
    Ok(())
}

/// Notifier that records everything it is asked to deliver.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    events: std::rc::Rc<std::cell::RefCell<Vec<(NotifyEvent, Delivery)>>>,
    permission_requests: std::rc::Rc<std::cell::Cell<u32>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events.borrow().iter().map(|(event, _)| *event).collect()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.events.borrow().iter().map(|(_, d)| *d).collect()
    }

    pub fn count(&self, event: NotifyEvent) -> usize {
        self.events.borrow().iter().filter(|(e, _)| *e == event).count()
    }

    pub fn permission_requests(&self) -> u32 {
        self.permission_requests.get()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn notify(&self, event: NotifyEvent, delivery: Delivery) {
        self.events.borrow_mut().push((event, delivery));
    }

    fn request_permission(&self) {
        self.permission_requests.set(self.permission_requests.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn service_up() -> Result<(), NotificationError> {
        Ok(())
    }

    fn service_down() -> Result<(), NotificationError> {
        Err(NotificationError::NotAvailable("no server".to_string()))
    }

    fn headless_with(permission: Permission, probe: Probe) -> DesktopNotifier {
        let notifier = DesktopNotifier::with_parts(Translator::new("en"), None, probe);
        if let Ok(mut current) = notifier.permission.lock() {
            *current = permission;
        }
        notifier
    }

    fn headless(permission: Permission) -> DesktopNotifier {
        headless_with(permission, service_down)
    }

    /// Waits for the background probe to finish.
    fn settle(notifier: &DesktopNotifier) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while notifier.probing.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "probe never finished");
            thread::sleep(Duration::from_millis(5));
        }
    }

    const ALL: Delivery = Delivery {
        sound: true,
        desktop: true,
    };

    #[test]
    fn test_message_keys() {
        assert_eq!(
            NotifyEvent::WorkComplete.message_key(),
            "notifications.workComplete"
        );
        assert_eq!(
            NotifyEvent::LongBreakStarting.message_key(),
            "messages.longBreakTime"
        );
        assert_eq!(NotifyEvent::GoalReached.message_key(), "messages.goalReached");
    }

    #[test]
    fn test_tone_only_for_completions() {
        assert!(NotifyEvent::WorkComplete.plays_tone());
        assert!(NotifyEvent::BreakComplete.plays_tone());
        assert!(!NotifyEvent::LongBreakStarting.plays_tone());
        assert!(!NotifyEvent::GoalReached.plays_tone());
    }

    #[test]
    fn test_show_without_permission_is_skipped() {
        let notifier = headless(Permission::Default);
        assert!(notifier.show(NotifyEvent::WorkComplete).is_ok());
        assert_eq!(notifier.permission(), Permission::Default);
    }

    #[test]
    fn test_show_when_denied_reports_denial() {
        let notifier = headless(Permission::Denied);
        assert!(matches!(
            notifier.show(NotifyEvent::GoalReached),
            Err(NotificationError::PermissionDenied)
        ));
    }

    #[test]
    fn test_notify_swallows_failures() {
        let notifier = headless(Permission::Denied);
        for event in [
            NotifyEvent::WorkComplete,
            NotifyEvent::BreakComplete,
            NotifyEvent::LongBreakStarting,
            NotifyEvent::GoalReached,
        ] {
            notifier.notify(event, ALL);
        }
    }

    #[test]
    fn test_request_permission_resolves_in_background() {
        let notifier = headless_with(Permission::Default, service_up);
        notifier.request_permission();
        settle(&notifier);
        assert_eq!(notifier.permission(), Permission::Granted);

        let notifier = headless_with(Permission::Default, service_down);
        notifier.request_permission();
        settle(&notifier);
        assert_eq!(notifier.permission(), Permission::Denied);
    }

    #[test]
    fn test_denied_permission_is_probed_again() {
        let notifier = headless_with(Permission::Denied, service_up);
        notifier.request_permission();
        settle(&notifier);
        assert_eq!(notifier.permission(), Permission::Granted);
    }

    #[test]
    fn test_granted_permission_is_kept() {
        let notifier = headless_with(Permission::Granted, service_down);
        notifier.request_permission();
        assert!(!notifier.probing.load(Ordering::SeqCst));
        assert_eq!(notifier.permission(), Permission::Granted);
    }

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::default();
        let shared = notifier.clone();
        notifier.notify(NotifyEvent::WorkComplete, ALL);
        notifier.request_permission();

        assert_eq!(shared.events(), vec![NotifyEvent::WorkComplete]);
        assert_eq!(shared.count(NotifyEvent::WorkComplete), 1);
        assert_eq!(shared.permission_requests(), 1);
    }

    #[test]
    #[ignore = "Requires a desktop notification server"]
    fn test_desktop_notification() {
        let notifier = DesktopNotifier::new(Translator::new("en"));
        notifier.request_permission();
        notifier.notify(NotifyEvent::WorkComplete, ALL);
    }
}
