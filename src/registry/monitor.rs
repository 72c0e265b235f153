//! Periodic reconciliation of application state into settings.
//!
//! Application state can change behind the registry's back (a user toggles a
//! menu, another script writes an avatar property). On every tick the
//! monitor re-aligns each item's bindings, then copies the application value
//! into settings wherever the two disagree by string form.

use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use super::application::ApplicationConfig;
use crate::Result;
use crate::store::SettingsApi;
use crate::timer::Interval;
use crate::value::loosely_equal;

/// Origin tag for settings writes made by the monitor.
pub const MONITOR_ORIGIN: &str = "ApplicationConfig.monitor";

#[derive(Debug, Clone)]
pub struct ConfigMonitor {
    timer: Interval,
}

impl ConfigMonitor {
    pub fn new(period: Duration) -> Self {
        Self {
            timer: Interval::new(period),
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.timer.start(now);
    }

    pub fn stop(&mut self) {
        self.timer.stop();
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Reconcile if a period has elapsed. Returns the keys written.
    pub fn poll<S: SettingsApi + ?Sized>(
        &mut self,
        now: Instant,
        app: &ApplicationConfig,
        settings: &mut S,
    ) -> Result<Vec<String>> {
        if !self.timer.poll(now) {
            return Ok(Vec::new());
        }
        reconcile(app, settings)
    }
}

/// One reconciliation pass over every registered application key.
pub fn reconcile<S: SettingsApi + ?Sized>(
    app: &ApplicationConfig,
    settings: &mut S,
) -> Result<Vec<String>> {
    let keys: Vec<String> = app.keys().map(str::to_string).collect();
    let mut written = Vec::new();
    for key in keys {
        app.resync_value(&key);
        let app_value = app.get_value(&key, None);
        if app_value.is_null() {
            continue;
        }
        let value = settings.get_value(&key, None);
        if loosely_equal(&app_value, &value) {
            continue;
        }
        debug!(key = %key, "application -> settings: {} (was: {})", app_value, value);
        settings.set_value_from(&key, app_value, MONITOR_ORIGIN)?;
        written.push(key);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::item::fixtures::{FakeMenu, FakeObject};
    use crate::registry::item::{ItemDescriptor, MenuApi, Reflect};
    use crate::registry::settings::SettingsConfig;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn fixture() -> (
        ApplicationConfig,
        SettingsConfig<MemoryStore>,
        crate::registry::Shared<FakeObject>,
        crate::registry::Shared<FakeMenu>,
    ) {
        let avatar = FakeObject::with_property("pitchSpeed", json!(75));
        let menu = FakeMenu::with_item("View", "Mirror", false);
        let mut app = ApplicationConfig::new("ns");
        app.register([
            (
                "Avatar/pitchSpeed",
                ItemDescriptor::new().property(avatar.clone(), "pitchSpeed"),
            ),
            ("mirror", ItemDescriptor::new().menu(menu.clone(), "View > Mirror")),
        ])
        .unwrap();
        let settings = SettingsConfig::new(
            "ns",
            [("Avatar/pitchSpeed", json!(75)), ("mirror", json!(false))],
            MemoryStore::new(),
        );
        (app, settings, avatar, menu)
    }

    #[test]
    fn test_reconcile_in_sync_writes_nothing() {
        let (app, mut settings, _, _) = fixture();
        assert!(reconcile(&app, &mut settings).unwrap().is_empty());
    }

    #[test]
    fn test_reconcile_copies_application_drift() {
        let (app, mut settings, avatar, menu) = fixture();
        avatar
            .borrow_mut()
            .set_property("pitchSpeed", json!(120));
        menu.borrow_mut().set_is_option_checked("Mirror", true);

        let written = reconcile(&app, &mut settings).unwrap();

        assert_eq!(written, vec!["Avatar/pitchSpeed", "ns/mirror"]);
        assert_eq!(settings.get_value("Avatar/pitchSpeed", None), json!(120));
        assert_eq!(settings.get_value("mirror", None), json!(true));
    }

    #[test]
    fn test_string_form_match_is_not_drift() {
        let (app, mut settings, _, _) = fixture();
        settings.set_value("Avatar/pitchSpeed", json!("75")).unwrap();
        assert!(reconcile(&app, &mut settings).unwrap().is_empty());
        assert_eq!(settings.get_value("Avatar/pitchSpeed", None), json!("75"));
    }

    #[test]
    fn test_whole_float_accessor_is_not_drift() {
        let (app, mut settings, avatar, _) = fixture();
        avatar
            .borrow_mut()
            .set_property("pitchSpeed", json!(75.0));
        assert!(reconcile(&app, &mut settings).unwrap().is_empty());
    }

    #[test]
    fn test_poll_only_runs_when_due() {
        let (app, mut settings, avatar, _) = fixture();
        let start = Instant::now();
        let mut monitor = ConfigMonitor::new(Duration::from_millis(500));
        monitor.start(start);
        avatar
            .borrow_mut()
            .set_property("pitchSpeed", json!(10));

        let early = monitor
            .poll(start + Duration::from_millis(100), &app, &mut settings)
            .unwrap();
        assert!(early.is_empty());

        let due = monitor
            .poll(start + Duration::from_millis(500), &app, &mut settings)
            .unwrap();
        assert_eq!(due, vec!["Avatar/pitchSpeed"]);
    }

    #[test]
    fn test_monitor_signals_settings_listeners() {
        let (app, mut settings, avatar, _) = fixture();
        let origins = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = origins.clone();
        settings
            .value_updated()
            .connect(move |change| sink.borrow_mut().push(change.origin.clone()));

        avatar.borrow_mut().set_property("pitchSpeed", json!(7));
        reconcile(&app, &mut settings).unwrap();

        assert_eq!(*origins.borrow(), vec![MONITOR_ORIGIN.to_string()]);
    }
}
