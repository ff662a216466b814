use std::sync::Arc;

use log::warn;

use crate::preferences::Preferences;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingStatus {
    Active,
    Paused,
}

/// Host UI hooks: the transient overlay shown after an unlock and the status text of
/// the foreground notification. Every method defaults to doing nothing.
pub trait InteractionSurface: Send + Sync {
    fn show_overlay(&self) {}
    fn hide_overlay(&self) {}
    fn set_status(&self, _status: SamplingStatus) {}
}

/// Forwards scheduler side effects to the surface and mirrors the overlay into the
/// `in_interaction` preference.
#[derive(Clone)]
pub struct InteractionHub {
    surface: Option<Arc<dyn InteractionSurface>>,
    prefs: Preferences,
}

impl InteractionHub {
    pub fn new(surface: Option<Arc<dyn InteractionSurface>>, prefs: Preferences) -> Self {
        Self { surface, prefs }
    }

    pub fn show_overlay(&self) {
        self.remember(true);
        if let Some(surface) = &self.surface {
            surface.show_overlay();
        }
    }

    pub fn hide_overlay(&self) {
        if self.prefs.in_interaction() {
            self.remember(false);
        }
        if let Some(surface) = &self.surface {
            surface.hide_overlay();
        }
    }

    pub fn set_status(&self, status: SamplingStatus) {
        if let Some(surface) = &self.surface {
            surface.set_status(status);
        }
    }

    fn remember(&self, value: bool) {
        if let Err(err) = self.prefs.set_in_interaction(value) {
            warn!("failed to persist in_interaction={value}: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::preferences::JsonPreferences;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl InteractionSurface for Recorder {
        fn show_overlay(&self) {
            self.calls.lock().unwrap().push("show".into());
        }

        fn set_status(&self, status: SamplingStatus) {
            self.calls.lock().unwrap().push(format!("{status:?}"));
        }
    }

    #[test]
    fn overlay_state_is_mirrored() {
        let prefs = Preferences::new(Arc::new(JsonPreferences::in_memory()));
        let surface = Arc::new(Recorder::default());
        let hub = InteractionHub::new(Some(surface.clone()), prefs.clone());

        hub.show_overlay();
        assert!(prefs.in_interaction());
        hub.hide_overlay();
        assert!(!prefs.in_interaction());
        hub.set_status(SamplingStatus::Paused);

        assert_eq!(*surface.calls.lock().unwrap(), vec!["show", "Paused"]);
    }
}
