use std::sync::{Arc, Mutex};

use crate::{
    error::Result,
    sensing::{
        driver::{guarded, lock, DriverContext, DriverCore, DriverKind, SensorDriver, Subscription},
        platform::{DisplayEvent, DisplayEvents},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayChannel {
    /// "on" / "off"
    ScreenState,
    /// "PORTRAIT" / "LANDSCAPE" / "UNDEFINED"
    Orientation,
}

impl DisplayChannel {
    fn render(&self, event: DisplayEvent) -> Option<&'static str> {
        match (self, event) {
            (DisplayChannel::ScreenState, DisplayEvent::ScreenOn) => Some("on"),
            (DisplayChannel::ScreenState, DisplayEvent::ScreenOff) => Some("off"),
            (DisplayChannel::Orientation, DisplayEvent::OrientationChanged(o)) => Some(o.as_str()),
            _ => None,
        }
    }
}

/// Forwards display broadcasts into readings. The current state is recorded once on
/// start so every window begins with a known value.
pub struct BroadcastDriver {
    core: Arc<DriverCore>,
    channel: DisplayChannel,
    display: Arc<dyn DisplayEvents>,
    receiver: Mutex<Option<Subscription>>,
}

impl BroadcastDriver {
    pub fn new(channel: DisplayChannel, display: Arc<dyn DisplayEvents>, ctx: DriverContext) -> Self {
        let kind = match channel {
            DisplayChannel::ScreenState => DriverKind::ScreenState,
            DisplayChannel::Orientation => DriverKind::ScreenOrientation,
        };
        Self {
            core: Arc::new(DriverCore::new(kind, ctx)),
            channel,
            display,
            receiver: Mutex::new(None),
        }
    }

    fn current(&self) -> &'static str {
        match self.channel {
            DisplayChannel::ScreenState => {
                if self.display.screen_on() {
                    "on"
                } else {
                    "off"
                }
            }
            DisplayChannel::Orientation => self.display.orientation().as_str(),
        }
    }
}

impl SensorDriver for BroadcastDriver {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn is_available(&self) -> bool {
        true
    }

    fn can_periodic_sample(&self) -> bool {
        false
    }

    fn start(&self) -> Result<()> {
        if !self.core.begin() {
            return Ok(());
        }

        let core = Arc::clone(&self.core);
        let channel = self.channel;
        let on_event = Box::new(move |event: DisplayEvent| {
            guarded(core.name(), || {
                if let Some(payload) = channel.render(event) {
                    if core.is_running() {
                        core.emit(payload);
                    }
                }
            })
        });

        match self.display.subscribe(on_event) {
            Ok(receiver) => {
                *lock(&self.receiver) = Some(receiver);
                self.core.emit(self.current());
                Ok(())
            }
            Err(err) => {
                self.core.finish();
                Err(err)
            }
        }
    }

    fn stop(&self) {
        self.core.finish();
        lock(&self.receiver).take();
    }
}
