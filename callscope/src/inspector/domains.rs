//! Namespace dispatch for observer debugger traffic

use super::debugger::{response, DebuggerDomain};
use super::session::SessionState;
use super::transport::{NativeMessage, NativeRequest};
use crate::server::{InboundMessage, Namespace};
use log::debug;
use serde_json::{json, Value};
use std::time::Duration;

/// Side effects requested by the handlers, carried out by the bridge task
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Message for every observer
    Notify(Value),
    /// Activate the debuggee's native debugger
    Signal,
    /// Open the native transport after `delay`
    Connect { delay: Duration },
    /// Flush pending writes and close the native transport
    Close,
}

pub struct Inspector {
    debugger: DebuggerDomain,
    effects: Vec<Effect>,
}

impl Inspector {
    #[must_use]
    pub fn new(high_water: usize, connect_delay: Duration) -> Self {
        Self {
            debugger: DebuggerDomain::new(high_water, connect_delay),
            effects: Vec::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.debugger.state()
    }

    pub fn dispatch(&mut self, message: &InboundMessage) {
        let (namespace, verb) = message.route();
        match namespace {
            Namespace::Debugger | Namespace::Runtime => {
                self.debugger.handle(verb, message, &mut self.effects);
            }
            Namespace::Console if verb == "enable" => {
                self.effects.push(Effect::Notify(response(message.id, None, None)));
            }
            Namespace::Page => match verb {
                "enable" | "getResourceTree" => {}
                _ => self.effects.push(Effect::Notify(response(
                    message.id,
                    Some(json!({"result": false})),
                    None,
                ))),
            },
            Namespace::Console
            | Namespace::Css
            | Namespace::Network
            | Namespace::Inspector
            | Namespace::Profiler
            | Namespace::Telemetry
            | Namespace::Unknown(_) => debug!("No handler for {}", message.method),
        }
    }

    /// No observers left, or shutting down
    pub fn disable(&mut self) {
        self.debugger.disable(&mut self.effects);
    }

    pub fn connected(&mut self) {
        self.debugger.connected(&mut self.effects);
    }

    pub fn connection_closed(&mut self) {
        self.debugger.connection_closed(&mut self.effects);
    }

    pub fn on_native(&mut self, message: NativeMessage) {
        self.debugger.on_native(message, &mut self.effects);
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub fn take_unsent(&mut self) -> Vec<NativeRequest> {
        self.debugger.take_unsent()
    }
}
