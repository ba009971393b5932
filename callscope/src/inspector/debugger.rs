//! `Debugger` / `Runtime` verbs on top of the native session.
//!
//! Every native request carries a [`Continuation`] describing what to do
//! with its response. Pause notifications need several round trips:
//!
//! ```text
//! event break/exception
//!   └─► backtrace {inlineRefs}
//!         └─► scopes {frameNumber: 0} ─► scopes {frameNumber: 1} ─► ...
//!               └─► notify Debugger.paused {callFrames, reason, data}
//! ```

use super::domains::Effect;
use super::session::{Completion, EnableStep, NativeSession, SessionState};
use super::transport::{NativeMessage, NativeRequest};
use super::translate::{self, FrameScopes};
use crate::server::InboundMessage;
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::time::Duration;

/// Delay between signalling the debuggee and the first connection attempt
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_millis(500);

/// `{id?, result?, error?}`
#[must_use]
pub fn response(id: Option<u64>, result: Option<Value>, error: Option<String>) -> Value {
    let mut message = serde_json::Map::new();
    if let Some(id) = id {
        message.insert("id".to_string(), json!(id));
    }
    if let Some(result) = result {
        message.insert("result".to_string(), result);
    }
    if let Some(error) = error {
        message.insert("error".to_string(), json!(error));
    }
    Value::Object(message)
}

fn notify(effects: &mut Vec<Effect>, message: Value) {
    effects.push(Effect::Notify(message));
}

/// Frames collected so far for one pause notification
#[derive(Debug, Clone)]
pub struct PauseAssembly {
    reason: &'static str,
    data: Value,
    frames: Vec<Value>,
    scopes: Vec<FrameScopes>,
}

/// What to do with a native response
#[derive(Debug, Clone)]
pub enum Continuation {
    Scripts,
    Backtrace { reason: &'static str, data: Value },
    Scopes(PauseAssembly),
    ScriptSource { id: Option<u64> },
    /// Empty acknowledgement on success
    Ack { id: Option<u64> },
    Evaluate { id: Option<u64> },
    FunctionDetails { id: Option<u64>, handle: u64 },
    SetBreakpoint { id: Option<u64> },
    Properties { id: Option<u64>, handle: u64 },
    SetScriptSource { id: Option<u64> },
    Detach,
}

/// Integer parameter sent either as a number or a numeric string
fn param_u64(message: &InboundMessage, key: &str) -> Option<u64> {
    match message.params.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub struct DebuggerDomain {
    session: NativeSession<Continuation>,
    awaiting_enable: Vec<Option<u64>>,
    connect_delay: Duration,
    running: bool,
}

impl DebuggerDomain {
    #[must_use]
    pub fn new(high_water: usize, connect_delay: Duration) -> Self {
        Self {
            session: NativeSession::new(high_water),
            awaiting_enable: Vec::new(),
            connect_delay,
            running: true,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Last `running` flag reported by the native debugger
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.session.pending_len()
    }

    pub fn take_unsent(&mut self) -> Vec<NativeRequest> {
        self.session.take_unsent()
    }

    pub fn handle(&mut self, verb: &str, message: &InboundMessage, effects: &mut Vec<Effect>) {
        let id = message.id;
        match verb {
            "enable" => self.enable(id, effects),
            "disable" => {
                self.disable(effects);
                effects.push(Effect::Notify(response(id, None, None)));
            }
            "supportsSeparateScriptCompilationAndExecution" | "canSetScriptSource" => {
                effects.push(Effect::Notify(response(id, Some(json!({"result": true})), None)));
            }
            "causesRecompilation" => {
                effects.push(Effect::Notify(response(id, Some(json!({"result": false})), None)));
            }
            "getScriptSource" => {
                let script = param_u64(message, "scriptId");
                self.request(
                    id,
                    "scripts",
                    json!({"types": 4, "ids": [script], "includeSource": true}),
                    Continuation::ScriptSource { id },
                    effects,
                );
            }
            "setPauseOnExceptions" => {
                let state = message.param_str("state").unwrap_or("none");
                let arguments = if state == "none" {
                    json!({"type": "uncaught", "enabled": false})
                } else {
                    json!({"type": state, "enabled": true})
                };
                self.request(id, "setexceptionbreak", arguments, Continuation::Ack { id }, effects);
            }
            "evaluateOnCallFrame" => {
                let disable_break = message
                    .params
                    .get("doNotPauseOnExceptionsAndMuteConsole")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                let arguments = json!({
                    "expression": message.params.get("expression").cloned().unwrap_or(Value::Null),
                    "frame": param_u64(message, "callFrameId"),
                    "global": false,
                    "disable_break": disable_break,
                });
                self.request(id, "evaluate", arguments, Continuation::Evaluate { id }, effects);
            }
            "getFunctionDetails" => {
                let handle = param_u64(message, "functionId").unwrap_or_default();
                self.request(
                    id,
                    "lookup",
                    json!({"handles": [handle], "includeSource": false}),
                    Continuation::FunctionDetails { id, handle },
                    effects,
                );
            }
            "stepInto" | "stepOut" | "stepOver" => {
                let action = match verb {
                    "stepInto" => "in",
                    "stepOut" => "out",
                    _ => "next",
                };
                self.request(
                    id,
                    "continue",
                    json!({"stepaction": action}),
                    Continuation::Ack { id },
                    effects,
                );
            }
            "resume" => self.request(id, "continue", Value::Null, Continuation::Ack { id }, effects),
            "pause" => {}
            "setBreakpointByUrl" => {
                let condition = message
                    .param_str("condition")
                    .filter(|c| !c.is_empty())
                    .map_or(Value::Null, |c| json!(c));
                let arguments = json!({
                    "type": "script",
                    "target": message.params.get("url").cloned().unwrap_or(Value::Null),
                    "line": message.params.get("lineNumber").cloned().unwrap_or(Value::Null),
                    "condition": condition,
                });
                self.request(id, "setbreakpoint", arguments, Continuation::SetBreakpoint { id }, effects);
            }
            "removeBreakpoint" => {
                let arguments = json!({"breakpoint": param_u64(message, "breakpointId")});
                self.request(id, "clearbreakpoint", arguments, Continuation::Ack { id }, effects);
            }
            "releaseObjectGroup" | "releaseObject" => {
                effects.push(Effect::Notify(response(id, None, None)));
            }
            "getProperties" => {
                let handle = param_u64(message, "objectId").unwrap_or_default();
                self.request(
                    id,
                    "lookup",
                    json!({"handles": [handle], "includeSource": false}),
                    Continuation::Properties { id, handle },
                    effects,
                );
            }
            "setScriptSource" => {
                let arguments = json!({
                    "script_id": param_u64(message, "scriptId"),
                    "new_source": message.params.get("scriptSource").cloned().unwrap_or(Value::Null),
                    "preview_only": false,
                });
                self.request(id, "changelive", arguments, Continuation::SetScriptSource { id }, effects);
            }
            other => debug!("Ignoring unknown debugger verb '{other}'"),
        }
    }

    fn request(
        &mut self,
        id: Option<u64>,
        command: &str,
        arguments: Value,
        continuation: Continuation,
        effects: &mut Vec<Effect>,
    ) {
        if let Err(e) = self.session.submit(command, arguments, continuation) {
            effects.push(Effect::Notify(response(id, None, Some(e.to_string()))));
        }
    }

    fn enable(&mut self, id: Option<u64>, effects: &mut Vec<Effect>) {
        match self.session.enable() {
            EnableStep::Ready => {
                effects.push(Effect::Notify(response(id, None, None)));
                self.request_scripts();
            }
            EnableStep::InProgress => self.awaiting_enable.push(id),
            EnableStep::Connect { signal } => {
                self.awaiting_enable.push(id);
                if signal {
                    effects.push(Effect::Signal);
                    effects.push(Effect::Connect { delay: self.connect_delay });
                } else {
                    effects.push(Effect::Connect { delay: Duration::ZERO });
                }
            }
        }
    }

    /// Send `disconnect` (when a session exists) and close the transport
    pub fn disable(&mut self, effects: &mut Vec<Effect>) {
        if self.session.state() != SessionState::Disabled {
            self.request(None, "disconnect", Value::Null, Continuation::Detach, effects);
            effects.push(Effect::Close);
        }
    }

    /// Transport connection established: acknowledge waiting enables and
    /// announce the scripts
    pub fn connected(&mut self, effects: &mut Vec<Effect>) {
        info!("Connected to native debugger");
        self.session.connected();
        self.running = true;
        if self.awaiting_enable.is_empty() {
            return;
        }
        for id in self.awaiting_enable.drain(..) {
            effects.push(Effect::Notify(response(id, None, None)));
        }
        self.request_scripts();
    }

    /// Transport closed or failed to connect
    pub fn connection_closed(&mut self, effects: &mut Vec<Effect>) {
        let dropped = self.session.closed();
        info!("Native debugger connection closed ({dropped} pending requests dropped)");
        for id in self.awaiting_enable.drain(..) {
            effects.push(Effect::Notify(response(
                id,
                None,
                Some("debugger connection closed".to_string()),
            )));
        }
    }

    fn request_scripts(&mut self) {
        if let Err(e) = self.session.submit("scripts", json!({"types": 4}), Continuation::Scripts) {
            warn!("Cannot request scripts: {e}");
        }
    }

    pub fn on_native(&mut self, message: NativeMessage, effects: &mut Vec<Effect>) {
        if let Some(running) = message.running {
            self.running = running;
        }
        match message.kind.as_str() {
            "event" => self.on_event(&message),
            "response" => {
                if let Some((continuation, outcome)) = self.session.complete(message) {
                    self.resume_with(continuation, outcome, effects);
                }
            }
            other => warn!("Unknown native message type '{other}'"),
        }
    }

    fn on_event(&mut self, message: &NativeMessage) {
        match message.event.as_deref() {
            Some("break") => self.start_pause("other", Value::Null),
            Some("exception") => {
                let data = json!({
                    "uncaught": message.body.get("uncaught").cloned().unwrap_or(Value::Null),
                    "description": message.body.pointer("/exception/text").cloned().unwrap_or(Value::Null),
                });
                self.start_pause("exception", data);
            }
            other => debug!("Ignoring native event {other:?}"),
        }
    }

    fn start_pause(&mut self, reason: &'static str, data: Value) {
        let continuation = Continuation::Backtrace { reason, data };
        if let Err(e) = self.session.submit("backtrace", json!({"inlineRefs": true}), continuation) {
            warn!("Cannot request backtrace: {e}");
        }
    }

    /// Ask for the scopes of the next frame, or publish the pause once
    /// every frame has them
    fn continue_pause(&mut self, pause: PauseAssembly, effects: &mut Vec<Effect>) {
        let next = pause.scopes.len();
        let Some(frame) = pause.frames.get(next) else {
            effects.push(Effect::Notify(json!({
                "method": "Debugger.paused",
                "params": {
                    "callFrames": translate::frames(&pause.frames, &pause.scopes),
                    "reason": pause.reason,
                    "data": pause.data,
                },
            })));
            return;
        };
        let frame_number = frame.get("index").cloned().unwrap_or(json!(next));
        if let Err(e) = self.session.submit(
            "scopes",
            json!({"frameNumber": frame_number}),
            Continuation::Scopes(pause),
        ) {
            warn!("Cannot request scopes: {e}");
        }
    }

    fn resume_with(&mut self, continuation: Continuation, outcome: Completion, effects: &mut Vec<Effect>) {
        match (continuation, outcome) {
            (Continuation::Scripts, Ok(message)) => {
                for script in translate::scripts(&message.body) {
                    notify(effects, json!({"method": "Debugger.scriptParsed", "params": script}));
                }
            }
            (Continuation::Scripts, Err(e)) => warn!("Failed to get scripts: {e}"),

            (Continuation::Backtrace { reason, data }, Ok(message)) => {
                let frames = message
                    .body
                    .get("frames")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let pause = PauseAssembly { reason, data, frames, scopes: Vec::new() };
                self.continue_pause(pause, effects);
            }
            (Continuation::Backtrace { .. }, Err(e)) => warn!("Failed to get frames: {e}"),

            (Continuation::Scopes(mut pause), outcome) => {
                let scopes = match outcome {
                    Ok(message) => FrameScopes {
                        scopes: message
                            .body
                            .get("scopes")
                            .and_then(Value::as_array)
                            .cloned()
                            .unwrap_or_default(),
                        refs: message.refs,
                    },
                    Err(e) => {
                        warn!("Failed to get scopes for frame {}: {e}", pause.scopes.len());
                        FrameScopes::default()
                    }
                };
                pause.scopes.push(scopes);
                self.continue_pause(pause, effects);
            }

            (Continuation::ScriptSource { id }, Ok(message)) => {
                let source = message.body.pointer("/0/source").cloned().unwrap_or(Value::Null);
                notify(effects, response(id, Some(json!({"scriptSource": source})), None));
            }
            (Continuation::Ack { id }, Ok(_)) => notify(effects, response(id, None, None)),
            (Continuation::Evaluate { id }, Ok(message)) => {
                let result = match translate::remote_object(&message.body) {
                    Ok(object) => json!({"result": object, "wasThrown": false}),
                    Err(e) => json!({"result": {"type": "string", "value": e.to_string()}, "wasThrown": true}),
                };
                notify(effects, response(id, Some(result), None));
            }
            (Continuation::Evaluate { id }, Err(e)) => notify(effects, response(
                id,
                Some(json!({"result": {"type": "string", "value": e}, "wasThrown": true})),
                None,
            )),
            (Continuation::FunctionDetails { id, handle }, Ok(message)) => {
                let object = message.body.get(handle.to_string()).cloned().unwrap_or(Value::Null);
                match translate::function_details(&object) {
                    Ok(details) => notify(effects, response(id, Some(json!({"details": details})), None)),
                    Err(e) => notify(effects, response(id, None, Some(e.to_string()))),
                }
            }
            (Continuation::SetBreakpoint { id }, Ok(message)) => {
                let locations: Vec<Value> = message
                    .body
                    .get("actual_locations")
                    .and_then(Value::as_array)
                    .map(|locations| {
                        locations
                            .iter()
                            .map(|loc| {
                                json!({
                                    "lineNumber": loc.get("line").cloned().unwrap_or(Value::Null),
                                    "scriptId": loc.get("script_id").map(|s| match s {
                                        Value::String(s) => s.clone(),
                                        other => other.to_string(),
                                    }),
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let breakpoint = match message.body.get("breakpoint") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                notify(effects, response(
                    id,
                    Some(json!({"breakpointId": breakpoint, "locations": locations})),
                    None,
                ));
            }
            (Continuation::Properties { id, handle }, Ok(message)) => {
                let object = message.body.get(handle.to_string()).cloned().unwrap_or(Value::Null);
                match translate::properties(&object, &message.refs) {
                    Ok(properties) => notify(effects, response(id, Some(json!({"result": properties})), None)),
                    Err(e) => notify(effects, response(id, None, Some(e.to_string()))),
                }
            }
            (Continuation::SetScriptSource { id }, Ok(_)) => {
                notify(effects, response(id, Some(json!({"callFrames": []})), None));
            }
            (Continuation::Detach, outcome) => debug!("Native disconnect answered: {:?}", outcome.err()),

            (
                Continuation::ScriptSource { id }
                | Continuation::Ack { id }
                | Continuation::FunctionDetails { id, .. }
                | Continuation::SetBreakpoint { id }
                | Continuation::Properties { id, .. }
                | Continuation::SetScriptSource { id },
                Err(e),
            ) => notify(effects, response(id, None, Some(e))),
        }
    }
}
