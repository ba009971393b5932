//! Debugger bridge against a fake native debugger on a local TCP port.

use callscope::domain::Pid;
use callscope::inspector::{BridgeConfig, BridgeHandle, DebuggeeSignal, SessionState};
use callscope::server::InboundMessage;
use serde_json::{json, Value};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Default)]
struct CountingSignal(Arc<AtomicUsize>);

impl DebuggeeSignal for CountingSignal {
    fn signal(&self, pid: Pid) -> io::Result<()> {
        assert_eq!(pid, Pid(4242));
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeDebugger {
    stream: TcpStream,
    pending: Vec<u8>,
}

impl FakeDebugger {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = tokio::time::timeout(TIMEOUT, listener.accept())
            .await
            .expect("bridge never connected")
            .unwrap();
        let mut fake = Self {
            stream,
            pending: Vec::new(),
        };
        // Connect banner: headers only
        fake.write_raw("Type: connect\r\nV8-Version: 3.14\r\nContent-Length: 0\r\n\r\n").await;
        fake
    }

    async fn write_raw(&mut self, text: &str) {
        self.stream.write_all(text.as_bytes()).await.unwrap();
    }

    async fn send(&mut self, body: Value) {
        let text = body.to_string();
        self.write_raw(&format!("Content-Length: {}\r\n\r\n{text}", text.len())).await;
    }

    async fn respond(&mut self, request: &Value, body: Value, refs: Value) {
        self.send(json!({
            "seq": 0,
            "type": "response",
            "request_seq": request["seq"],
            "command": request["command"],
            "success": true,
            "body": body,
            "refs": refs,
            "running": false,
        }))
        .await;
    }

    fn take_frame(&mut self) -> Option<Value> {
        let end = self.pending.windows(4).position(|w| w == b"\r\n\r\n")?;
        let headers = String::from_utf8_lossy(&self.pending[..end]).into_owned();
        let length: usize = headers
            .lines()
            .find_map(|line| line.strip_prefix("Content-Length:"))
            .map(|v| v.trim().parse().unwrap())
            .expect("request without Content-Length");
        let start = end + 4;
        if self.pending.len() < start + length {
            return None;
        }
        let body: Vec<u8> = self.pending.drain(..start + length).skip(start).collect();
        Some(serde_json::from_slice(&body).unwrap())
    }

    /// Next request from the bridge, `None` once it hangs up
    async fn request(&mut self) -> Option<Value> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = self.take_frame() {
                return Some(frame);
            }
            let n = tokio::time::timeout(TIMEOUT, self.stream.read(&mut buf))
                .await
                .expect("no request in time")
                .unwrap();
            if n == 0 {
                return None;
            }
            self.pending.extend_from_slice(&buf[..n]);
        }
    }
}

fn inbound(method: &str, params: Value, id: u64) -> InboundMessage {
    InboundMessage {
        method: method.to_string(),
        params,
        id: Some(id),
    }
}

async fn notification(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("no notification in time")
        .expect("bridge gone")
}

async fn setup() -> (TcpListener, BridgeHandle, mpsc::UnboundedReceiver<Value>, CountingSignal) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = BridgeConfig {
        debugger_addr: listener.local_addr().unwrap(),
        debuggee_pid: Some(Pid(4242)),
        connect_delay: Duration::from_millis(10),
        high_water: 50,
    };
    let signal = CountingSignal::default();
    let (tx, rx) = mpsc::unbounded_channel();
    let bridge = BridgeHandle::spawn(config, Box::new(signal.clone()), tx);
    (listener, bridge, rx, signal)
}

#[tokio::test]
async fn test_enable_pause_and_detach() {
    let (listener, mut bridge, mut notifications, signal) = setup().await;

    bridge.command(inbound("Debugger.enable", Value::Null, 1));
    let mut native = FakeDebugger::accept(&listener).await;
    assert_eq!(notification(&mut notifications).await, json!({"id": 1}));
    assert_eq!(signal.0.load(Ordering::SeqCst), 1);
    assert!(bridge.wait_for(SessionState::Enabled).await);

    let scripts = native.request().await.unwrap();
    assert_eq!(scripts["command"], "scripts");
    assert_eq!(scripts["seq"], 1);
    assert_eq!(scripts["arguments"], json!({"types": 4}));
    native
        .respond(&scripts, json!([{"id": 7, "name": "app.rs"}, {"id": 8}]), json!([]))
        .await;
    assert_eq!(
        notification(&mut notifications).await,
        json!({"method": "Debugger.scriptParsed", "params": {"scriptId": "7", "url": "app.rs", "isContentScript": false}})
    );

    native
        .send(json!({"seq": 0, "type": "event", "event": "break", "body": {}}))
        .await;
    let backtrace = native.request().await.unwrap();
    assert_eq!(backtrace["command"], "backtrace");
    assert_eq!(backtrace["arguments"], json!({"inlineRefs": true}));
    native
        .respond(
            &backtrace,
            json!({"frames": [{"index": 0, "line": 4, "column": 8, "func": {"name": "tick", "scriptId": 7}}]}),
            json!([]),
        )
        .await;

    let scopes = native.request().await.unwrap();
    assert_eq!(scopes["command"], "scopes");
    assert_eq!(scopes["arguments"], json!({"frameNumber": 0}));
    native
        .respond(
            &scopes,
            json!({"scopes": [{"type": 1, "object": {"ref": 20}}]}),
            json!([{"handle": 20, "type": "object", "className": "Object", "text": "#<Object>"}]),
        )
        .await;

    let paused = notification(&mut notifications).await;
    assert_eq!(paused["method"], "Debugger.paused");
    assert_eq!(paused["params"]["reason"], "other");
    assert_eq!(paused["params"]["data"], Value::Null);
    let frame = &paused["params"]["callFrames"][0];
    assert_eq!(frame["functionName"], "tick");
    assert_eq!(frame["location"], json!({"scriptId": "7", "lineNumber": 4, "columnNumber": 8}));
    assert_eq!(frame["scopeChain"][0]["type"], "local");

    bridge.disable();
    let disconnect = native.request().await.unwrap();
    assert_eq!(disconnect["command"], "disconnect");
    assert!(native.request().await.is_none());
    assert!(bridge.wait_for(SessionState::Disabled).await);

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_native_failure_reaches_observer_as_error() {
    let (listener, mut bridge, mut notifications, _signal) = setup().await;
    bridge.command(inbound("Debugger.enable", Value::Null, 1));
    let mut native = FakeDebugger::accept(&listener).await;
    notification(&mut notifications).await;
    let scripts = native.request().await.unwrap();
    native.respond(&scripts, json!([]), json!([])).await;
    assert!(bridge.wait_for(SessionState::Enabled).await);

    bridge.command(inbound(
        "Debugger.removeBreakpoint",
        json!({"breakpointId": "12"}),
        2,
    ));
    let clear = native.request().await.unwrap();
    assert_eq!(clear["arguments"], json!({"breakpoint": 12}));
    native
        .send(json!({
            "seq": 0,
            "type": "response",
            "request_seq": clear["seq"],
            "command": "clearbreakpoint",
            "success": false,
            "message": "unknown breakpoint",
        }))
        .await;
    assert_eq!(
        notification(&mut notifications).await,
        json!({"id": 2, "error": "unknown breakpoint"})
    );

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_requests_before_enable_are_rejected() {
    let (_listener, bridge, mut notifications, signal) = setup().await;
    bridge.command(inbound(
        "Debugger.setBreakpointByUrl",
        json!({"url": "app.rs", "lineNumber": 3}),
        5,
    ));
    assert_eq!(
        notification(&mut notifications).await,
        json!({"id": 5, "error": "debugger is not enabled"})
    );
    assert_eq!(signal.0.load(Ordering::SeqCst), 0);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_after_native_hangup_skips_signal() {
    let (listener, mut bridge, mut notifications, signal) = setup().await;
    bridge.command(inbound("Debugger.enable", Value::Null, 1));
    let native = FakeDebugger::accept(&listener).await;
    notification(&mut notifications).await;
    assert!(bridge.wait_for(SessionState::Enabled).await);

    drop(native);
    assert!(bridge.wait_for(SessionState::Disabled).await);

    bridge.command(inbound("Debugger.enable", Value::Null, 2));
    let _native = FakeDebugger::accept(&listener).await;
    assert_eq!(notification(&mut notifications).await, json!({"id": 2}));
    assert_eq!(signal.0.load(Ordering::SeqCst), 1);

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_debugger_fails_enable() {
    let (listener, mut bridge, mut notifications, _signal) = setup().await;
    drop(listener);

    bridge.command(inbound("Debugger.enable", Value::Null, 1));
    assert_eq!(
        notification(&mut notifications).await,
        json!({"id": 1, "error": "debugger connection closed"})
    );
    assert!(bridge.wait_for(SessionState::Disabled).await);
    bridge.shutdown().await;
}
