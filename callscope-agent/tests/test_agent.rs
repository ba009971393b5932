//! End to end: wrapped calls in this process arrive at a socket as frames.

use callscope_agent::{call_site, Agent, AgentConfig};
use callscope_common::{FrameDecoder, TraceFrame, TRACER_FRAME};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::UnixListener;

#[tokio::test]
async fn test_wrapped_calls_reach_the_proxy_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let agent = Agent::new(AgentConfig {
        spawn_proxy: false,
        ipc_socket_path: path.clone(),
        frame_interval: Duration::from_millis(100),
        ..AgentConfig::default()
    })
    .unwrap();

    let add_one = agent.interceptor().wrap(|x: u32| x + 1, call_site!("add_one"));
    let (mut stream, _) = listener.accept().await.unwrap();

    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 4096];
    let frame = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            // Calls keep coming so a frame lands after the connection is up
            assert_eq!(add_one.call(1), 2);
            let n = tokio::select! {
                read = stream.read(&mut buf) => read.unwrap(),
                () = tokio::time::sleep(Duration::from_millis(50)) => continue,
            };
            assert!(n > 0);
            for envelope in decoder.push(&buf[..n]) {
                let envelope = envelope.unwrap();
                if envelope.kind == TRACER_FRAME {
                    return envelope.payload::<TraceFrame>().unwrap();
                }
            }
        }
    })
    .await
    .unwrap();

    let node = frame.nodes.values().find(|node| node.fun_name == "add_one").unwrap();
    assert!(node.num_calls >= 1);
    assert_eq!(node.pid, std::process::id());

    tokio::task::spawn_blocking(move || agent.shutdown()).await.unwrap();
}

#[test]
fn test_stop_pauses_recording() {
    let dir = tempfile::tempdir().unwrap();
    let agent = Agent::new(AgentConfig {
        spawn_proxy: false,
        ipc_socket_path: dir.path().join("none.sock"),
        ..AgentConfig::default()
    })
    .unwrap();

    assert!(agent.is_recording());
    agent.stop();
    assert!(!agent.is_recording());
    agent.start();
    assert!(agent.is_recording());
    agent.shutdown();
}
