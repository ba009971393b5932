//! Small traced application.
//!
//! Start the proxy first (or let the agent spawn `callscope` from PATH),
//! then connect an observer to ws://localhost:6788/.
//!
//! ```text
//! RUST_LOG=debug cargo run -p callscope-agent --example traced_app
//! ```

use callscope_agent::{call_site, Agent, AgentConfig, TrackingAllocator};
use std::thread;
use std::time::Duration;

#[global_allocator]
static ALLOC: TrackingAllocator = TrackingAllocator;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let agent = Agent::new(AgentConfig::default())?;
    let interceptor = agent.interceptor();

    let parse = interceptor.wrap(
        |line: String| line.split(',').map(str::to_string).collect::<Vec<_>>(),
        call_site!("parse_record"),
    );
    let checksum = interceptor.wrap(
        |fields: Vec<String>| fields.iter().map(String::len).sum::<usize>(),
        call_site!(),
    );

    let handle_request = {
        let parse = parse.clone();
        let checksum = checksum.clone();
        interceptor.wrap(
            move |id: u64| {
                let fields = parse.call(format!("{id},alpha,beta,gamma"));
                thread::sleep(Duration::from_millis(id % 7));
                checksum.call(fields)
            },
            call_site!("handle_request"),
        )
    };

    for id in 0..2_000u64 {
        let total = handle_request.call(id);
        if id % 500 == 0 {
            println!("request {id}: checksum {total}");
        }
    }

    agent.shutdown();
    Ok(())
}
