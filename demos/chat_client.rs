//! Chat Client Demo - batching, coalescing and reconnection
//!
//! Connects to a WebSocket echo-style endpoint, sends a burst of chat traffic
//! and prints what comes back alongside live socket statistics.
//!
//! Run with: cargo run --example chat_client -- ws://127.0.0.1:9001

use std::sync::Arc;
use std::time::Duration;

use forge_socket::{
    MonitorConfig, PerformanceMonitor, Priority, SocketConfig, SocketManager, EVENT_CLOSE,
    EVENT_ERROR, EVENT_OPEN,
};
use serde_json::json;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info,forge_socket=debug"))
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9001".to_string());

    let config = SocketConfig::builder()
        .max_batch_size(5)
        .max_wait_time_ms(50)
        .max_buffer_size(4)
        .base_delay_ms(500)
        .build();

    let socket = SocketManager::new(&url, config)?;

    socket.on(EVENT_OPEN, |_| println!("-- connected"));
    socket.on(EVENT_CLOSE, |v| println!("-- closed: {}", v["reason"]));
    socket.on(EVENT_ERROR, |v| eprintln!("-- error: {}", v["message"]));
    socket.on("chat:message", |v| println!("<- chat:message {}", v));
    socket.on("chat:typing", |v| println!("<- chat:typing x{}", v.as_array().map_or(1, Vec::len)));

    let monitor = PerformanceMonitor::start(
        MonitorConfig::builder().sample_interval_ms(1000).build(),
        Arc::new(socket.clone()),
    );

    socket.connect();
    sleep(Duration::from_millis(300)).await;

    for i in 0..12 {
        socket.send("chat:typing", json!({ "user": "demo", "seq": i }))?;
    }
    for i in 0..3 {
        socket.send("chat:message", json!({ "text": format!("hello #{}", i) }))?;
    }
    socket.send_with_priority("chat:read", json!({ "upto": 3 }), Priority::High)?;
    socket.flush_buffers();

    for _ in 0..5 {
        sleep(Duration::from_secs(1)).await;
        let stats = socket.stats();
        println!(
            "{:<14} queue={:<4} frames_out={:<4} msgs_in={:<4} level={}",
            stats.phase.to_string(),
            stats.queue_length,
            stats.counters.frames_sent,
            stats.counters.messages_received,
            monitor.current_level()
        );
    }

    monitor.stop();
    socket.disconnect();
    Ok(())
}
