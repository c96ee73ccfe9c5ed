//! Terminal Echo Implementation
//!
//! A minimal OneBot 12 implementation whose "platform" is the terminal:
//! every line typed on stdin becomes a private message event from the
//! user `operator`, and `send_message` actions are printed back to
//! stdout. Everything in between is the real protocol stack.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-impl
//! ```
//!
//! By default an HTTP server listens on `127.0.0.1:8080` and a
//! WebSocket server on `127.0.0.1:8081`; drop a `libonebot.toml` next
//! to the binary (or set `LIBONEBOT_*` variables) to change the
//! connections. Try it without any OneBot application:
//!
//! ```bash
//! curl -X POST 127.0.0.1:8080 -H 'Content-Type: application/json' \
//!     -d '{"action": "get_status", "params": {}}'
//! ```
//!
//! or open `ws://127.0.0.1:8081/` and watch typed lines arrive as
//! message events.

use anyhow::Result;
use libonebot::core::model::alt_message;
use libonebot::prelude::*;
use libonebot::runtime::config::{BotConfig, ConnectionConfig, HttpSection, WsSection};
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

const PLATFORM: &str = "terminal";
const BOT_USER_ID: &str = "echo";
const OPERATOR_ID: &str = "operator";

// ============================================================================
// Actions
// ============================================================================

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

fn send_message_schema() -> ActionSchema {
    ActionSchema::new("send_message")
        .param(ParamSpec::required("detail_type", ParamType::String))
        .param(ParamSpec::optional("user_id", ParamType::String))
        .param(ParamSpec::optional("group_id", ParamType::String))
        .param(ParamSpec::required("message", ParamType::Array))
}

/// The one platform action this implementation supports: "sending" a
/// message means printing it.
async fn send_message(ctx: ActionContext) -> Result<Value> {
    let Some(message) = ctx.param("message") else {
        return Err(ActionError::bad_param("missing parameter `message`").into());
    };
    let segments: Vec<Segment> = serde_json::from_value(message.clone())
        .map_err(|err| ActionError::bad_segment_data(err.to_string()))?;
    let text = alt_message(&segments);

    match ctx.param_str("detail_type") {
        Some("private") => println!("<{}> {text}", ctx.bot.id()),
        Some("group") => {
            let Some(group_id) = ctx.param_str("group_id") else {
                return Err(ActionError::bad_param("missing parameter `group_id`").into());
            };
            println!("<{}@{group_id}> {text}", ctx.bot.id());
        }
        other => {
            return Err(ActionError::bad_param(format!(
                "unsupported detail_type: {}",
                other.unwrap_or("")
            ))
            .into());
        }
    }

    let message_id = NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed);
    Ok(json!({"message_id": message_id.to_string(), "time": now_secs()}))
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs_f64())
        .unwrap_or_default()
}

// ============================================================================
// Platform glue
// ============================================================================

/// Reads stdin line by line and turns each line into a message event.
fn spawn_terminal_reader(ob: &OneBotImpl) {
    let bot = ob.dispatcher().bots()[0].clone();
    let emitter = ob.clone();
    let token = ob.supervisor().token();
    ob.supervisor().spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                () = token.cancelled() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    let message_id = NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed);
                    let event = Event::message_private(
                        &bot,
                        message_id.to_string(),
                        vec![Segment::text(&line)],
                        &line,
                        OPERATOR_ID,
                    );
                    debug!(event_id = %event.id, "Terminal line emitted");
                    emitter.emit(event);
                }
                Ok(None) => {
                    info!("stdin closed, no more terminal events");
                    break;
                }
                Err(err) => {
                    info!(error = %err, "stdin read failed");
                    break;
                }
            }
        }
    });
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // fallback wiring, overridden by libonebot.toml / LIBONEBOT_* vars
    let defaults = RuntimeConfig {
        bots: vec![BotConfig {
            platform: PLATFORM.into(),
            user_id: BOT_USER_ID.into(),
            extra: Map::new(),
        }],
        connections: vec![
            ConnectionConfig::Http(HttpSection {
                host: "127.0.0.1".into(),
                ..Default::default()
            }),
            ConnectionConfig::Ws(WsSection {
                host: "127.0.0.1".into(),
                port: 8081,
                ..Default::default()
            }),
        ],
        ..Default::default()
    };

    let config = ConfigLoader::new().merge(defaults).load()?;
    logging::init_from_config(&config.logging);

    let ob = config
        .builder(ImplInfo::new("echo-impl", env!("CARGO_PKG_VERSION")))?
        .action(send_message_schema(), send_message)
        .on_startup(|| async {
            info!("Type a line to emit a message event");
        })
        .build()?;

    spawn_terminal_reader(&ob);
    runner::run(&ob).await?;
    Ok(())
}
