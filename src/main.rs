//! Context bridge demo - main entry point.
//!
//! Wires a privileged context (local transport plus relay) and a caller
//! context on one event channel, sends one message and prints the outcome:
//! - `kv` port: `get` / `set` / `delete` on an in-memory map
//! - `echo` port: returns the message as received

use clap::{Parser, ValueEnum};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use context_bridge::{
    CallOptions, Config, DirectCaller, EventChannel, LocalTransport, Messenger, RawMessage,
    RelayListener, Route, TransportAvailability,
};

#[derive(Parser, Debug)]
#[command(name = "context-bridge", about = "Send one cross-context call")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, env = "CONTEXT_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// What the calling context can see of the native transport.
    #[arg(long, value_enum, default_value_t = Context::Restricted)]
    context: Context,

    /// Path selection for the call.
    #[arg(long, value_enum, default_value_t = RouteArg::Auto)]
    route: RouteArg,

    /// Logical port on the privileged side.
    #[arg(long, default_value = "echo")]
    port: String,

    /// Message type.
    #[arg(long = "type", default_value = "ping")]
    msg_type: String,

    /// Message payload as JSON.
    #[arg(long, default_value = "null")]
    msg: String,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Context {
    Privileged,
    Restricted,
    Unavailable,
}

impl From<Context> for TransportAvailability {
    fn from(context: Context) -> Self {
        match context {
            Context::Privileged => TransportAvailability::NativePrivileged,
            Context::Restricted => TransportAvailability::NativeRestricted,
            Context::Unavailable => TransportAvailability::Unavailable,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum RouteArg {
    Auto,
    Direct,
    Proxy,
}

impl From<RouteArg> for Route {
    fn from(route: RouteArg) -> Self {
        match route {
            RouteArg::Auto => Route::Auto,
            RouteArg::Direct => Route::Direct,
            RouteArg::Proxy => Route::Proxy,
        }
    }
}

fn kv_handler() -> impl Fn(&str, Value) -> Result<Value, String> + Send + Sync {
    let store: Mutex<HashMap<String, Value>> = Mutex::new(HashMap::new());
    move |msg_type: &str, msg: Value| {
        let key = msg
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing key".to_string())?
            .to_string();
        let mut store = store.lock().map_err(|e| e.to_string())?;
        match msg_type {
            "get" => Ok(store.get(&key).cloned().unwrap_or(Value::Null)),
            "set" => Ok(store
                .insert(key, msg.get("value").cloned().unwrap_or(Value::Null))
                .unwrap_or(Value::Null)),
            "delete" => Ok(json!(store.remove(&key).is_some())),
            other => Err(format!("unknown kv operation: {}", other)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::from_json_str(&std::fs::read_to_string(path)?)?,
        None => Config::default(),
    };

    // Initialize observability
    context_bridge::observability::init_tracing_with(&config.observability);

    // Privileged side: native transport with two ports, relayed onto the channel
    let transport = Arc::new(LocalTransport::new());
    transport.register("kv", Arc::new(kv_handler())).await?;
    transport
        .register(
            "echo",
            Arc::new(|msg_type: &str, msg: Value| -> Result<Value, String> {
                Ok(json!({"type": msg_type, "msg": msg}))
            }),
        )
        .await?;

    let channel = Arc::new(EventChannel::new());
    let direct = DirectCaller::new(&TransportAvailability::NativePrivileged, transport.clone())?;
    let relay = RelayListener::new(channel.clone(), direct, &config.channel);
    relay.start().await?;

    // Calling side
    let availability = TransportAvailability::from(cli.context);
    let messenger = Messenger::builder(Arc::new(availability))
        .transport(transport)
        .channel(channel)
        .config(config)
        .build()
        .await?;

    let msg = RawMessage::new(cli.msg_type, serde_json::from_str(&cli.msg)?);
    tracing::info!(
        context = %availability,
        route = ?cli.route,
        port = %cli.port,
        "Sending message"
    );

    let outcome = messenger
        .send_message_with(&cli.port, &msg, CallOptions::route(cli.route.into()))
        .await;

    relay.stop().await?;

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("error [{}]: {}", e.code(), e);
            std::process::exit(1);
        }
    }
}
