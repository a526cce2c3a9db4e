mod command;

use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;

use parley_core::{
    Attachment, ClientConfig, Delivery, ParleyConfig, SyncController, SyncError, SyncEvent,
};
use parley_protocol::{Message, Role};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use command::{Command, HELP};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_filter())
        .with_writer(std::io::stderr)
        .init();

    let config = load_config();
    tracing::info!(base_url = %config.base_url, "connecting");
    let controller = SyncController::connect(config)?;

    let conversation_id = controller.initialize().await?;
    println!("conversation {conversation_id}  (/help for commands)");
    let renderer = tokio::spawn(render(controller.clone()));
    controller.start_feeds();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if !dispatch(&controller, Command::parse(&line)).await {
            break;
        }
    }

    controller.teardown();
    renderer.abort();
    Ok(())
}

/// Run one command. Returns `false` when the client should exit.
async fn dispatch(controller: &SyncController, command: Command) -> bool {
    match command {
        Command::Empty => {}
        Command::Quit => return false,
        Command::Help => println!("{HELP}"),
        Command::Invalid(usage) => println!("{usage}"),
        Command::Send(text) => spawn_send(controller, text, None),
        Command::Attach { path, text } => match read_image(&path).await {
            Ok(attachment) => spawn_send(controller, text, Some(attachment)),
            Err(err) => println!("{err}"),
        },
        Command::New => match controller.new_conversation().await {
            Ok(Some(id)) => println!("conversation {id}"),
            Ok(None) => println!("a conversation is already being created"),
            Err(err) => println!("could not create conversation: {err}"),
        },
        Command::Switch(id) => match controller.switch_conversation(&id).await {
            Ok(()) => println!("conversation {id}"),
            Err(err) => println!("{err}"),
        },
        Command::List => match controller.refresh_catalog().await {
            Ok(ids) => {
                let active = controller.active_conversation_id();
                for id in ids {
                    let marker = if active.as_deref() == Some(id.as_str()) {
                        '*'
                    } else {
                        ' '
                    };
                    println!("{marker} {id}");
                }
            }
            Err(err) => println!("{err}"),
        },
        Command::Agents => match controller.list_agents().await {
            Ok(agents) if agents.is_empty() => println!("no agents registered"),
            Ok(agents) => {
                for agent in agents {
                    println!("{}  {}", agent.name, agent.url);
                }
            }
            Err(err) => println!("{err}"),
        },
        Command::Register(url) => match controller.register_agent(&url).await {
            Ok(()) => println!("registered {url}"),
            Err(err) => println!("{err}"),
        },
        Command::Tasks => match controller.list_tasks().await {
            Ok(tasks) if tasks.is_empty() => println!("no tasks"),
            Ok(tasks) => {
                for task in tasks {
                    println!("{}  {}  {}", task.id, task.status, task.name);
                }
            }
            Err(err) => println!("{err}"),
        },
        Command::Pending => {
            let pending = controller.pending_messages();
            if pending.is_empty() {
                println!("no pending messages");
            }
            for message in pending {
                println!("[{}] {}", message.conversation_id, line_for(&message));
            }
        }
        Command::Events => {
            let events = controller.events();
            if events.is_empty() {
                println!("no events");
            }
            for event in events {
                let when = event
                    .timestamp_utc()
                    .map(|ts| ts.format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "--:--:--".to_string());
                println!("{when}  {}  {}", event.event_type, event.id);
            }
        }
        Command::ApiKey(key) => match controller.update_api_key(&key).await {
            Ok(()) => println!("api key updated"),
            Err(err) => println!("{err}"),
        },
        Command::Retry(id) => {
            let controller = controller.clone();
            tokio::spawn(async move {
                if let Err(err) = controller.retry(&id).await {
                    println!("{err}");
                }
            });
        }
        Command::Discard(id) => {
            if let Err(err) = controller.discard(&id) {
                println!("{err}");
            }
        }
    }
    true
}

fn spawn_send(controller: &SyncController, text: String, attachment: Option<Attachment>) {
    let controller = controller.clone();
    tokio::spawn(async move {
        match controller.send(&text, attachment).await {
            Ok(_) | Err(SyncError::Api(_)) => {}
            Err(err) => println!("{err}"),
        }
    });
}

async fn read_image(path: &str) -> Result<Attachment, String> {
    let mime = mime_guess::from_path(Path::new(path)).first_or_octet_stream();
    if mime.type_() != mime_guess::mime::IMAGE {
        return Err("Please select an image file".to_string());
    }
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| format!("read {path}: {e}"))?;
    Ok(Attachment::from_raw(mime.essence_str(), &raw))
}

/// Print messages of the active conversation as they reconcile.
async fn render(controller: SyncController) {
    let mut events = controller.subscribe();
    let mut printed: HashSet<String> = HashSet::new();
    print_new(&controller, &mut printed);
    loop {
        match events.recv().await {
            Ok(SyncEvent::ActiveChanged { conversation_id }) => {
                printed.clear();
                if let Some(id) = conversation_id {
                    println!("── {id}");
                }
            }
            Ok(SyncEvent::MessagesChanged { .. }) | Err(RecvError::Lagged(_)) => {
                print_new(&controller, &mut printed);
            }
            Ok(SyncEvent::DeliveryChanged {
                message_id,
                delivery: Delivery::Failed,
            }) => {
                println!("! send failed; /retry {message_id} or /discard {message_id}");
            }
            Ok(_) => {}
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_new(controller: &SyncController, printed: &mut HashSet<String>) {
    let snapshot = controller.snapshot();
    let Some(messages) = snapshot.messages else {
        return;
    };
    if messages.is_empty() && printed.is_empty() {
        println!("(no messages yet)");
    }
    for message in &messages {
        if printed.insert(message.id.clone()) {
            println!("{}", line_for(message));
        }
    }
}

fn line_for(message: &Message) -> String {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "agent",
        Role::System => "system",
    };
    format!("{who}> {}", message.summary())
}

fn load_config() -> ClientConfig {
    let file = ParleyConfig::load().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "ignoring config file");
        ParleyConfig::default()
    });
    let defaults = file.client_config();

    let base_url = env::var("PARLEY_BASE_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| defaults.base_url.clone());
    let message_poll_interval = parse_millis("PARLEY_POLL_MS", defaults.message_poll_interval);

    ClientConfig {
        base_url,
        message_poll_interval,
        ..defaults
    }
}

fn parse_millis(key: &str, default: Duration) -> Duration {
    match env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(default),
        Err(_) => default,
    }
}

fn tracing_filter() -> tracing_subscriber::EnvFilter {
    let explicit = env::var("PARLEY_LOG").or_else(|_| env::var("RUST_LOG")).ok();
    if let Some(filter) = explicit {
        return tracing_subscriber::EnvFilter::new(filter);
    }
    if matches!(
        env::var("PARLEY_DEBUG").as_deref(),
        Ok("1" | "true" | "TRUE" | "yes" | "YES")
    ) {
        return tracing_subscriber::EnvFilter::new("debug");
    }
    tracing_subscriber::EnvFilter::new("info")
}
