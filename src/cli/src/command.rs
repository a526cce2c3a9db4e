/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    New,
    Switch(String),
    List,
    Agents,
    Register(String),
    Tasks,
    Pending,
    Events,
    ApiKey(String),
    Attach { path: String, text: String },
    Retry(String),
    Discard(String),
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub const HELP: &str = "\
commands:
  /new                     start a conversation
  /switch <id>             switch conversation
  /list                    list conversations
  /agents                  list registered agents
  /register <url>          register an agent
  /tasks                   list tasks
  /pending                 show pending messages
  /events                  show backend events
  /apikey <key>            update the backend api key
  /attach <path> [text]    send an image with optional text
  /retry <id>              resend a failed message
  /discard <id>            drop a failed message
  /quit                    exit
anything else is sent as a message";

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Send(line.to_string());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        match name {
            "new" => Self::New,
            "list" | "ls" => Self::List,
            "agents" => Self::Agents,
            "tasks" => Self::Tasks,
            "pending" => Self::Pending,
            "events" => Self::Events,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            "switch" => required(arg, "usage: /switch <id>", Self::Switch),
            "register" => required(arg, "usage: /register <url>", Self::Register),
            "apikey" => required(arg, "usage: /apikey <key>", Self::ApiKey),
            "retry" => required(arg, "usage: /retry <id>", Self::Retry),
            "discard" => required(arg, "usage: /discard <id>", Self::Discard),
            "attach" => {
                let (path, text) = match arg.split_once(char::is_whitespace) {
                    Some((path, text)) => (path, text.trim()),
                    None => (arg, ""),
                };
                if path.is_empty() {
                    Self::Invalid("usage: /attach <path> [text]".to_string())
                } else {
                    Self::Attach {
                        path: path.to_string(),
                        text: text.to_string(),
                    }
                }
            }
            other => Self::Invalid(format!("unknown command /{other}; try /help")),
        }
    }
}

fn required(arg: &str, usage: &str, build: fn(String) -> Command) -> Command {
    if arg.is_empty() {
        Command::Invalid(usage.to_string())
    } else {
        build(arg.to_string())
    }
}
