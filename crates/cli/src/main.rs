use clap::{Parser, Subcommand};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use lib::config::{self, Config};
use lib::message::{normalize_message, Sender};
use lib::notify::LogNotifier;
use lib::page::{PageContext, StaticPage};
use lib::session::{ConversationSession, SendOutcome, SessionOptions};
use lib::store::{ChatStorage, DurableStore, FileStore};
use lib::widget::WidgetSettings;

/// Host used for the widget's own URL when chatting from the terminal.
const LOCAL_BASE_URL: &str = "https://embedchat.local";

#[derive(Parser)]
#[command(name = "embedchat")]
#[command(about = "Embedchat CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory, a default config with an example widget, and the store directory.
    Init {
        /// Config file path (default: EMBEDCHAT_CONFIG_PATH or ~/.embedchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// List configured widgets.
    Widgets {
        /// Config file path (default: EMBEDCHAT_CONFIG_PATH or ~/.embedchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Chat through a widget's webhook (interactive). `/reset` clears the conversation, `/exit` quits.
    Chat {
        /// Config file path (default: EMBEDCHAT_CONFIG_PATH or ~/.embedchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Widget id from the config.
        #[arg(long, short, value_name = "ID")]
        widget: String,

        /// Webhook URL for this run (overrides config and EMBEDCHAT_WEBHOOK_URL).
        #[arg(long, value_name = "URL")]
        webhook: Option<String>,

        /// URL of the page the widget is pretending to be embedded in.
        #[arg(long, value_name = "URL")]
        page_url: Option<String>,
    },

    /// Run the webhook response parser on a file (or stdin) and print the normalized result.
    Parse {
        /// File holding a raw webhook response body.
        file: Option<PathBuf>,
    },

    /// Print the iframe embed code for a widget.
    Embed {
        /// Config file path (default: EMBEDCHAT_CONFIG_PATH or ~/.embedchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Widget id from the config.
        #[arg(long, short, value_name = "ID")]
        widget: String,

        /// Base URL where the chat app is served.
        #[arg(long, value_name = "URL")]
        base_url: String,
    },

    /// Clear a widget's stored conversation and thread id.
    Reset {
        /// Config file path (default: EMBEDCHAT_CONFIG_PATH or ~/.embedchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Widget id from the config.
        #[arg(long, short, value_name = "ID")]
        widget: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("embedchat {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Widgets { config }) => {
            if let Err(e) = run_widgets(config) {
                log::error!("widgets failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat {
            config,
            widget,
            webhook,
            page_url,
        }) => {
            if let Err(e) = run_chat(config, widget, webhook, page_url).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Parse { file }) => {
            if let Err(e) = run_parse(file) {
                log::error!("parse failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Embed {
            config,
            widget,
            base_url,
        }) => {
            if let Err(e) = run_embed(config, widget, base_url) {
                log::error!("embed failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Reset { config, widget }) => {
            if let Err(e) = run_reset(config, widget) {
                log::error!("reset failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    let store_dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", path.display());
    println!("conversations are stored in {}", store_dir.display());
    Ok(())
}

/// Load an initialized config and look up a widget in it.
fn load_widget(
    config_path: Option<PathBuf>,
    widget_id: &str,
) -> anyhow::Result<(Config, PathBuf, WidgetSettings)> {
    let (config, path) = config::load_config(config_path)?;
    lib::init::require_initialized(&path)?;
    let widget = config
        .widget(widget_id)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("no widget with id {} in {}", widget_id, path.display()))?;
    Ok((config, path, widget))
}

fn run_widgets(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = config::load_config(config_path)?;
    lib::init::require_initialized(&path)?;
    if config.widgets.is_empty() {
        println!("no widgets configured in {}", path.display());
        return Ok(());
    }
    for w in &config.widgets {
        let webhook = config::resolve_webhook_url(&config, Some(w));
        println!(
            "{}\t{}\t{}\t{}",
            w.id,
            w.display_name(),
            w.chat_title,
            webhook.as_deref().unwrap_or("(no webhook)")
        );
    }
    Ok(())
}

async fn run_chat(
    config_path: Option<PathBuf>,
    widget_id: String,
    webhook: Option<String>,
    page_url: Option<String>,
) -> anyhow::Result<()> {
    let (config, path, widget) = load_widget(config_path, &widget_id)?;
    let store_dir = config::resolve_store_dir(&config, &path);

    let own = lib::embed::iframe_embed_url(LOCAL_BASE_URL, &widget)?;
    let parent = match page_url {
        Some(u) => Some(StaticPage::parse(&u)?.own_url()),
        None => None,
    };
    let page = StaticPage::new(own).with_parent(parent);

    let webhook_url = webhook.or_else(|| config::resolve_webhook_url(&config, Some(&widget)));
    let options = SessionOptions::new(Arc::new(page), Arc::new(FileStore::open(&store_dir)))
        .with_webhook_url(webhook_url)
        .with_chat_title(widget.chat_title.clone())
        .with_timeout(config.webhook.timeout())
        .with_notifier(Arc::new(LogNotifier));
    let session = ConversationSession::new(options);

    println!("{} ({})", widget.chat_title, widget.display_name());
    let history = session.messages();
    if history.is_empty() {
        println!("{}", widget.empty_state_text);
    }
    for m in &history {
        print_message(m.sender, &m.text);
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim_end_matches(['\n', '\r']);
        if input.trim().is_empty() {
            continue;
        }
        let command = input.trim();
        if command.eq_ignore_ascii_case("/exit") || command.eq_ignore_ascii_case("/quit") {
            break;
        }
        if command.eq_ignore_ascii_case("/reset") {
            session.reset_chat();
            println!("{}", widget.empty_state_text);
            continue;
        }

        let before = session.messages().len();
        match session.send_message(input).await {
            SendOutcome::NotConfigured => {
                eprintln!("chat error: set a webhook URL with --webhook or in {}", path.display());
            }
            SendOutcome::Delivered { added: 0 } => {
                log::debug!("webhook replies were all duplicates");
            }
            _ => {
                for m in session.messages().iter().skip(before) {
                    if m.sender == Sender::Agent {
                        print_message(m.sender, &m.text);
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_message(sender: Sender, text: &str) {
    match sender {
        Sender::User => println!("> {}", text),
        Sender::Agent => println!("< {}", text.trim()),
    }
}

fn run_parse(file: Option<PathBuf>) -> anyhow::Result<()> {
    let raw = match file {
        Some(p) => std::fs::read_to_string(&p)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", p.display(), e))?,
        None => {
            let mut s = String::new();
            io::stdin().read_to_string(&mut s)?;
            s
        }
    };
    let (response, strategy) = lib::webhook::parse_with_strategy(&raw);
    match strategy {
        Some(s) => log::info!("parsed with strategy {}", s),
        None => log::warn!("all parse strategies failed; using fallback"),
    }
    let messages: Vec<_> = response.messages.iter().map(normalize_message).collect();
    let out = serde_json::json!({
        "strategy": strategy.map(|s| s.name()),
        "status": response.status,
        "error": response.error,
        "thread_id": response.thread_id,
        "messages": messages,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_embed(
    config_path: Option<PathBuf>,
    widget_id: String,
    base_url: String,
) -> anyhow::Result<()> {
    let (_, _, widget) = load_widget(config_path, &widget_id)?;
    println!("{}", lib::embed::iframe_embed_code(&base_url, &widget)?);
    Ok(())
}

fn run_reset(config_path: Option<PathBuf>, widget_id: String) -> anyhow::Result<()> {
    let (config, path, widget) = load_widget(config_path, &widget_id)?;
    let store_dir = config::resolve_store_dir(&config, &path);
    let store: Arc<dyn DurableStore> = Arc::new(FileStore::open(&store_dir));
    ChatStorage::new(store, Some(&widget.id)).clear();
    println!("cleared conversation for widget {}", widget.id);
    Ok(())
}
