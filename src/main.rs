use anyhow::Result;
use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{error, info, warn, LevelFilter};
use std::path::PathBuf;
use std::sync::Arc;
use std::{env, io};

mod ui;
mod utils;

use crate::ui::{ChatUI, CrosstermBackend, Terminal, UiAction};
use tutorlink::api::auth::RegisterData;
use tutorlink::api::tutors::TutorQuery;
use tutorlink::chat::polling::{Poller, DEFAULT_POLL_INTERVAL};
use tutorlink::chat::{ChatStore, CurrentUser, StoreEvent};
use tutorlink::directory::DirectoryCache;
use tutorlink::models::{MessageId, Role, User};
use tutorlink::session::{load_session, save_session, Session};
use tutorlink::ApiClient;

/// Command line arguments for TutorLink
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "TutorLink: a terminal client for the tutoring marketplace.",
    long_about = "TutorLink is a terminal chat and tutor-browsing client. All data lives \
    behind the marketplace HTTP API; this client keeps a local conversation cache that it \
    synchronizes by polling while a chat is open."
)]
struct Args {
    /// Base URL of the marketplace API
    #[arg(long, value_name = "URL", default_value = "http://localhost:8000")]
    server: String,

    /// Log file path
    #[arg(long, value_name = "PATH", default_value = "tutorlink.log")]
    log_file: PathBuf,

    /// Create a new account before logging in
    #[arg(long)]
    register: bool,

    /// Ignore any saved session and log in from scratch
    #[arg(long)]
    fresh_login: bool,
}

/// Prompts the user for login credentials or uses environment variables
fn prompt_credentials() -> Result<(String, String)> {
    let username = match env::var("TUTORLINK_USERNAME") {
        Ok(username) => username,
        Err(_) => {
            eprintln!("Enter username:");
            utils::read_line()?
        }
    };

    let password = match env::var("TUTORLINK_PASSWORD") {
        Ok(password) => password,
        Err(_) => {
            eprintln!("Enter password:");
            utils::read_line()?
        }
    };

    Ok((username, password))
}

async fn register_account(api: &ApiClient) -> Result<User> {
    eprintln!("Enter email:");
    let email = utils::read_line()?;
    eprintln!("Enter username:");
    let username = utils::read_line()?;
    eprintln!("Enter password:");
    let password = utils::read_line()?;
    eprintln!("Role (student/teacher):");
    let role = match utils::read_line()?.to_lowercase().as_str() {
        "teacher" => Role::Teacher,
        _ => Role::Student,
    };

    let user = api
        .register(&RegisterData {
            email,
            username: username.clone(),
            password: password.clone(),
            role,
        })
        .await?;

    let auth = api.login(&username, &password).await?;
    save_or_warn(&Session::new(api.base_url(), &user, &auth.access_token));
    Ok(user)
}

/// Resume a saved session if its token still works, otherwise log in fresh.
async fn establish_session(api: &ApiClient, args: &Args) -> Result<User> {
    if args.register {
        return register_account(api).await;
    }

    if !args.fresh_login {
        if let Some(session) = load_session()? {
            if session.server == api.base_url() {
                if let Some(token) = session.get_token() {
                    api.set_token(&token);
                    match api.current_user().await {
                        Ok(user) => {
                            info!("Resumed session for {}", user.username);
                            return Ok(user);
                        }
                        Err(e) => {
                            warn!("Saved session no longer valid, logging in again: {}", e);
                            api.clear_token();
                        }
                    }
                }
            }
        }
    }

    let (username, password) = prompt_credentials()?;
    let auth = api.login(&username, &password).await?;
    let user = api.current_user().await?;
    save_or_warn(&Session::new(api.base_url(), &user, &auth.access_token));
    Ok(user)
}

fn save_or_warn(session: &Session) {
    if let Err(e) = save_session(session) {
        eprintln!("Warning: Failed to save session: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    utils::setup_logging(args.log_file.to_str(), LevelFilter::Debug)?;
    info!("TutorLink client starting up");
    info!("API server: {}", args.server);
    info!("Logging to file: {}", args.log_file.display());

    let api = Arc::new(ApiClient::new(&args.server));

    let user = match establish_session(&api, &args).await {
        Ok(user) => user,
        Err(e) => {
            let details = format!("Could not sign in to {}: {}", args.server, e);
            error!("{}", details);
            eprintln!(
                "{}\nPlease check:\n\
                 - Network connectivity\n\
                 - Server address is correct\n\
                 - Username and password are correct",
                details
            );
            return Err(anyhow::anyhow!(details));
        }
    };
    info!("Signed in as {} ({:?})", user.username, user.role);

    let current = CurrentUser {
        id: user.id,
        role: user.role,
    };

    // Warm the directory in the background; names degrade to placeholders
    // until (and unless) it finishes.
    let directory = Arc::new(DirectoryCache::new(user.role, api.clone()));
    {
        let directory = directory.clone();
        tokio::spawn(async move {
            if let Err(e) = directory.initialize().await {
                warn!("{}", e);
            }
        });
    }

    let (store, mut store_events) = ChatStore::new(current, api.clone());
    let poller = Poller::new(store.clone());

    if let Err(e) = store.refresh_all().await {
        warn!("Initial conversation refresh failed: {}", e);
    }

    // Students browse tutors; the listing is fetched once and filtered
    // locally from then on.
    let tutors = match user.role {
        Role::Student => match api.list_tutors(&TutorQuery::new().with_page(0, 100)).await {
            Ok(tutors) => tutors,
            Err(e) => {
                warn!("Could not fetch tutor listing: {}", e);
                Vec::new()
            }
        },
        Role::Teacher => Vec::new(),
    };

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut chat_ui = ChatUI::new(current, directory);
    chat_ui.set_tutors(tutors);

    let result = run_app(
        &mut terminal,
        &mut chat_ui,
        &store,
        &poller,
        &mut store_events,
    )
    .await;

    // Terminal teardown, even if the loop failed
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    poller.stop_all();
    if let Err(e) = &result {
        error!("UI loop exited with error: {}", e);
    }
    info!("TutorLink client shut down");
    result
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    chat_ui: &mut ChatUI,
    store: &Arc<ChatStore>,
    poller: &Poller,
    store_events: &mut tokio::sync::mpsc::Receiver<StoreEvent>,
) -> Result<()> {
    let current_user = store.current_user();

    loop {
        // Drain store notifications into the UI
        while let Ok(event) = store_events.try_recv() {
            match event {
                StoreEvent::SendFailed(_) => {
                    chat_ui.show_banner("Failed to send message. Press Enter to retry.");
                }
                StoreEvent::LoadFailed(_) => {
                    chat_ui.show_banner("Connection problem - showing cached messages.");
                }
                StoreEvent::ConversationUpdated(_) => {}
            }
        }
        chat_ui.clean_banner();

        chat_ui.set_conversations(store.list_conversations(), store.total_unread());

        if let Some(counterparty) = chat_ui.active_counterparty() {
            // Anything incoming and unread is on screen now; mark it read.
            if let Some(conversation) = store.conversation(counterparty) {
                for message in &conversation.messages {
                    if message.is_incoming(current_user.id) && !message.is_read {
                        if let MessageId::Confirmed(id) = message.id {
                            store.mark_message_read(id);
                        }
                    }
                }
            }
            chat_ui.set_chat(store.conversation(counterparty));
        }

        terminal.draw(|frame| chat_ui.draw(frame))?;

        match chat_ui.handle_input()? {
            Some(UiAction::Quit) => break,
            Some(UiAction::OpenConversation(counterparty)) => {
                poller.start(counterparty, DEFAULT_POLL_INTERVAL);
            }
            Some(UiAction::LeaveChat) => {
                poller.stop_all();
            }
            Some(UiAction::SendMessage {
                counterparty,
                content,
            }) => {
                // The optimistic entry is already visible once send_message
                // returns to the executor; failures surface as SendFailed.
                let store = store.clone();
                tokio::spawn(async move {
                    if let Err(e) = store.send_message(counterparty, &content).await {
                        warn!("{}", e);
                    }
                });
            }
            None => {}
        }
    }

    Ok(())
}
