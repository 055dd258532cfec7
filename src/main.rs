//! # ragchat CLI
//!
//! Terminal front end for a RAG chat backend: chat with streamed answers,
//! manage documents and uploads, watch background tasks, and administer
//! users.
//!
//! ## Usage
//!
//! ```bash
//! ragchat --config ./config/ragchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat login <user>` | Sign in and store tokens in the session file |
//! | `ragchat chat "<message>"` | Ask a question, streaming the answer |
//! | `ragchat history` | Show the stored conversation |
//! | `ragchat render [file]` | Render markdown to sanitized HTML (offline) |
//! | `ragchat docs <action>` | List, upload, tag, move, process, delete documents |
//! | `ragchat tasks <action>` | Inspect, create, cancel and watch background tasks |
//! | `ragchat users <action>` | User administration |
//! | `ragchat analytics <report>` | Analytics reports as JSON |
//! | `ragchat schema <action>` | Schema introspection and EXPLAIN |
//! | `ragchat system <action>` | Models, statistics and health |
//! | `ragchat prefs <action>` | Theme and panel preferences |

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use ragchat::admin::{self, NewUser, UserUpdate};
use ragchat::analytics::{self, Report};
use ragchat::auth::{self, Registration};
use ragchat::chat::{parse_metadata_filters, ChatReply, ChatRequest, ChatSession};
use ragchat::client::ApiClient;
use ragchat::config::{self, Config};
use ragchat::conversation::{self, Role};
use ragchat::documents::{self, DocumentFilter, ProcessRequest};
use ragchat::error::{ApiError, ChatError};
use ragchat::files::collect_files;
use ragchat::markdown::{self, RenderMode};
use ragchat::models::{Document, User};
use ragchat::progress::ProgressMode;
use ragchat::schema::{self, ExplainRequest};
use ragchat::session::SessionStore;
use ragchat::stream::{HtmlTranscript, ResponseSink};
use ragchat::system;
use ragchat::tasks::{self, NewTask, Priority, Task, TaskPoller, TaskQuery, TaskStatus};
use ragchat::upload::{UploadOptions, UploadQueue, Uploader};

/// ragchat: chat with your documents from the terminal.
///
/// Server commands read `--config` (TOML). `render`, `history`, `prefs`,
/// `logout` and `completions` work without a config file.
#[derive(Parser)]
#[command(
    name = "ragchat",
    about = "Terminal client for a retrieval-augmented chat service",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragchat.toml")]
    config: PathBuf,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in. The password is read from stdin when not given.
    Login {
        username: String,
        #[arg(long, env = "RAGCHAT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forget stored credentials.
    Logout,

    /// Show the signed-in user.
    Whoami,

    /// Create an account.
    Register {
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        password: Option<String>,
        /// Password confirmation. Read from stdin when not given.
        #[arg(long)]
        confirm: Option<String>,
    },

    /// Ask a question.
    ///
    /// The answer streams to stdout as it arrives. With `--html` the final
    /// answer is printed as sanitized HTML instead.
    Chat {
        message: String,

        #[arg(long)]
        model: Option<String>,

        /// Answer without document retrieval.
        #[arg(long)]
        no_rag: bool,

        /// Wait for the whole answer instead of streaming.
        #[arg(long)]
        no_stream: bool,

        /// Metadata filter as a JSON object, e.g. '{"folder":"policies"}'.
        #[arg(long)]
        filters: Option<String>,

        #[arg(long)]
        temperature: Option<f64>,

        #[arg(long)]
        max_tokens: Option<u32>,

        /// Print the rendered HTML of the answer.
        #[arg(long)]
        html: bool,

        /// Render mode for `--html`: `markdown` or `raw`.
        #[arg(long)]
        render: Option<String>,

        /// If the stream times out, resend once without streaming.
        #[arg(long)]
        retry_on_timeout: bool,
    },

    /// Clear the conversation locally and on the server.
    ChatClear,

    /// Show the stored conversation.
    History {
        #[arg(long)]
        json: bool,
    },

    /// Render markdown from a file (or stdin) to sanitized HTML.
    Render {
        file: Option<PathBuf>,

        /// Escape the text instead of interpreting markdown.
        #[arg(long)]
        raw: bool,

        /// Use the light pass applied to partial answers while streaming.
        #[arg(long)]
        incremental: bool,
    },

    /// Manage documents.
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },

    /// Background tasks.
    Tasks {
        #[command(subcommand)]
        action: TasksAction,
    },

    /// User administration (admin only).
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// Print an analytics report as JSON.
    Analytics {
        /// One of: overview, queries, documents, users, performance.
        #[arg(value_parser = parse_report)]
        report: Report,

        /// Only include the last N days.
        #[arg(long)]
        days: Option<u32>,
    },

    /// Database schema introspection.
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },

    /// Backend models, statistics and health.
    System {
        #[command(subcommand)]
        action: SystemAction,
    },

    /// Display preferences stored in the session file.
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },

    /// Print shell completions.
    Completions { shell: clap_complete::Shell },
}

#[derive(Subcommand)]
enum DocsAction {
    /// List all documents.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one document with its content.
    Show { id: String },
    /// List documents matching tags and/or a folder.
    Filter {
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        folder: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Upload files or directories, then process them.
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        folder: Option<String>,
        /// Upload one file per request even when several are queued.
        #[arg(long)]
        sequential: bool,
        /// Skip the process step.
        #[arg(long)]
        no_process: bool,
        #[arg(long)]
        strategy: Option<String>,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        chunk_overlap: Option<usize>,
        /// Progress output: off, human or json. Defaults to human on a terminal.
        #[arg(long)]
        progress: Option<String>,
    },
    /// Chunk and index uploaded documents.
    Process {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        strategy: Option<String>,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },
    /// Replace a document's tags.
    Tag { id: String, tags: Vec<String> },
    /// Move a document to a folder.
    Move { id: String, folder: String },
    /// Delete a document.
    Delete { id: String },
    /// Delete every document.
    ClearAll {
        /// Required confirmation.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum TasksAction {
    List {
        #[arg(long, value_parser = parse_status)]
        status: Option<TaskStatus>,
        #[arg(long = "type")]
        task_type: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    Show { id: String },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long = "type")]
        task_type: String,
        /// Parameters as a JSON object.
        #[arg(long, default_value = "")]
        params: String,
        #[arg(long, value_parser = parse_priority, default_value = "normal")]
        priority: Priority,
        /// RFC 3339 timestamp.
        #[arg(long, value_parser = parse_timestamp)]
        scheduled_at: Option<DateTime<Utc>>,
    },
    /// Cancel a task that has not finished yet.
    Cancel { id: String },
    Stats,
    /// Refresh the task list until Ctrl-C.
    Watch {
        #[arg(long, value_parser = parse_status)]
        status: Option<TaskStatus>,
        #[arg(long = "type")]
        task_type: Option<String>,
        /// Seconds between refreshes. Defaults to `tasks.refresh_secs`.
        #[arg(long)]
        interval: Option<u64>,
        /// Stop after this many refreshes.
        #[arg(long)]
        iterations: Option<usize>,
    },
}

#[derive(Subcommand)]
enum UsersAction {
    List {
        #[arg(long)]
        json: bool,
    },
    Show { username: String },
    Create {
        username: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        confirm: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        admin: bool,
    },
    Update {
        username: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        admin: Option<bool>,
        #[arg(long)]
        password: Option<String>,
    },
    Delete { username: String },
}

#[derive(Subcommand)]
enum SchemaAction {
    Tables,
    Describe { table: String },
    /// Show the query plan of a SELECT or WITH statement.
    Explain {
        query: String,
        #[arg(long)]
        analyze: bool,
    },
}

#[derive(Subcommand)]
enum SystemAction {
    Models,
    Stats,
    Health,
}

#[derive(Subcommand)]
enum PrefsAction {
    Show,
    /// Set the theme: light, dark or system.
    Theme { theme: String },
    /// Collapse (or with --expand, expand) a panel.
    Collapse {
        panel: String,
        #[arg(long)]
        expand: bool,
    },
}

fn parse_report(s: &str) -> Result<Report, String> {
    Report::parse(s).ok_or_else(|| format!("unknown report '{}'", s))
}

fn parse_status(s: &str) -> Result<TaskStatus, String> {
    TaskStatus::parse(s).ok_or_else(|| format!("unknown task status '{}'", s))
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    Priority::parse(s).ok_or_else(|| format!("unknown priority '{}'", s))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {}", s, e))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(hint) = hint_for(&e) {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("ragchat=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn hint_for(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(e) = err.downcast_ref::<ApiError>() {
        return e.hint();
    }
    match err.downcast_ref::<ChatError>() {
        Some(ChatError::Api(e)) => e.hint(),
        Some(ChatError::Timeout { .. }) => {
            Some("Re-run with --retry-on-timeout or --no-stream to wait for the full answer.")
        }
        _ => None,
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Commands that don't require a server
    match &cli.command {
        Commands::Render {
            file,
            raw,
            incremental,
        } => {
            let text = read_input(file.as_deref())?;
            let mode = if *raw {
                RenderMode::Raw
            } else {
                RenderMode::Markdown
            };
            let html = if *incremental {
                markdown::render_incremental(&text, mode)
            } else {
                markdown::render(&text, mode)
            };
            println!("{}", html);
            return Ok(());
        }
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "ragchat", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let command = match LocalCommand::split(cli.command) {
        Ok(local) => {
            // Use config if available, otherwise a minimal default
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            let session = open_session(&cfg)?;
            return run_local(local, session).await;
        }
        Err(command) => command,
    };

    let cfg = config::load_config(&cli.config)?;
    let client = ApiClient::new(&cfg, open_session(&cfg)?)?;

    match command {
        Commands::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => read_line("Password: ")?,
            };
            auth::login(&client, &username, &password).await?;
            println!("Logged in as {}.", username);
        }
        Commands::Whoami => {
            let user = auth::current_user(&client).await?;
            print_user(&user);
        }
        Commands::Register {
            username,
            email,
            full_name,
            password,
            confirm,
        } => {
            let password = match password {
                Some(p) => p,
                None => read_line("Password: ")?,
            };
            let confirm = match confirm {
                Some(c) => c,
                None => read_line("Confirm password: ")?,
            };
            let reg = Registration {
                username,
                email,
                password,
                full_name,
            };
            let user = auth::register(&client, &reg, &confirm).await?;
            println!("Registered {}. Run `ragchat login {}` to sign in.", user.username, user.username);
        }
        Commands::Chat {
            message,
            model,
            no_rag,
            no_stream,
            filters,
            temperature,
            max_tokens,
            html,
            render,
            retry_on_timeout,
        } => {
            let mut chat_cfg = cfg.chat.clone();
            if model.is_some() {
                chat_cfg.model = model;
            }
            if no_rag {
                chat_cfg.use_rag = false;
            }
            if no_stream {
                chat_cfg.stream = false;
            }
            if temperature.is_some() {
                chat_cfg.temperature = temperature;
            }
            if max_tokens.is_some() {
                chat_cfg.max_tokens = max_tokens;
            }
            let mode = match render {
                Some(r) => RenderMode::parse(&r)
                    .with_context(|| format!("Unknown render mode '{}'", r))?,
                None => chat_cfg.render_mode(),
            };

            let mut request = ChatRequest::new(message, &chat_cfg);
            if let Some(f) = filters {
                request.metadata_filters = parse_metadata_filters(&f)?;
            }
            let session = ChatSession::new(
                client,
                Duration::from_secs(chat_cfg.stream_timeout_secs),
            );

            let reply = if html {
                let mut sink = HtmlTranscript::new(mode);
                let reply = send_chat(&session, request, &mut sink, retry_on_timeout).await?;
                println!("{}", sink.html());
                reply
            } else {
                let mut sink = TerminalSink::default();
                send_chat(&session, request, &mut sink, retry_on_timeout).await?
            };
            print_sources(&reply);
        }
        Commands::ChatClear => {
            conversation::clear_conversation(&client).await?;
            println!("Conversation cleared.");
        }
        Commands::Docs { action } => run_docs(&client, &cfg, action).await?,
        Commands::Tasks { action } => run_tasks(&client, &cfg, action).await?,
        Commands::Users { action } => run_users(&client, action).await?,
        Commands::Analytics { report, days } => {
            let value = analytics::fetch_report(&client, report, days).await?;
            print_json(&value)?;
        }
        Commands::Schema { action } => match action {
            SchemaAction::Tables => print_json(&schema::list_tables(&client).await?)?,
            SchemaAction::Describe { table } => {
                print_json(&schema::describe_table(&client, &table).await?)?
            }
            SchemaAction::Explain { query, analyze } => {
                let request = ExplainRequest::new(&query, analyze)?;
                print_json(&schema::explain(&client, &request).await?)?;
            }
        },
        Commands::System { action } => match action {
            SystemAction::Models => {
                for m in system::list_models(&client).await? {
                    match m.size {
                        Some(size) => println!("{:<40} {}", m.name, ragchat::progress::format_bytes(size)),
                        None => println!("{}", m.name),
                    }
                }
            }
            SystemAction::Stats => print_json(&system::stats(&client).await?)?,
            SystemAction::Health => {
                let health = system::health(&client).await?;
                print_json(&health)?;
                if !health.is_healthy() {
                    bail!("backend reports status '{}'", health.status);
                }
            }
        },
        Commands::Render { .. }
        | Commands::Completions { .. }
        | Commands::Logout
        | Commands::History { .. }
        | Commands::Prefs { .. } => bail!("this command does not use the server"),
    }

    Ok(())
}

fn open_session(cfg: &Config) -> Result<SessionStore> {
    let path = cfg.session.resolved_path();
    SessionStore::open(&path)
        .with_context(|| format!("Failed to open session file: {}", path.display()))
}

/// Commands that only touch the session file.
enum LocalCommand {
    Logout,
    History { json: bool },
    Prefs(PrefsAction),
}

impl LocalCommand {
    /// Pull out the session-only commands; anything else is handed back.
    fn split(command: Commands) -> std::result::Result<Self, Commands> {
        match command {
            Commands::Logout => Ok(Self::Logout),
            Commands::History { json } => Ok(Self::History { json }),
            Commands::Prefs { action } => Ok(Self::Prefs(action)),
            other => Err(other),
        }
    }
}

async fn run_local(command: LocalCommand, session: SessionStore) -> Result<()> {
    match command {
        LocalCommand::Logout => {
            session.clear_credentials().await?;
            println!("Logged out.");
        }
        LocalCommand::History { json } => {
            let Some(conv) = session.conversation().await else {
                println!("No conversation yet.");
                return Ok(());
            };
            if json {
                print_json(&conv)?;
                return Ok(());
            }
            println!(
                "Conversation {} ({} messages, ~{} tokens)",
                conv.id,
                conv.messages.len(),
                conv.estimated_tokens()
            );
            for m in &conv.messages {
                let who = match m.role {
                    Role::User => "you",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                };
                println!("\n[{}] {}", who, m.timestamp.format("%Y-%m-%d %H:%M"));
                println!("{}", m.content);
            }
        }
        LocalCommand::Prefs(action) => match action {
            PrefsAction::Show => print_json(&session.preferences().await)?,
            PrefsAction::Theme { theme } => {
                session.set_theme(&theme).await?;
                println!("Theme set to {}.", theme);
            }
            PrefsAction::Collapse { panel, expand } => {
                session.set_panel_collapsed(&panel, !expand).await?;
                println!(
                    "Panel {} {}.",
                    panel,
                    if expand { "expanded" } else { "collapsed" }
                );
            }
        },
    }
    Ok(())
}

/// Prints fragments as they arrive.
#[derive(Default)]
struct TerminalSink {
    printed: String,
}

impl ResponseSink for TerminalSink {
    fn on_update(&mut self, _accumulated: &str, fragment: &str) {
        self.printed.push_str(fragment);
        print!("{}", fragment);
        let _ = std::io::stdout().flush();
    }

    fn on_complete(&mut self, text: &str) {
        // Non-streamed answers and retries arrive here in one piece.
        match text.strip_prefix(self.printed.as_str()) {
            Some(rest) => print!("{}", rest),
            None => print!("\n{}", text),
        }
        println!();
        self.printed.clear();
    }
}

async fn send_chat(
    session: &ChatSession,
    request: ChatRequest,
    sink: &mut dyn ResponseSink,
    retry_on_timeout: bool,
) -> Result<ChatReply> {
    match session.send_until(request, &mut *sink, ctrl_c()).await {
        Ok(reply) => Ok(reply),
        Err(ChatError::Timeout { secs, retry }) if retry_on_timeout => {
            eprintln!(
                "Stream timed out after {}s, retrying without streaming...",
                secs
            );
            Ok(session.send_until(*retry, sink, ctrl_c()).await?)
        }
        Err(e) => Err(e.into()),
    }
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn print_sources(reply: &ChatReply) {
    if reply.sources.is_empty() {
        return;
    }
    eprintln!("\nSources:");
    for source in &reply.sources {
        let label = source
            .get("filename")
            .or_else(|| source.get("title"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| source.to_string());
        eprintln!("  - {}", label);
    }
}

async fn run_docs(client: &ApiClient, cfg: &Config, action: DocsAction) -> Result<()> {
    match action {
        DocsAction::List { json } => {
            let docs = documents::list_documents(client).await?;
            print_documents(&docs, json)?;
        }
        DocsAction::Show { id } => {
            let doc = documents::get_document(client, &id).await?;
            println!("--- {} ---", doc.id);
            println!("filename: {}", doc.filename);
            println!("uploaded: {}", fmt_time(doc.upload_date));
            println!("chunks:   {}", doc.chunk_count);
            println!("folder:   {}", doc.folder.as_deref().unwrap_or("-"));
            println!("tags:     {}", doc.tags.join(", "));
            if let Some(content) = &doc.content {
                println!("\n{}", content);
            }
        }
        DocsAction::Filter { tags, folder, json } => {
            let filter = DocumentFilter { tags, folder };
            let docs = documents::filter_documents(client, &filter).await?;
            print_documents(&docs, json)?;
        }
        DocsAction::Upload {
            paths,
            tags,
            folder,
            sequential,
            no_process,
            strategy,
            chunk_size,
            chunk_overlap,
            progress,
        } => {
            let mode = match progress {
                Some(p) => ProgressMode::parse(&p)
                    .with_context(|| format!("Unknown progress mode '{}'", p))?,
                None => ProgressMode::default_for_tty(),
            };
            let files = collect_files(&paths, &cfg.upload)?;
            let mut queue = UploadQueue::new();
            for path in &files {
                if let Err(e) = queue.add_path(path) {
                    eprintln!("Skipping {}: {}", path.display(), e);
                }
            }
            if queue.is_empty() {
                bail!("No files to upload");
            }

            let process = (!no_process)
                .then(|| process_request(Vec::new(), cfg, strategy, chunk_size, chunk_overlap));
            let options = UploadOptions {
                tags,
                folder,
                batch: cfg.upload.batch && !sequential,
                process,
            };
            let uploader = Uploader::new(client.clone(), mode.reporter());
            let summary = uploader.upload(&queue, &options).await?;

            println!("Uploaded {} of {} files.", summary.uploaded.len(), queue.len());
            for (name, error) in &summary.failed {
                println!("  failed: {} ({})", name, error);
            }
            if summary.processed.is_some() {
                println!("Processing started for {} documents.", summary.uploaded.len());
            }
            if !summary.failed.is_empty() {
                bail!("{} file(s) failed to upload", summary.failed.len());
            }
        }
        DocsAction::Process {
            ids,
            strategy,
            chunk_size,
            chunk_overlap,
        } => {
            let request = process_request(ids, cfg, strategy, chunk_size, chunk_overlap);
            let result = documents::process_documents(client, &request).await?;
            print_json(&result)?;
        }
        DocsAction::Tag { id, tags } => {
            documents::update_tags(client, &id, &tags).await?;
            println!("Tags updated for {}.", id);
        }
        DocsAction::Move { id, folder } => {
            documents::update_folder(client, &id, &folder).await?;
            println!("Moved {} to {}.", id, folder);
        }
        DocsAction::Delete { id } => {
            documents::delete_document(client, &id).await?;
            println!("Deleted {}.", id);
        }
        DocsAction::ClearAll { yes } => {
            if !yes {
                bail!("Refusing to delete every document without --yes");
            }
            documents::clear_all(client).await?;
            println!("All documents deleted.");
        }
    }
    Ok(())
}

fn process_request(
    ids: Vec<String>,
    cfg: &Config,
    strategy: Option<String>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
) -> ProcessRequest {
    let mut request = ProcessRequest::new(ids, &cfg.upload);
    if let Some(s) = strategy {
        request.chunking_strategy = s;
    }
    if let Some(n) = chunk_size {
        request.chunk_size = n;
    }
    if let Some(n) = chunk_overlap {
        request.chunk_overlap = n;
    }
    request
}

fn print_documents(docs: &[Document], json: bool) -> Result<()> {
    if json {
        return print_json(&docs);
    }
    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for doc in docs {
        println!(
            "{:<36}  {:<32}  {:>5} chunks  {:<16}  {}",
            doc.id,
            doc.filename,
            doc.chunk_count,
            doc.folder.as_deref().unwrap_or("-"),
            doc.tags.join(",")
        );
    }
    Ok(())
}

async fn run_tasks(client: &ApiClient, cfg: &Config, action: TasksAction) -> Result<()> {
    let color = atty::is(atty::Stream::Stdout);
    match action {
        TasksAction::List {
            status,
            task_type,
            limit,
            json,
        } => {
            let query = TaskQuery {
                status,
                task_type,
                limit,
            };
            let list = tasks::list_tasks(client, &query).await?;
            if json {
                print_json(&list)?;
            } else {
                print_tasks(&list, color);
            }
        }
        TasksAction::Show { id } => {
            let task = tasks::get_task(client, &id).await?;
            print_json(&task)?;
        }
        TasksAction::Create {
            name,
            task_type,
            params,
            priority,
            scheduled_at,
        } => {
            let task = NewTask {
                name,
                task_type,
                params: tasks::parse_params(&params)?,
                priority,
                scheduled_at,
            };
            let created = tasks::create_task(client, &task).await?;
            println!("Created task {}.", created.id);
        }
        TasksAction::Cancel { id } => {
            tasks::cancel_task(client, &id).await?;
            println!("Cancelled task {}.", id);
        }
        TasksAction::Stats => print_json(&tasks::task_stats(client).await?)?,
        TasksAction::Watch {
            status,
            task_type,
            interval,
            iterations,
        } => {
            let every = Duration::from_secs(interval.unwrap_or(cfg.tasks.refresh_secs).max(1));
            let query = TaskQuery {
                status,
                task_type,
                limit: None,
            };
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let poller = TaskPoller::start(client.clone(), query, every, move |result| {
                let _ = tx.send(result);
            });

            let mut refreshes = 0usize;
            let outcome = loop {
                tokio::select! {
                    _ = ctrl_c() => break Ok(()),
                    msg = rx.recv() => match msg {
                        Some(Ok(list)) => {
                            println!("--- {} ---", Utc::now().format("%H:%M:%S"));
                            print_tasks(&list, color);
                        }
                        Some(Err(e @ ApiError::LoginRequired { .. })) => break Err(e),
                        Some(Err(e)) => eprintln!("refresh failed: {}", e),
                        None => break Ok(()),
                    },
                }
                refreshes += 1;
                if iterations.is_some_and(|n| refreshes >= n) {
                    break Ok(());
                }
            };
            poller.stop().await;
            outcome?;
        }
    }
    Ok(())
}

fn print_tasks(list: &[Task], color: bool) {
    if list.is_empty() {
        println!("No tasks.");
        return;
    }
    for t in list {
        println!(
            "{:<12}  {:<24}  {:<16}  {:<10}  {:<8}  {:>3}%  {}",
            t.id,
            t.name,
            t.task_type,
            t.status.badge().paint(color),
            t.priority.badge().paint(color),
            t.progress_percent(),
            fmt_time(t.created_at)
        );
        if let Some(err) = &t.error {
            println!("    error: {}", err);
        }
    }
}

async fn run_users(client: &ApiClient, action: UsersAction) -> Result<()> {
    match action {
        UsersAction::List { json } => {
            let users = admin::list_users(client).await?;
            if json {
                return print_json(&users);
            }
            for u in &users {
                println!(
                    "{:<20}  {:<30}  {:<8}  {}",
                    u.username,
                    u.email.as_deref().unwrap_or("-"),
                    if u.is_active { "active" } else { "inactive" },
                    if u.is_admin { "admin" } else { "" }
                );
            }
        }
        UsersAction::Show { username } => print_user(&admin::get_user(client, &username).await?),
        UsersAction::Create {
            username,
            password,
            confirm,
            email,
            full_name,
            admin: is_admin,
        } => {
            let password = match password {
                Some(p) => p,
                None => read_line("Password: ")?,
            };
            let confirm = match confirm {
                Some(c) => c,
                None => read_line("Confirm password: ")?,
            };
            let user = NewUser {
                username,
                password,
                email,
                full_name,
                is_admin,
            };
            let created = admin::create_user(client, &user, &confirm).await?;
            println!("Created user {}.", created.username);
        }
        UsersAction::Update {
            username,
            email,
            full_name,
            active,
            admin: is_admin,
            password,
        } => {
            let update = UserUpdate {
                email,
                full_name,
                is_active: active,
                is_admin,
                password,
            };
            let user = admin::update_user(client, &username, &update).await?;
            print_user(&user);
        }
        UsersAction::Delete { username } => {
            admin::delete_user(client, &username).await?;
            println!("Deleted user {}.", username);
        }
    }
    Ok(())
}

fn print_user(user: &User) {
    println!("username:   {}", user.username);
    println!("email:      {}", user.email.as_deref().unwrap_or("-"));
    println!("full name:  {}", user.full_name.as_deref().unwrap_or("-"));
    println!("active:     {}", user.is_active);
    println!("admin:      {}", user.is_admin);
    println!("created:    {}", fmt_time(user.created_at));
    println!("last login: {}", fmt_time(user.last_login));
}

fn fmt_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read from stdin")?;
            Ok(text)
        }
    }
}

fn read_line(prompt: &str) -> Result<String> {
    eprint!("{}", prompt);
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Commands {
        let mut argv = vec!["ragchat"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn session_only_commands_are_split_off() {
        assert!(matches!(LocalCommand::split(parse(&["logout"])), Ok(LocalCommand::Logout)));
        assert!(matches!(
            LocalCommand::split(parse(&["history", "--json"])),
            Ok(LocalCommand::History { json: true })
        ));
        assert!(matches!(
            LocalCommand::split(parse(&["prefs", "theme", "dark"])),
            Ok(LocalCommand::Prefs(PrefsAction::Theme { .. }))
        ));
    }

    #[test]
    fn server_commands_are_handed_back() {
        assert!(matches!(LocalCommand::split(parse(&["whoami"])), Err(Commands::Whoami)));
        assert!(matches!(
            LocalCommand::split(parse(&["system", "health"])),
            Err(Commands::System { .. })
        ));
    }
}
