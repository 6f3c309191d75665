//! `truthcheck`: stream a verification or join an issue chat from a terminal.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::{info, warn};
use truth_realtime::observability::{LogSettings, init_with};
use truth_realtime::prelude::*;
use truth_realtime::stage::UI_STEP_COUNT;

#[derive(Parser)]
#[command(name = "truthcheck", version, about = "Truth-check realtime client")]
struct Cli {
    /// API base URL. Falls back to TRUTH_API_BASE_URL.
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// More log output (`-v` debug, `-vv` trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify a claim or URL and print progress events as they arrive.
    Check {
        /// Claim text or article URL.
        input: String,
        /// Force URL mode instead of inferring it from the input.
        #[arg(long, conflicts_with = "text")]
        url: bool,
        /// Force text mode even for input that looks like a URL.
        #[arg(long)]
        text: bool,
    },
    /// Join an issue chat; each stdin line is sent as a message.
    ///
    /// `/react <message-id>` toggles a reaction instead.
    Chat {
        #[arg(long)]
        issue: String,
        #[arg(long)]
        nickname: String,
        /// Defaults to a random id.
        #[arg(long)]
        user: Option<String>,
        #[arg(long, env = "TRUTH_CHAT_TOKEN")]
        token: Option<String>,
        /// Explicit socket URL instead of the configured chat endpoint.
        #[arg(long)]
        ws_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_with(LogSettings::from_env().verbosity(cli.verbose));

    let config = match cli.base_url {
        Some(base_url) => ClientConfig::new(base_url),
        None => ClientConfig::from_env().context("no --base-url given")?,
    };

    match cli.command {
        Command::Check { input, url, text } => {
            let request = if url {
                VerificationRequest::url(input)
            } else if text {
                VerificationRequest::text(input)
            } else {
                VerificationRequest::infer(input)
            };
            run_check(config, request).await
        }
        Command::Chat {
            issue,
            nickname,
            user,
            token,
            ws_url,
        } => {
            let user = user.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let mut join = ChatJoin::new(issue, user, nickname);
            if let Some(token) = token {
                join = join.token(token);
            }
            run_chat(config, join, ws_url).await
        }
    }
}

async fn run_check(config: ClientConfig, request: VerificationRequest) -> anyhow::Result<()> {
    let client = TruthClient::new(config)?;
    let mut stream = client
        .check_stream(request)
        .await
        .context("could not start verification")?;

    let mut verdict = None;
    let mut failure = None;
    while let Some(event) = stream.next_event().await {
        println!("{}", describe(&event));
        match event.kind {
            StreamEventKind::Complete => verdict = Some(event),
            StreamEventKind::Error => failure = Some(event),
            _ => {}
        }
    }

    match (verdict, failure) {
        (Some(event), _) => {
            println!(
                "verdict: {} (confidence {})",
                event.label().unwrap_or("?"),
                event
                    .confidence()
                    .map(|c| format!("{c:.2}"))
                    .unwrap_or_else(|| "n/a".into())
            );
            Ok(())
        }
        (None, Some(event)) => {
            anyhow::bail!(
                "verification failed: {}",
                event.message().unwrap_or("unknown error")
            )
        }
        (None, None) => anyhow::bail!("verification stream produced no events"),
    }
}

fn describe(event: &StreamEvent) -> String {
    let step = match (event.ui_step, event.ui_step_title.as_deref()) {
        (Some(step), Some(title)) => format!("[{step}/{UI_STEP_COUNT} {title}] "),
        (Some(step), None) => format!("[{step}/{UI_STEP_COUNT}] "),
        _ => String::new(),
    };
    let mut line = format!("{step}{}", event.event);
    if let Some(stage) = &event.stage {
        line.push_str(&format!(" stage={stage}"));
    }
    if let Some(idle) = event.idle_ms {
        line.push_str(&format!(" idle={idle}ms"));
    }
    if let Some(message) = event.message() {
        line.push_str(&format!(" message={message:?}"));
    }
    line
}

async fn run_chat(config: ClientConfig, join: ChatJoin, ws_url: Option<String>) -> anyhow::Result<()> {
    let client = TruthClient::new(config)?;
    let chat = client.chat_channel();
    let mut events = chat.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{event:?}");
        }
    });

    let issue_id = join.issue_id.clone();
    let user_id = join.user_id.clone();
    let nickname = join.nickname.clone();
    chat.connect(join, ws_url.as_deref())
        .await
        .context("could not open chat socket")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let sent = match line.strip_prefix("/react ") {
                    Some(message_id) => chat.toggle_reaction(&issue_id, message_id.trim(), &user_id),
                    None => chat.send_message(ChatMessageDraft::new(&issue_id, &user_id, &nickname, line)),
                };
                if let Err(e) = sent {
                    warn!(error = %e, "chat command not sent");
                    if chat.state() == ConnectionState::Closed {
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!(issue_id = %issue_id, "leaving chat");
    chat.disconnect();
    drop(chat);
    drop(client);
    printer.abort();
    Ok(())
}
