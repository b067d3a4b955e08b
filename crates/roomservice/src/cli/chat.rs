//! `roomservice chat`: an ordering conversation over stdin/stdout.

use anyhow::Context;
use roomservice_core::{NluProviderKind, SessionManager, TurnInput};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::output::render_outcome;
use super::CatalogArgs;

const GREETING: &str =
    "Welcome to room service. What would you like to order? (type 'reset' to start over, 'quit' to leave)";
const RESET_REPLY: &str = "Starting over. What would you like to order?";
const EXPIRED_REPLY: &str = "Your previous conversation timed out, so we are starting fresh.";

#[derive(Debug, clap::Args)]
pub struct ChatArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Room number applied to every order
    #[arg(long)]
    pub room: Option<u32>,

    /// Language understanding provider (lexical or claude)
    #[arg(long)]
    pub provider: Option<NluProviderKind>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChatStats {
    pub turns: u32,
    pub confirmed: u32,
}

pub fn run(args: ChatArgs, config_path: &Path) -> anyhow::Result<()> {
    let mut config = super::load_engine_config(config_path)?;
    args.catalog.apply(&mut config);
    if let Some(provider) = args.provider {
        config.nlu.provider = provider;
    }
    let engine = super::build_engine(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        let manager = Arc::new(SessionManager::new(engine, config.sessions.idle_ttl()));
        let sweeper = manager.spawn_sweeper(config.sessions.sweep_interval());

        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let result = converse(&manager, args.room, stdin, &mut stdout).await;
        sweeper.abort();

        let stats = result?;
        tracing::info!(turns = stats.turns, confirmed = stats.confirmed, "chat ended");
        Ok(())
    })
}

/// Drive one guest conversation until `quit` or end of input.
pub async fn converse<R, W>(
    manager: &SessionManager,
    room: Option<u32>,
    reader: R,
    writer: &mut W,
) -> anyhow::Result<ChatStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut session = manager.open_session();
    let mut stats = ChatStats::default();
    let mut lines = reader.lines();
    say(writer, GREETING).await?;

    loop {
        writer.write_all(b"> ").await?;
        writer.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        match text.to_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" => break,
            "reset" => {
                manager.reset_session(&session).await?;
                say(writer, RESET_REPLY).await?;
                continue;
            }
            _ => {}
        }

        let mut input = TurnInput::new(text);
        if let Some(room) = room {
            input = input.with_room(room);
        }
        let outcome = match manager.handle_turn(&session, input.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "session expired, opening a new one");
                session = manager.open_session();
                say(writer, EXPIRED_REPLY).await?;
                manager.handle_turn(&session, input).await?
            }
        };

        stats.turns += 1;
        if outcome.is_confirmed() {
            stats.confirmed += 1;
        }
        say(writer, &render_outcome(&outcome)).await?;
    }

    manager.close_session(&session);
    say(writer, "Goodbye.").await?;
    Ok(stats)
}

async fn say<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> std::io::Result<()> {
    writer.write_all(text.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::tests::write_fixture;
    use std::time::Duration;

    #[tokio::test]
    async fn test_chat_confirms_an_order() {
        let (_temp, config) = write_fixture("{}");
        let engine = crate::cli::build_engine(&config).unwrap();
        let manager = SessionManager::new(engine, Duration::from_secs(60));

        let input: &[u8] = b"one club sandwich to room 412\nreset\nquit\n";
        let mut output = Vec::new();
        let stats = converse(&manager, None, input, &mut output).await.unwrap();

        let transcript = String::from_utf8(output).unwrap();
        assert_eq!(stats, ChatStats { turns: 1, confirmed: 1 });
        assert!(transcript.contains("confirmed for room 412"));
        assert!(transcript.contains(RESET_REPLY));
        assert!(transcript.ends_with("Goodbye.\n"));
        assert_eq!(manager.session_count(), 0);
    }

    #[tokio::test]
    async fn test_chat_room_flag_and_sold_out_question() {
        let (_temp, config) = write_fixture(r#"{"Latte": 2}"#);
        let engine = crate::cli::build_engine(&config).unwrap();
        let manager = SessionManager::new(engine, Duration::from_secs(60));

        let input: &[u8] = b"2 lattes\n1 latte\n";
        let mut output = Vec::new();
        let stats = converse(&manager, Some(101), input, &mut output)
            .await
            .unwrap();

        let transcript = String::from_utf8(output).unwrap();
        assert_eq!(stats, ChatStats { turns: 2, confirmed: 1 });
        assert!(transcript.contains("confirmed for room 101"));
        assert!(transcript.contains("Latte"));
        assert_eq!(manager.engine().ledger().remaining("Latte"), Some(0));
    }
}
