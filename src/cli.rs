//! Interactive terminal driver
//!
//! Reads user lines, prints the assistant's reply and asks for approval
//! whenever a turn suspends on a staged action. Generic over the reader and
//! writer so tests can script a whole session.

use crate::oracle::Oracle;
use crate::runtime::{AgentError, AgentRuntime, CheckpointStore, ToolExecutor, TurnOutcome};
use crate::state_machine::Decision;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const USER_PROMPT: &str = "You: ";
const APPROVAL_PROMPT: &str = "Approve (yes/no): ";

/// Run the chat loop until `quit`, `exit` or end of input
pub async fn run_chat<S, O, T, R, W>(
    runtime: &AgentRuntime<S, O, T>,
    session_id: &str,
    input: R,
    mut output: W,
) -> std::io::Result<()>
where
    S: CheckpointStore,
    O: Oracle,
    T: ToolExecutor,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    // Pick up a suspension left over from a previous run
    if let Ok(conv) = runtime.get(session_id).await {
        if let Some(action) = conv.pending_action() {
            let outcome = TurnOutcome::AwaitingDecision {
                prompt: action.approval_prompt(),
                pending_action: action.clone(),
            };
            if !settle(runtime, session_id, outcome, &mut lines, &mut output).await? {
                return write(&mut output, "Goodbye!\n").await;
            }
        }
    }

    loop {
        write(&mut output, USER_PROMPT).await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text.eq_ignore_ascii_case("quit") || text.eq_ignore_ascii_case("exit") {
            break;
        }

        match runtime.advance(session_id, Some(text.to_string())).await {
            Ok(outcome) => {
                if !settle(runtime, session_id, outcome, &mut lines, &mut output).await? {
                    break;
                }
            }
            Err(e) => report(&mut output, &e).await?,
        }
    }

    write(&mut output, "Goodbye!\n").await
}

/// Print a turn outcome, collecting decisions until the turn completes.
///
/// Returns `false` when input ran out while a decision was pending, or when a
/// failed decision left the session unreadable.
async fn settle<S, O, T, R, W>(
    runtime: &AgentRuntime<S, O, T>,
    session_id: &str,
    outcome: TurnOutcome,
    lines: &mut tokio::io::Lines<R>,
    output: &mut W,
) -> std::io::Result<bool>
where
    S: CheckpointStore,
    O: Oracle,
    T: ToolExecutor,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut prompt = match outcome {
        TurnOutcome::Completed { reply } => return reply_line(output, &reply).await.map(|()| true),
        TurnOutcome::AwaitingDecision { prompt, .. } => prompt,
    };

    loop {
        write(output, &format!("{prompt}\n{APPROVAL_PROMPT}")).await?;
        let Some(line) = lines.next_line().await? else {
            return Ok(false);
        };

        let decision = Decision::normalize(&line);
        match runtime.resume(session_id, &decision).await {
            Ok(TurnOutcome::Completed { reply }) => {
                reply_line(output, &reply).await?;
                return Ok(true);
            }
            Ok(TurnOutcome::AwaitingDecision { prompt: next, .. }) => prompt = next,
            Err(AgentError::InvalidDecision(e)) => {
                write(output, &format!("{e}\n")).await?;
            }
            Err(e) => {
                report(output, &e).await?;
                // A failed turn keeps the checkpoint, so ask again while it waits
                match runtime.get(session_id).await {
                    Ok(conv) => match conv.pending_action() {
                        Some(action) => prompt = action.approval_prompt(),
                        None => return Ok(true),
                    },
                    Err(e) => {
                        report(output, &e).await?;
                        return Ok(false);
                    }
                }
            }
        }
    }
}

async fn reply_line<W: AsyncWrite + Unpin>(output: &mut W, reply: &str) -> std::io::Result<()> {
    write(output, &format!("Bot: {reply}\n")).await
}

async fn report<W: AsyncWrite + Unpin>(output: &mut W, error: &AgentError) -> std::io::Result<()> {
    tracing::warn!(error = %error, "Turn failed");
    write(output, &format!("Error: {error}\n")).await
}

async fn write<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> std::io::Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.flush().await
}
