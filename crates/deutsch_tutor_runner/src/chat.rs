//! Line-oriented terminal chat.
//!
//! Every line is a message, except for the commands below:
//! `/neu` starts a new conversation, `/debug` shows the raw model output for
//! the last turn, `/verlauf` prints the conversation again, `/ende` quits.

use deutsch_tutor::Turn;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::llm_client::ModelBackend;
use crate::session::{Session, SessionError};

pub fn render_turn(turn: &Turn) -> String {
    let mut out = format!("Du: {}\n", turn.user);
    if !turn.correction.is_empty() {
        out.push_str(&format!("Korrektur: {}\n", turn.correction));
    }
    if !turn.explanation.is_empty() {
        out.push_str(&format!("Erklärung: {}\n", turn.explanation));
    }
    out.push_str(&format!("Agent: {}\n", turn.reply));
    out
}

pub async fn run_chat<R, W>(
    session: &mut Session,
    backend: &ModelBackend,
    input: R,
    mut out: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    out.write_all(b"Deutsch-Lern-Agent. Befehle: /neu /debug /verlauf /ende\n")
        .await?;
    out.flush().await?;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let text = match line.trim() {
            "/ende" => break,
            "/neu" => {
                session.reset();
                "Neues Gespräch.\n".to_string()
            }
            "/verlauf" => {
                if session.turns().is_empty() {
                    "Noch kein Verlauf vorhanden.\n".to_string()
                } else {
                    session
                        .turns()
                        .iter()
                        .map(render_turn)
                        .collect::<Vec<_>>()
                        .join("---\n")
                }
            }
            "/debug" => match session.debug_raw(backend).await {
                Ok(raw) => format!("Roh-Antwort:\n{raw}\n"),
                Err(SessionError::NoHistory) => "Noch kein Verlauf vorhanden.\n".to_string(),
                Err(e) => format!("Fehler: {e}\n"),
            },
            message => match session.send(backend, message).await {
                Ok(turn) => render_turn(&turn),
                // Blank lines are ignored.
                Err(SessionError::EmptyMessage) => continue,
                Err(e) => format!("Fehler: {e}\n"),
            },
        };
        out.write_all(text.as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}
