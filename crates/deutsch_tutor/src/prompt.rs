use crate::turn::{window, Turn};

/// Number of earlier turns replayed into each prompt.
pub const MAX_HISTORY_TURNS: usize = 8;

/// Written in place of the history block when there is nothing to replay.
pub const NO_HISTORY_PLACEHOLDER: &str = "(keine)";

/// Explanation the model is told to use when the sentence needs no change.
/// The instruction text below spells it out literally.
pub const NO_CHANGE_SENTINEL: &str = "Keine Änderung nötig.";

fn instructions() -> String {
    [
        "Du bist ein geduldiger Deutschlehrer und Sprachpartner.",
        "WICHTIG: Antworte AUSSCHLIESSLICH auf Deutsch. Verwende kein Englisch.",
        "ANTWORTFORMAT (genau so, ohne zusätzlichen Text):",
        "KORREKTUR: <korrigierter Satz>",
        "ERKLÄRUNG: <sehr kurze Erklärung, 1 Satz, einfach>",
        "ANTWORT: <eine natürliche Fortsetzung oder Frage, 1-2 Sätze>",
        "",
        "Regeln:",
        "- Wenn der Satz korrekt ist, setze KORREKTUR identisch und ERKLÄRUNG = \"Keine Änderung nötig.\"",
        "- KORREKTUR soll einen vollständigen, grammatisch korrekten Satz enthalten (Groß-/Kleinschreibung).",
        "- Keine Einleitungen wie \"Hier ist...\" oder \"Guten Tag\" extra, nur die drei Felder.",
        "- Wenn die Frage es verlangt, gib in ANTWORT konkrete Listen oder Beispiele (kurz).",
        "",
        "Beispiele (die Antwort MUSS genau dieses Format haben):",
        "",
        "Beispiel 1:",
        "Nutzer: i möchte deutsch lernen",
        "KORREKTUR: Ich möchte Deutsch lernen.",
        "ERKLÄRUNG: Großschreibung von \"Ich\" und \"Deutsch\".",
        "ANTWORT: Sehr gut! Warum möchtest du Deutsch lernen?",
        "",
        "Beispiel 2:",
        "Nutzer: Guten Tag",
        "KORREKTUR: Guten Tag.",
        "ERKLÄRUNG: Keine Änderung nötig.",
        "ANTWORT: Guten Tag! Wie geht es dir?",
        "",
        "Beispiel 3:",
        "Nutzer: sagst du mir seven tages name",
        "KORREKTUR: Sagst du mir die sieben Tagesnamen?",
        "ERKLÄRUNG: \"seven\" ist Englisch; auf Deutsch heißt es \"sieben\".",
        "ANTWORT: Montag, Dienstag, Mittwoch, Donnerstag, Freitag, Samstag, Sonntag.",
    ]
    .join("\n")
}

/// Renders the prompt for one model call.
///
/// Only the last `history_window` turns are replayed, and only their `user`
/// and `reply` fields: corrections never feed back into the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBuilder {
    history_window: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            history_window: MAX_HISTORY_TURNS,
        }
    }
}

impl PromptBuilder {
    pub fn with_history_window(history_window: usize) -> Self {
        Self { history_window }
    }

    pub fn history_window(&self) -> usize {
        self.history_window
    }

    /// No validation happens here; callers reject empty messages first.
    pub fn build(&self, history: &[Turn], message: &str) -> String {
        let history_text = self.serialize_history(history);
        format!(
            "{}\n\nJetzt das Gespräch (erst der Verlauf, dann die neue Nachricht):\nGESPRÄCHSVERLAUF:\n{}\n\nNEUE NACHRICHT:\n{}\n",
            instructions(),
            history_text,
            message
        )
    }

    fn serialize_history(&self, history: &[Turn]) -> String {
        let recent = window(history, self.history_window);
        if recent.is_empty() {
            return NO_HISTORY_PLACEHOLDER.to_string();
        }
        recent
            .iter()
            .map(|t| format!("Du: {}\nAgent: {}", t.user, t.reply))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// [`PromptBuilder::build`] with the default window of [`MAX_HISTORY_TURNS`].
pub fn build_prompt(history: &[Turn], message: &str) -> String {
    PromptBuilder::default().build(history, message)
}
