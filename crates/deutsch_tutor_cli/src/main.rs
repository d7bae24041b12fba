//! Reads raw model output on stdin and prints the parsed fields as JSON.

use std::io::{Read, Write};

use deutsch_tutor::reply_parser::{locate_labels, parse_reply, LabelledSpan};
use deutsch_tutor::StructuredReply;
use serde::Serialize;

#[derive(Serialize)]
struct ParseOutput {
    #[serde(flatten)]
    reply: StructuredReply,
    labels: Vec<LabelledSpan>,
}

fn parse_output(input: &str) -> ParseOutput {
    ParseOutput {
        reply: parse_reply(input),
        labels: locate_labels(input),
    }
}

fn main() {
    let mut input = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut input) {
        let _ = writeln!(std::io::stderr(), "failed to read stdin: {e}");
        std::process::exit(2);
    }

    let out = parse_output(&input);

    let mut w = std::io::stdout();
    match serde_json::to_string(&out) {
        Ok(json) => {
            let _ = writeln!(w, "{json}");
        }
        Err(e) => {
            let _ = writeln!(std::io::stderr(), "encode error: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn output_flattens_fields_and_lists_labels() {
        let input = "ANTWORT: Wohin?\nKORREKTUR: Ich gehe.";
        let value = serde_json::to_value(parse_output(input)).unwrap();
        assert_eq!(
            value,
            json!({
                "correction": "Ich gehe.",
                "explanation": "",
                "reply": "Wohin?",
                "labels": [
                    {"label": "Antwort", "start": 0, "content_start": 8},
                    {"label": "Korrektur", "start": 16, "content_start": 26},
                ],
            })
        );
    }

    #[test]
    fn unlabelled_input_has_no_labels() {
        let value = serde_json::to_value(parse_output("  Hallo!  ")).unwrap();
        assert_eq!(value["reply"], "Hallo!");
        assert_eq!(value["labels"], json!([]));
    }
}
