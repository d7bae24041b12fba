use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::turn::StructuredReply;

/// One of the three labels of the reply template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Label {
    Korrektur,
    Erklaerung,
    Antwort,
}

impl Label {
    pub const ALL: [Label; 3] = [Label::Korrektur, Label::Erklaerung, Label::Antwort];

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Korrektur => "KORREKTUR",
            Label::Erklaerung => "ERKLÄRUNG",
            Label::Antwort => "ANTWORT",
        }
    }

    fn from_match(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|l| l.as_str().to_lowercase() == name.to_lowercase())
    }
}

/// Where a label occurrence sits in the raw text (byte offsets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabelledSpan {
    pub label: Label,
    /// Start of the label, including any emphasis markers in front of it.
    pub start: usize,
    /// First byte after the colon and any emphasis markers following it.
    pub content_start: usize,
}

fn label_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    // A label only counts when its name is followed by a colon; a bare
    // "Antwort" inside prose is content. Markdown emphasis (`_`, `*`) around
    // a label belongs to the label, not to the neighbouring fields.
    RE.get_or_init(|| {
        Regex::new(r"(?i)[_*]*(KORREKTUR|ERKLÄRUNG|ANTWORT)[ \t_*]*:[_*]*").ok()
    })
    .as_ref()
}

/// All label occurrences in order of appearance.
pub fn locate_labels(text: &str) -> Vec<LabelledSpan> {
    let Some(re) = label_regex() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|c| {
            let whole = c.get(0)?;
            let label = Label::from_match(c.get(1)?.as_str())?;
            Some(LabelledSpan {
                label,
                start: whole.start(),
                content_start: whole.end(),
            })
        })
        .collect()
}

/// Content of the first occurrence of `label`, up to the next label of any
/// kind or the end of the text.
fn field(text: &str, spans: &[LabelledSpan], label: Label) -> String {
    let Some(idx) = spans.iter().position(|s| s.label == label) else {
        return String::new();
    };
    let start = spans[idx].content_start;
    let end = spans.get(idx + 1).map_or(text.len(), |next| next.start);
    text[start..end].trim().to_string()
}

/// Splits a raw model reply into its three fields.
///
/// Never fails: when none of the labels yields content, the whole trimmed
/// text becomes the reply.
pub fn parse_reply(raw: &str) -> StructuredReply {
    let spans = locate_labels(raw);
    let parsed = StructuredReply {
        correction: field(raw, &spans, Label::Korrektur),
        explanation: field(raw, &spans, Label::Erklaerung),
        reply: field(raw, &spans, Label::Antwort),
    };
    if parsed.is_empty() {
        return StructuredReply::reply_only(raw.trim());
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_reports_offsets_in_order() {
        let text = "ANTWORT: a\nkorrektur : b";
        let spans = locate_labels(text);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].label, Label::Antwort);
        assert_eq!(spans[0].start, 0);
        assert_eq!(&text[spans[0].content_start..spans[1].start], " a\n");
        assert_eq!(spans[1].label, Label::Korrektur);
        assert_eq!(&text[spans[1].content_start..], " b");
    }

    #[test]
    fn label_is_found_inside_longer_word() {
        let text = "GEGENANTWORT: x";
        let spans = locate_labels(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].label, Label::Antwort);
        assert_eq!(spans[0].start, 5);
        assert_eq!(&text[spans[0].content_start..], " x");
    }

    #[test]
    fn emphasis_markers_belong_to_the_label() {
        let text = "**KORREKTUR:** a\n_ANTWORT_: b";
        let spans = locate_labels(text);
        assert_eq!(spans.len(), 2);
        assert_eq!(&text[spans[0].content_start..spans[1].start], " a\n");
        assert_eq!(&text[spans[1].content_start..], " b");
    }

    #[test]
    fn lowercase_umlaut_label_is_recognized() {
        let spans = locate_labels("erklärung: weil");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].label, Label::Erklaerung);
    }
}
