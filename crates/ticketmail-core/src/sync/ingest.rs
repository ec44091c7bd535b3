//! Text heuristics applied to inbound messages.

use crate::mail::NOTIFICATION_SIGNATURE;

const TICKET_PREFIX: &str = "[ticket #";

/// First lines that mark a message as machine-generated.
const AUTOMATED_SIGNATURES: &[&str] = &[NOTIFICATION_SIGNATURE];

/// Separator lines that start a forwarded or quoted original.
const SEPARATORS: &[&str] = &[
    "-----original message-----",
    "-----ursprüngliche nachricht-----",
    "-----message d'origine-----",
    "-----mensaje original-----",
    "-----forwarded message-----",
    "---------- forwarded message ----------",
];

/// Header lines that start a quoted original in most clients.
const HEADER_PREFIXES: &[&str] = &["from:", "von:", "de :", "de:"];

/// Extracts `<code>` from a `[Ticket #<code>]` token anywhere in `subject`.
///
/// Matching ignores case; the code must be non-empty and consist of ASCII
/// letters, digits, `-` or `_`.
#[must_use]
pub fn extract_ticket_code(subject: &str) -> Option<String> {
    let lower = subject.to_ascii_lowercase();
    let mut offset = 0;
    while let Some(found) = lower[offset..].find(TICKET_PREFIX) {
        let start = offset + found + TICKET_PREFIX.len();
        let rest = &subject[start..];
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        if len > 0 && rest[len..].starts_with(']') {
            return Some(rest[..len].to_string());
        }
        offset = start;
    }
    None
}

/// Whether the first non-empty line is a known notification signature.
#[must_use]
pub fn is_automated(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .is_some_and(|first| {
            AUTOMATED_SIGNATURES
                .iter()
                .any(|signature| first.starts_with(signature))
        })
}

/// Keeps only the text before the earliest quoted/forwarded marker, with
/// trailing whitespace removed.
///
/// Recognised markers: `On … wrote:` (also split over two lines) and its
/// German, French and Spanish forms, `From:`-style header lines,
/// `-----Original Message-----`-style separators, Outlook underscore rules
/// and `>` quote prefixes.
#[must_use]
pub fn truncate_quoted(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let lines: Vec<&str> = text.lines().collect();

    let mut cut = None;
    for (index, line) in lines.iter().enumerate() {
        let next = lines.get(index + 1).copied().unwrap_or_default();
        if is_marker(line, next) {
            cut = Some(index);
            break;
        }
    }

    let kept = cut.map_or(&lines[..], |index| &lines[..index]);
    kept.join("\n").trim_end().to_string()
}

fn is_marker(line: &str, next: &str) -> bool {
    let trimmed = line.trim();
    let lower = trimmed.to_lowercase();

    if trimmed.starts_with('>') {
        return true;
    }
    if SEPARATORS.iter().any(|sep| lower.starts_with(sep)) {
        return true;
    }
    if trimmed.len() >= 10 && trimmed.chars().all(|c| c == '_') {
        return true;
    }
    if HEADER_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
        return true;
    }

    let attribution = |opening: &str, closing: &[&str]| {
        if !lower.starts_with(opening) {
            return false;
        }
        let joined = format!("{lower} {}", next.trim().to_lowercase());
        closing
            .iter()
            .any(|end| lower.ends_with(end) || joined.trim_end().ends_with(end))
    };
    attribution("on ", &["wrote:"])
        || attribution("am ", &["schrieb:"])
        || (lower.starts_with("am ") && lower.contains(" schrieb ") && lower.ends_with(':'))
        || attribution("le ", &["a écrit :", "a écrit:"])
        || attribution("el ", &["escribió:"])
}

/// Deduplication key for a fetched message: its `Message-ID`, or a
/// synthetic `<folder>:<uidvalidity>:<uid>` when the header is missing.
#[must_use]
pub fn external_id(message_id: Option<&str>, folder: &str, uid_validity: u32, uid: u32) -> String {
    message_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map_or_else(|| format!("{folder}:{uid_validity}:{uid}"), str::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ticket_code_extraction() {
        assert_eq!(
            extract_ticket_code("[Ticket #AB12CD] Need help").as_deref(),
            Some("AB12CD")
        );
        assert_eq!(
            extract_ticket_code("Re: AW: [ticket #ab12cd] Need help").as_deref(),
            Some("ab12cd")
        );
        assert_eq!(
            extract_ticket_code("[Ticket #] [Ticket #X-1] twice").as_deref(),
            Some("X-1")
        );
        assert_eq!(extract_ticket_code("Ticket AB12CD"), None);
        assert_eq!(extract_ticket_code("[Ticket #AB 12]"), None);
        assert_eq!(extract_ticket_code("Prüfung [Ticket #ÄB]"), None);
    }

    #[test]
    fn automated_signature_on_first_line() {
        let body = format!("\n  {NOTIFICATION_SIGNATURE}\n\nDana replied:");
        assert!(is_automated(&body));
        assert!(!is_automated(&format!("Thanks!\n{NOTIFICATION_SIGNATURE}")));
        assert!(!is_automated(""));
    }

    #[test]
    fn truncates_english_reply_header() {
        let text = "Thanks, that works.\n\nOn Fri, 1 Mar 2024 at 10:00, Desk <desk@example.com> wrote:\n> old";
        assert_eq!(truncate_quoted(text), "Thanks, that works.");
    }

    #[test]
    fn truncates_wrapped_reply_header() {
        let text = "Yes.\nOn Fri, 1 Mar 2024 at 10:00, Thesis Desk\n<desk@example.com> wrote:\n\nold";
        assert_eq!(truncate_quoted(text), "Yes.");
    }

    #[test]
    fn truncates_at_earliest_marker() {
        let text = "Top\r\n-----Original Message-----\r\nFrom: desk@example.com\r\nOn x wrote:";
        assert_eq!(truncate_quoted(text), "Top");
    }

    #[test]
    fn truncates_locale_variants() {
        assert_eq!(
            truncate_quoted("Danke\nAm 01.03.2024 um 10:00 schrieb Desk <desk@example.com>:\nalt"),
            "Danke"
        );
        assert_eq!(
            truncate_quoted("Merci\nLe ven. 1 mars 2024, Desk a écrit :\nancien"),
            "Merci"
        );
        assert_eq!(
            truncate_quoted("Gracias\nEl vie, 1 mar 2024, Desk escribió:\nviejo"),
            "Gracias"
        );
        assert_eq!(truncate_quoted("Hallo\nVon: desk@example.com\nalt"), "Hallo");
        assert_eq!(truncate_quoted("Hi\n________________________________\nFrom: x"), "Hi");
    }

    #[test]
    fn keeps_text_without_markers() {
        let text = "From my side this is fine.\nOn Monday I will send chapter 3.";
        assert_eq!(truncate_quoted(text), text);
    }

    #[test]
    fn external_id_fallback() {
        assert_eq!(external_id(Some(" <a@b> "), "INBOX", 5, 9), "<a@b>");
        assert_eq!(external_id(None, "INBOX", 5, 9), "INBOX:5:9");
        assert_eq!(external_id(Some(""), "Sent", 1, 2), "Sent:1:2");
    }
}
