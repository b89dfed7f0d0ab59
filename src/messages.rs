use regex::Regex;
use scraper::Html;

use crate::backend::InboxMail;

/// The website generates html from text in a very specific (and
/// terrible) way: each line becomes a `<p>`, and the first of two
/// consecutive spaces becomes `&nbsp;`.
pub fn portal_html(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        out.push_str("<p>");
        let chars: Vec<char> = line.chars().collect();
        for i in 0..chars.len() {
            if i + 1 < chars.len() && chars[i] == ' ' && chars[i + 1] == ' ' {
                out.push_str("&nbsp;");
            } else {
                out.push(chars[i]);
            }
        }
        out.push_str("</p>");
    }
    out
}

/// Plain-text rendering of a portal html message for terminal display.
pub fn strip_html(html: &str) -> String {
    let br = Regex::new(r"(?i)<br\s*/?>").unwrap();
    let with_newlines = br.replace_all(html, "\n");
    let fragment = Html::parse_fragment(&with_newlines);
    fragment.root_element().text().collect::<String>()
}

/// Latest mail last, for easier reading in a terminal.
pub fn render_inbox(mails: &[InboxMail]) -> String {
    let mut out = String::new();
    for mail in mails.iter().rev() {
        out.push_str(&format!("From: {}\n", mail.sender));
        out.push_str(&format!("Received: {}\n", mail.received));
        out.push_str(&format!("Subject: {}\n", mail.subject));
        out.push_str(&strip_html(&mail.body_html));
        out.push_str("\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portal_html_wraps_lines() {
        assert_eq!(portal_html("bonjour\nau revoir"), "<p>bonjour</p><p>au revoir</p>");
    }

    #[test]
    fn test_portal_html_escapes_double_spaces() {
        assert_eq!(portal_html("a  b"), "<p>a&nbsp; b</p>");
        assert_eq!(portal_html("a b"), "<p>a b</p>");
    }

    #[test]
    fn test_strip_html() {
        let text = strip_html("<p>bonjour<br/>au revoir</p>");
        assert_eq!(text, "bonjour\nau revoir");
    }

    #[test]
    fn test_render_inbox_latest_last() {
        let mails = vec![
            InboxMail {
                sender: "B".into(),
                received: "02/01/2024".into(),
                subject: "second".into(),
                body_html: "<p>deux</p>".into(),
            },
            InboxMail {
                sender: "A".into(),
                received: "01/01/2024".into(),
                subject: "first".into(),
                body_html: "<p>un</p>".into(),
            },
        ];
        let out = render_inbox(&mails);
        let first = out.find("first").unwrap();
        let second = out.find("second").unwrap();
        assert!(first < second);
    }
}
