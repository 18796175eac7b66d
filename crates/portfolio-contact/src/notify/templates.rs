//! Inline email templates.
//!
//! Each template renders a subject plus matching plain-text and HTML bodies.
//! Interpolated values are HTML-escaped in the HTML part only.

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::config::EmailConfig;
use crate::submission::Submission;

const WRAPPER_STYLE: &str =
    "font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;";
const QUOTE_STYLE: &str =
    "background: #f5f5f5; padding: 15px; border-radius: 5px; white-space: pre-wrap;";

/// Settings shared by every template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    /// Name used to sign auto-replies.
    pub owner_name: String,
    /// Link back to the portfolio.
    pub portfolio_url: String,
    /// Address visitors can write to directly.
    pub owner_address: Option<String>,
    /// Offset used when printing timestamps.
    pub display_offset: FixedOffset,
}

impl TemplateContext {
    /// Build the context from email settings.
    ///
    /// An unrepresentable offset falls back to UTC.
    #[must_use]
    pub fn from_config(config: &EmailConfig) -> Self {
        let display_offset = FixedOffset::east_opt(config.display_utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        Self {
            owner_name: config.owner_name.clone(),
            portfolio_url: config.portfolio_url.clone(),
            owner_address: config.operator().map(str::to_string),
            display_offset,
        }
    }
}

/// A rendered email body pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub text: String,
    /// HTML body.
    pub html: String,
}

/// Operator notification for a new submission.
#[must_use]
pub fn operator_alert(submission: &Submission, ctx: &TemplateContext) -> Rendered {
    let when = format_timestamp(submission.timestamp, ctx.display_offset);

    let text = format!(
        "New Contact Form Submission\n\n\
         Name: {name}\n\
         Email: {email}\n\
         Subject: {subject}\n\n\
         Message:\n{message}\n\n\
         Submitted: {when}\n\n\
         IP Address: {ip}\n\
         User Agent: {ua}\n\n\
         ---\n\
         This email was sent from your portfolio contact form.",
        name = submission.name,
        email = submission.email,
        subject = submission.subject,
        message = submission.message,
        ip = submission.ip_address,
        ua = submission.user_agent,
    );

    let html = format!(
        r#"<div style="{WRAPPER_STYLE}">
  <h2>New Contact Form Submission</h2>
  <p><strong>Name:</strong> {name}</p>
  <p><strong>Email:</strong> <a href="mailto:{email}">{email}</a></p>
  <p><strong>Subject:</strong> {subject}</p>
  <p><strong>Message:</strong></p>
  <div style="{QUOTE_STYLE}">{message}</div>
  <p><strong>Timestamp:</strong> {when}</p>
  <p style="color: #888; font-size: 12px;">Sent from <a href="{url}">{url}</a></p>
</div>"#,
        name = escape_html(&submission.name),
        email = escape_html(&submission.email),
        subject = escape_html(&submission.subject),
        message = escape_html(&submission.message),
        when = escape_html(&when),
        url = escape_html(&ctx.portfolio_url),
    );

    Rendered {
        subject: format!("New Contact Form Submission: {}", submission.subject),
        text,
        html,
    }
}

/// Acknowledgement sent back to the visitor.
#[must_use]
pub fn auto_reply(submission: &Submission, ctx: &TemplateContext) -> Rendered {
    let mut text = format!(
        "Hi {name},\n\n\
         Thank you for reaching out through my portfolio contact form!\n\n\
         I have received your message regarding \"{subject}\" and will get back to you \
         as soon as possible, typically within 24-48 hours.\n\n\
         In the meantime, feel free to explore my portfolio: {url}\n\n\
         Best regards,\n\
         {owner}\n\n\
         ---\n\
         This is an automated response. Please do not reply to this email.",
        name = submission.name,
        subject = submission.subject,
        url = ctx.portfolio_url,
        owner = ctx.owner_name,
    );
    if let Some(address) = &ctx.owner_address {
        text.push_str(&format!(
            "\nIf you need immediate assistance, you can reach me at {address}"
        ));
    }

    let html = format!(
        r#"<div style="{WRAPPER_STYLE}">
  <h2>Thank you for contacting me!</h2>
  <p>Hi {name},</p>
  <p>Thank you for reaching out through my portfolio contact form!</p>
  <p>I have received your message regarding "{subject}" and will get back to you as soon as possible.</p>
  <p>In the meantime, feel free to explore <a href="{url}">my portfolio</a>.</p>
  <p>Best regards,<br>{owner}</p>
</div>"#,
        name = escape_html(&submission.name),
        subject = escape_html(&submission.subject),
        url = escape_html(&ctx.portfolio_url),
        owner = escape_html(&ctx.owner_name),
    );

    Rendered {
        subject: format!("Thank you for contacting me - {}", submission.subject),
        text,
        html,
    }
}

/// Test message used to check the SMTP setup end to end.
#[must_use]
pub fn test_message(now: DateTime<Utc>, ctx: &TemplateContext) -> Rendered {
    let when = format_timestamp(now, ctx.display_offset);

    let text = format!(
        "Portfolio Email Service Test\n\n\
         This is a test email to verify that your portfolio email service is working correctly.\n\n\
         Timestamp: {when}\n\n\
         If you received this email, your email configuration is working properly!"
    );

    let html = format!(
        r#"<div style="{WRAPPER_STYLE}">
  <h2 style="color: #3B82F6;">Email Service Test</h2>
  <p>This is a test email to verify that your portfolio email service is working correctly.</p>
  <p><strong>Timestamp:</strong> {when}</p>
  <p>If you received this email, your email configuration is working properly!</p>
</div>"#,
        when = escape_html(&when),
    );

    Rendered {
        subject: "Portfolio Email Service Test".to_string(),
        text,
        html,
    }
}

/// Format a timestamp in the display offset, e.g. `May 1, 2026, 05:30:00 PM (UTC+05:30)`.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    let local = ts.with_timezone(&offset);
    format!("{} (UTC{})", local.format("%B %-d, %Y, %I:%M:%S %p"), offset)
}

/// Escape the five HTML-significant characters.
#[must_use]
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use super::*;
    use crate::validation::ValidForm;

    fn ctx() -> TemplateContext {
        TemplateContext::from_config(&EmailConfig {
            notify_address: Some("owner@example.com".to_string()),
            ..EmailConfig::default()
        })
    }

    fn submission() -> Submission {
        let form = ValidForm {
            name: "Dennis O'Brien".to_string(),
            email: "dennis@example.com".to_string(),
            subject: "Tom & Jerry".to_string(),
            message: "Please look at a < b and c > d".to_string(),
        };
        let mut s = Submission::new(form, IpAddr::from([203, 0, 113, 9]), Some("Mozilla/5.0"));
        s.timestamp = DateTime::parse_from_rfc3339("2026-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        s
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_format_timestamp_uses_offset() {
        let ts = DateTime::parse_from_rfc3339("2026-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let ist = FixedOffset::east_opt(330 * 60).unwrap();
        assert_eq!(
            format_timestamp(ts, ist),
            "May 1, 2026, 05:30:00 PM (UTC+05:30)"
        );
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_utc() {
        let context = TemplateContext::from_config(&EmailConfig {
            display_utc_offset_minutes: 100_000,
            ..EmailConfig::default()
        });
        assert_eq!(context.display_offset, Utc.fix());
    }

    #[test]
    fn test_operator_alert() {
        let rendered = operator_alert(&submission(), &ctx());

        assert_eq!(
            rendered.subject,
            "New Contact Form Submission: Tom & Jerry"
        );
        assert!(rendered.text.contains("IP Address: 203.0.113.9"));
        assert!(rendered.text.contains("User Agent: Mozilla/5.0"));
        assert!(rendered.text.contains("May 1, 2026, 05:30:00 PM"));
        assert!(rendered.html.contains("Tom &amp; Jerry"));
        assert!(rendered.html.contains("a &lt; b and c &gt; d"));
        assert!(!rendered.html.contains("a < b"));
    }

    #[test]
    fn test_auto_reply() {
        let rendered = auto_reply(&submission(), &ctx());

        assert_eq!(rendered.subject, "Thank you for contacting me - Tom & Jerry");
        assert!(rendered.text.starts_with("Hi Dennis O'Brien,"));
        assert!(rendered.text.contains("Prince Kumar"));
        assert!(rendered.text.contains("reach me at owner@example.com"));
        assert!(rendered.html.contains("Dennis O&#39;Brien"));
        assert!(rendered.html.contains("http://localhost:5173"));
    }

    #[test]
    fn test_auto_reply_without_owner_address() {
        let context = TemplateContext::from_config(&EmailConfig::default());
        let rendered = auto_reply(&submission(), &context);
        assert!(!rendered.text.contains("reach me at"));
    }

    #[test]
    fn test_test_message() {
        let rendered = test_message(Utc::now(), &ctx());
        assert_eq!(rendered.subject, "Portfolio Email Service Test");
        assert!(rendered.text.contains("working properly"));
        assert!(rendered.html.contains("Email Service Test"));
    }
}
