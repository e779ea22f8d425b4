//! Conversation export as Markdown, JSON or standalone HTML

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::conversations::Conversation;
use crate::state::ChatRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Markdown,
    Json,
    Html,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
            ExportFormat::Html => "html",
        }
    }

    pub fn render(&self, conversation: &Conversation) -> String {
        let now = Utc::now();
        match self {
            ExportFormat::Markdown => to_markdown(conversation, now),
            ExportFormat::Json => to_json(conversation, now),
            ExportFormat::Html => to_html(conversation, now),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Markdown => "markdown",
            ExportFormat::Json => "json",
            ExportFormat::Html => "html",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            "html" => Ok(ExportFormat::Html),
            other => Err(format!("unknown export format '{}'", other)),
        }
    }
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn to_markdown(conversation: &Conversation, exported_at: DateTime<Utc>) -> String {
    let mut md = format!("# {}\n\n", conversation.title);
    md.push_str(&format!("*Exported: {}*\n\n", format_time(&exported_at)));
    md.push_str("---\n\n");

    for msg in &conversation.messages {
        md.push_str(&format!("### {}\n", msg.role.display_name()));
        md.push_str(&format!("*{}*\n\n", format_time(&msg.timestamp)));
        if let Some(file_name) = &msg.file_name {
            md.push_str(&format!("> Attached: {}\n\n", file_name));
        }
        md.push_str(&format!("{}\n\n", msg.content));
        md.push_str("---\n\n");
    }

    md
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonExport<'a> {
    title: &'a str,
    exported_at: DateTime<Utc>,
    message_count: usize,
    messages: Vec<JsonMessage<'a>>,
}

#[derive(Serialize)]
struct JsonMessage<'a> {
    role: ChatRole,
    content: &'a str,
    timestamp: DateTime<Utc>,
}

pub fn to_json(conversation: &Conversation, exported_at: DateTime<Utc>) -> String {
    let export = JsonExport {
        title: &conversation.title,
        exported_at,
        message_count: conversation.messages.len(),
        messages: conversation
            .messages
            .iter()
            .map(|m| JsonMessage {
                role: m.role,
                content: &m.content,
                timestamp: m.timestamp,
            })
            .collect(),
    };

    // Plain strings, timestamps and enums cannot fail to serialize
    serde_json::to_string_pretty(&export).unwrap_or_default()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

pub fn to_html(conversation: &Conversation, exported_at: DateTime<Utc>) -> String {
    let title = escape_html(&conversation.title);
    let mut body = String::new();

    for msg in &conversation.messages {
        body.push_str(&format!(
            "    <div class=\"message {}\">\n      <div class=\"role\">{}</div>\n      <div class=\"time\">{}</div>\n      <div class=\"content\">{}</div>\n    </div>\n",
            msg.role.as_str(),
            msg.role.display_name(),
            format_time(&msg.timestamp),
            escape_html(&msg.content),
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
  <style>
    body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 0 auto; padding: 2rem; }}
    .meta {{ color: #64748b; font-size: 0.875rem; margin-bottom: 2rem; }}
    .message {{ border-radius: 1rem; padding: 1.5rem; margin-bottom: 1rem; background: #f8fafc; }}
    .message.user {{ border-left: 3px solid #38bdf8; }}
    .message.assistant {{ border-left: 3px solid #818cf8; }}
    .role {{ font-weight: 600; }}
    .time {{ color: #64748b; font-size: 0.75rem; }}
    .content {{ margin-top: 1rem; line-height: 1.6; white-space: pre-wrap; }}
  </style>
</head>
<body>
  <h1>{title}</h1>
  <p class="meta">Exported: {exported} | Messages: {count}</p>
{body}</body>
</html>
"#,
        title = title,
        exported = format_time(&exported_at),
        count = conversation.messages.len(),
        body = body,
    )
}
