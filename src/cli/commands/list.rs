//! chatsync list - recent messages, newest first

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, status_label};
use crate::core::message::{Message, format_timestamp};
use crate::error::Result;

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Maximum number of messages (default 50)
    #[arg(long, short = 'n')]
    pub limit: Option<i64>,

    /// Only messages with an id below this one
    #[arg(long, value_name = "ID")]
    pub before: Option<i64>,
}

pub fn run(ctx: &AppContext, args: &ListArgs) -> Result<()> {
    let messages = ctx.queries.recent(args.limit, args.before)?;

    if ctx.robot_mode {
        return emit_json(&messages);
    }

    let mut layout = HumanLayout::new();
    if messages.is_empty() {
        layout.push_line("No messages.");
    }
    for message in &messages {
        layout.push_line(message_line(message));
    }
    if let Some(last) = messages.last() {
        if args.limit.is_some_and(|limit| messages.len() as i64 >= limit) {
            layout
                .blank()
                .push_line(format!("More: chatsync list --before {}", last.id));
        }
    }
    emit_human(layout);
    Ok(())
}

fn message_line(message: &Message) -> String {
    format!(
        "#{:<5} {} {:<12} [{}] {}",
        message.id,
        format_timestamp(&message.created_at),
        message.sender,
        status_label(message.sync_status),
        message.content.lines().next().unwrap_or_default()
    )
}
