//! chatsync post - submit a message

use std::io::Read;

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, status_label};
use crate::core::message::NewMessage;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct PostArgs {
    /// Sender identity
    #[arg(long, short, env = "CHATSYNC_SENDER")]
    pub sender: String,

    /// Message text; read from stdin when omitted
    pub content: Option<String>,
}

pub fn run(ctx: &AppContext, args: &PostArgs) -> Result<()> {
    let content = match &args.content {
        Some(content) => content.clone(),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let input = NewMessage::new(content, args.sender.as_str())?;
    let message = ctx.coordinator.submit_new(&input)?;

    if ctx.robot_mode {
        return emit_json(&message);
    }

    let mut layout = HumanLayout::new();
    layout
        .title(&format!("Message {}", message.id))
        .kv("Sender", &message.sender)
        .kv("Status", &status_label(message.sync_status))
        .kv("Commit", message.commit_ref.as_deref().unwrap_or("-"));
    emit_human(layout);
    Ok(())
}
