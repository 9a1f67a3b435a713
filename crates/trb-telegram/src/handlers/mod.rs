//! Telegram message → core update conversion.
//!
//! The endpoint only converts and hands off: the core dispatcher spawns a task
//! per update, so the polling loop is never blocked by a handler.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{Message, MessageEntityKind, User},
};

use trb_core::domain::{ChatId, PayloadKind, Sender, Update as Inbound, UserId};

use crate::router::AppState;

pub async fn handle_message(upd: Update, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(inbound) = to_inbound(upd.id.0, &msg) else {
        return Ok(());
    };
    state.dispatcher.spawn(inbound);
    Ok(())
}

fn to_inbound(update_id: u32, msg: &Message) -> Option<Inbound> {
    let leading_command = msg
        .entities()
        .and_then(|e| e.first())
        .map(|e| e.offset == 0 && matches!(e.kind, MessageEntityKind::BotCommand))
        .unwrap_or(false);

    build_inbound(
        update_id,
        msg.from.as_ref().map(sender_of),
        Some(ChatId(msg.chat.id.0)),
        msg.via_bot.is_some(),
        msg.text(),
        msg.caption(),
        leading_command,
    )
}

fn sender_of(user: &User) -> Sender {
    Sender {
        user_id: UserId(user.id.0 as i64),
        username: user.username.clone(),
        language_code: user.language_code.clone(),
    }
}

/// Only text and captioned messages become updates; everything else is
/// dropped before reaching the core.
fn build_inbound(
    update_id: u32,
    sender: Option<Sender>,
    chat: Option<ChatId>,
    via_bot: bool,
    text: Option<&str>,
    caption: Option<&str>,
    leading_command: bool,
) -> Option<Inbound> {
    let (kind, body) = match (text, caption) {
        (Some(t), _) if leading_command => (PayloadKind::Command, t),
        (Some(t), _) => (PayloadKind::Text, t),
        (None, Some(c)) => (PayloadKind::Caption, c),
        (None, None) => return None,
    };

    Some(Inbound {
        update_id,
        sender,
        chat,
        via_bot,
        kind,
        text: body.to_string(),
    })
}
