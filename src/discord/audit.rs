//! Przypisanie zdarzenia gateway do sprawcy przez audit log.
//!
//! Audit log Discorda jest eventually-consistent: przy dwóch szybkich akcjach
//! różnych osób najnowszy wpis może należeć do kogoś innego. Ograniczamy to
//! oknem świeżości i dopasowaniem `target_id`, ale nie da się tego wyeliminować.

use serenity::all::{GuildId, Http};
use serenity::model::guild::audit_log::{
    Action, AuditLogEntry, Change, ChannelAction, InviteAction, MemberAction, MessageAction,
    RoleAction, WebhookAction,
};

use crate::antinuke::ActionKind;
use crate::error::AntinukeError;

/// Audit entries older than this are not trusted for attribution.
pub const FRESHNESS_SECS: i64 = 15;
const LOOKUP_LIMIT: u8 = 5;

/// Audit-log action types that record an action of this kind, most specific first.
pub fn audit_actions(kind: ActionKind) -> &'static [Action] {
    match kind {
        ActionKind::ChannelDelete => &[Action::Channel(ChannelAction::Delete)],
        ActionKind::ChannelCreate => &[Action::Channel(ChannelAction::Create)],
        ActionKind::RoleDelete => &[Action::Role(RoleAction::Delete)],
        ActionKind::RoleCreate => &[Action::Role(RoleAction::Create)],
        ActionKind::Ban => &[Action::Member(MemberAction::BanAdd)],
        ActionKind::Kick => &[Action::Member(MemberAction::Kick)],
        ActionKind::MemberUpdate => &[
            Action::Member(MemberAction::RoleUpdate),
            Action::Member(MemberAction::Update),
        ],
        ActionKind::MessageDelete => &[Action::Message(MessageAction::Delete)],
        ActionKind::WebhookCreate => &[Action::Webhook(WebhookAction::Create)],
        ActionKind::InviteCreate => &[Action::Invite(InviteAction::Create)],
        ActionKind::StickyNoteDelete => &[],
    }
}

/// Channel an entry happened in: `options.channel_id` for message deletes,
/// the `channel_id` change for webhooks.
fn entry_channel(entry: &AuditLogEntry) -> Option<u64> {
    entry
        .options
        .as_ref()
        .and_then(|o| o.channel_id)
        .or_else(|| {
            entry.changes.as_ref()?.iter().find_map(|c| match c {
                Change::ChannelId { new, .. } => *new,
                _ => None,
            })
        })
        .map(|id| id.get())
}

/// Pick the responsible user among `entries`: fresh relative to `now_unix`,
/// matching `target` and `channel` when the event carried them. An entry
/// without a channel never matches a channel-scoped event.
pub fn pick_actor(
    entries: &[AuditLogEntry],
    target: Option<u64>,
    channel: Option<u64>,
    now_unix: i64,
) -> Option<u64> {
    entries
        .iter()
        .filter(|e| now_unix - e.id.created_at().unix_timestamp() <= FRESHNESS_SECS)
        .filter(|e| target.is_none_or(|t| e.target_id.map(|id| id.get()) == Some(t)))
        .find(|e| channel.is_none_or(|c| entry_channel(e) == Some(c)))
        .map(|e| e.user_id.get())
}

/// `Ok(None)` means no fresh matching entry (e.g. a member left on their own);
/// `Err` means the lookup itself failed.
pub async fn resolve_actor(
    http: &Http,
    guild_id: GuildId,
    kind: ActionKind,
    target: Option<u64>,
    channel: Option<u64>,
) -> Result<Option<u64>, AntinukeError> {
    let actions = audit_actions(kind);
    if actions.is_empty() {
        return Err(AntinukeError::resolution(kind, "no audit log action for kind"));
    }
    for action in actions {
        let logs = guild_id
            .audit_logs(http, Some(*action), None, None, Some(LOOKUP_LIMIT))
            .await
            .map_err(|e| AntinukeError::resolution(kind, format!("audit log lookup: {e}")))?;
        let now = chrono::Utc::now().timestamp();
        if let Some(actor) = pick_actor(&logs.entries, target, channel, now) {
            return Ok(Some(actor));
        }
    }
    Ok(None)
}
