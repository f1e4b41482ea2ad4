// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Team lifecycle notifications. Each handler delivers to either the team
//! text channel or a member's direct messages.

use super::{mention, null_as_default, parse, snowflake, to_data};
use crate::{chat::ChatClient, errors::HandlerError, messages::Payload, registry::Handler};
use async_trait::async_trait;
use opentelemetry::Context;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InviteStage {
    Sent,
    Accepted,
    Rejected,
}

#[derive(Debug, Deserialize)]
struct TeamInvitePayload {
    #[serde(default, deserialize_with = "snowflake")]
    inviter_discord_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    inviter_username: String,
    #[serde(default, deserialize_with = "snowflake")]
    invitee_discord_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    invitee_username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    team_name: String,
    #[serde(default, deserialize_with = "snowflake")]
    discord_text_channel_id: String,
}

/// `team.invite.*`
pub struct TeamInviteHandler {
    stage: InviteStage,
}

impl TeamInviteHandler {
    /// Direct message to the invitee.
    pub fn sent() -> TeamInviteHandler {
        TeamInviteHandler {
            stage: InviteStage::Sent,
        }
    }

    /// Welcome post in the team channel.
    pub fn accepted() -> TeamInviteHandler {
        TeamInviteHandler {
            stage: InviteStage::Accepted,
        }
    }

    /// Direct message to the inviter.
    pub fn rejected() -> TeamInviteHandler {
        TeamInviteHandler {
            stage: InviteStage::Rejected,
        }
    }
}

#[async_trait]
impl Handler for TeamInviteHandler {
    async fn handle(
        &self,
        _ctx: &Context,
        chat: &dyn ChatClient,
        _guild_id: &str,
        payload: &Payload,
    ) -> Result<Option<Payload>, HandlerError> {
        let event: TeamInvitePayload = parse(payload)?;

        let sent = match self.stage {
            InviteStage::Sent => {
                if event.invitee_discord_id.is_empty() || event.team_name.is_empty() {
                    warn!("team invite without invitee or team name, skipping");
                    return Ok(None);
                }
                let content = format!(
                    "**[Team Invitation]**\n\n{}, **{}** invited you to join team **{}**.\nReview the invitation and decide whether to join.",
                    mention(&event.invitee_discord_id),
                    event.inviter_username,
                    event.team_name
                );
                chat.send_direct_message(&event.invitee_discord_id, &content)
                    .await?
            }
            InviteStage::Accepted => {
                if event.discord_text_channel_id.is_empty() || event.invitee_discord_id.is_empty() {
                    warn!("accepted team invite without channel or invitee, skipping");
                    return Ok(None);
                }
                let content = format!(
                    "**[Invitation Accepted]**\n\n{} accepted the invitation to team **{}**.\nWelcome to the team!",
                    mention(&event.invitee_discord_id),
                    event.team_name
                );
                chat.send_message(&event.discord_text_channel_id, &content)
                    .await?
            }
            InviteStage::Rejected => {
                if event.inviter_discord_id.is_empty() {
                    warn!("rejected team invite without inviter, skipping");
                    return Ok(None);
                }
                let content = format!(
                    "**[Invitation Declined]**\n\n{}, **{}** declined the invitation to team **{}**.",
                    mention(&event.inviter_discord_id),
                    event.invitee_username,
                    event.team_name
                );
                chat.send_direct_message(&event.inviter_discord_id, &content)
                    .await?
            }
        };

        to_data(&sent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberChange {
    Joined,
    Left,
    Kicked,
}

#[derive(Debug, Deserialize)]
struct TeamMemberPayload {
    #[serde(default, deserialize_with = "snowflake")]
    discord_text_channel_id: String,
    #[serde(default, deserialize_with = "snowflake")]
    discord_user_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    current_member_count: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    max_members: i64,
}

/// `team.member.*`
pub struct TeamMemberHandler {
    change: MemberChange,
}

impl TeamMemberHandler {
    pub fn joined() -> TeamMemberHandler {
        TeamMemberHandler {
            change: MemberChange::Joined,
        }
    }

    pub fn left() -> TeamMemberHandler {
        TeamMemberHandler {
            change: MemberChange::Left,
        }
    }

    /// The kicked member is told privately.
    pub fn kicked() -> TeamMemberHandler {
        TeamMemberHandler {
            change: MemberChange::Kicked,
        }
    }
}

#[async_trait]
impl Handler for TeamMemberHandler {
    async fn handle(
        &self,
        _ctx: &Context,
        chat: &dyn ChatClient,
        _guild_id: &str,
        payload: &Payload,
    ) -> Result<Option<Payload>, HandlerError> {
        let event: TeamMemberPayload = parse(payload)?;

        let sent = match self.change {
            MemberChange::Joined => {
                if event.discord_text_channel_id.is_empty() || event.discord_user_id.is_empty() {
                    warn!("member joined without channel or user, skipping");
                    return Ok(None);
                }
                let content = format!(
                    "**[Member Joined]**\n\n{} joined the team!\nMembers: {}/{}",
                    mention(&event.discord_user_id),
                    event.current_member_count,
                    event.max_members
                );
                chat.send_message(&event.discord_text_channel_id, &content)
                    .await?
            }
            MemberChange::Left => {
                if event.discord_text_channel_id.is_empty() {
                    warn!("member left without channel, skipping");
                    return Ok(None);
                }
                let content = format!(
                    "**[Member Left]**\n\n**{}** left the team.\nMembers: {}/{}",
                    event.username, event.current_member_count, event.max_members
                );
                chat.send_message(&event.discord_text_channel_id, &content)
                    .await?
            }
            MemberChange::Kicked => {
                if event.discord_user_id.is_empty() {
                    warn!("member kicked without user, skipping");
                    return Ok(None);
                }
                let content = format!(
                    "**[Removed From Team]**\n\n{}, you were removed from the team.\nContact the team leader for details.",
                    mention(&event.discord_user_id)
                );
                chat.send_direct_message(&event.discord_user_id, &content)
                    .await?
            }
        };

        to_data(&sent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TeamStatus {
    LeadershipTransferred,
    Finalized,
    Deleted,
}

#[derive(Debug, Deserialize)]
struct TeamStatusPayload {
    #[serde(default, deserialize_with = "snowflake")]
    discord_text_channel_id: String,
    #[serde(default, deserialize_with = "snowflake")]
    leader_discord_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    member_count: i64,
}

/// `team.leadership.transferred`, `team.finalized` and `team.deleted`
pub struct TeamStatusHandler {
    status: TeamStatus,
}

impl TeamStatusHandler {
    pub fn leadership_transferred() -> TeamStatusHandler {
        TeamStatusHandler {
            status: TeamStatus::LeadershipTransferred,
        }
    }

    pub fn finalized() -> TeamStatusHandler {
        TeamStatusHandler {
            status: TeamStatus::Finalized,
        }
    }

    pub fn deleted() -> TeamStatusHandler {
        TeamStatusHandler {
            status: TeamStatus::Deleted,
        }
    }
}

#[async_trait]
impl Handler for TeamStatusHandler {
    async fn handle(
        &self,
        _ctx: &Context,
        chat: &dyn ChatClient,
        _guild_id: &str,
        payload: &Payload,
    ) -> Result<Option<Payload>, HandlerError> {
        let event: TeamStatusPayload = parse(payload)?;

        if event.discord_text_channel_id.is_empty() {
            warn!(status = ?self.status, "team status without channel, skipping");
            return Ok(None);
        }
        if self.status != TeamStatus::Deleted && event.leader_discord_id.is_empty() {
            warn!(status = ?self.status, "team status without leader, skipping");
            return Ok(None);
        }

        let content = match self.status {
            TeamStatus::LeadershipTransferred => format!(
                "**[New Team Leader]**\n\n{} is now the team leader.",
                mention(&event.leader_discord_id)
            ),
            TeamStatus::Finalized => format!(
                "**[Team Finalized]**\n\nThe team roster is final!\nLeader: {}\nMembers: {}\n\nGet ready for the contest!",
                mention(&event.leader_discord_id),
                event.member_count
            ),
            TeamStatus::Deleted => {
                "**[Team Disbanded]**\n\nThe team has been disbanded.\nThanks for playing.".to_owned()
            }
        };

        let sent = chat
            .send_message(&event.discord_text_channel_id, &content)
            .await?;
        to_data(&sent)
    }
}
