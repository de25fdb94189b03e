//! Well-being score, 1 to 10.

use super::{cancel_button, cancel_draft, next_state};
use crate::dialogue::command::{indexed_payload, Input, Keyword};
use crate::dialogue::traits::{DialogueResult, Outcome, State, StateId, Turn};
use crate::reports::{Score, ScoreError};
use crate::transport::{Button, Keyboard, SendOptions};
use async_trait::async_trait;

pub struct EnteringScoreState;

fn score_keyboard() -> SendOptions {
    let row = |range: std::ops::RangeInclusive<u8>| {
        range
            .map(|n| Button::callback(n.to_string(), format!("score:{n}")))
            .collect::<Vec<_>>()
    };
    SendOptions::keyboard(
        Keyboard::new()
            .row(row(1..=5))
            .row(row(6..=10))
            .row(vec![cancel_button()]),
    )
}

impl EnteringScoreState {
    async fn prompt(turn: &Turn<'_>) -> DialogueResult<()> {
        let text = match turn.draft()?.score {
            Some(current) => format!(
                "Your current well-being score is {current}. Send a new one from 1 to 10."
            ),
            None => "How was your week? Rate your well-being from 1 to 10.".to_string(),
        };
        turn.reply_with(&text, score_keyboard()).await
    }

    async fn apply(turn: &mut Turn<'_>, raw: &str) -> DialogueResult<Outcome> {
        let score = match Score::parse(raw) {
            Ok(score) => score,
            Err(ScoreError::NotANumber(_)) => {
                turn.reply("Please send a whole number from 1 to 10.").await?;
                return Ok(Outcome::Stay);
            }
            Err(ScoreError::OutOfRange(value)) => {
                turn.reply(&format!(
                    "{value} is out of range. The score must be between {} and {}.",
                    Score::MIN,
                    Score::MAX
                ))
                .await?;
                return Ok(Outcome::Stay);
            }
        };

        turn.draft_mut()?.score = Some(score);
        turn.save().await;
        tracing::debug!(user_id = %turn.user_id(), score = score.value(), "score set");

        turn.reply(&format!("Well-being: {score}")).await?;
        Ok(Outcome::Transition(next_state(turn)?))
    }
}

#[async_trait]
impl State for EnteringScoreState {
    fn id(&self) -> StateId {
        StateId::EnteringScore
    }

    async fn enter(&self, turn: &mut Turn<'_>) -> DialogueResult<()> {
        Self::prompt(turn).await
    }

    async fn handle_message(&self, turn: &mut Turn<'_>, input: &Input) -> DialogueResult<Outcome> {
        if input.keyword == Some(Keyword::Cancel) {
            return cancel_draft(turn).await;
        }
        if let Some(command) = &input.command {
            if !command.is("score") {
                return Ok(Outcome::NotHandled);
            }
            if command.has_args() {
                return Self::apply(turn, &command.args).await;
            }
            if !turn.just_entered() {
                Self::prompt(turn).await?;
            }
            return Ok(Outcome::Stay);
        }
        Self::apply(turn, &input.text).await
    }

    async fn handle_callback_query(
        &self,
        turn: &mut Turn<'_>,
        payload: &str,
    ) -> DialogueResult<Outcome> {
        if Keyword::from_payload(payload) == Some(Keyword::Cancel) {
            return cancel_draft(turn).await;
        }
        match indexed_payload(payload, "score") {
            Some(value) => Self::apply(turn, &value.to_string()).await,
            None => Ok(Outcome::NotHandled),
        }
    }

    fn can_handle_command(&self, name: &str) -> bool {
        name == "score"
    }
}
