use chrono::Utc;
use tracing::info;

use ticketdesk_models::{Rating, TicketId};

use super::outcome::RatingOutcome;
use super::Engine;
use crate::error::{EngineError, Result};

impl Engine {
    /// Records a 1 to 5 star rating. The first rating wins.
    ///
    /// When `user_id` is given it must match the requester.
    pub async fn set_rating(&self, id: &TicketId, user_id: Option<i64>, stars: u8) -> Result<RatingOutcome> {
        if !Rating::is_valid_stars(stars) {
            return Err(EngineError::validation(format!(
                "rating must be between {} and {}",
                Rating::MIN_STARS,
                Rating::MAX_STARS
            )));
        }

        let (ticket, rated) = self
            .update(id, |t| {
                if let Some(user_id) = user_id {
                    if t.requester.user_id != user_id {
                        return Err(EngineError::validation("ticket belongs to another user"));
                    }
                }
                if t.rating.is_some() {
                    return Ok(false);
                }
                t.rating = Some(Rating {
                    stars,
                    rated_at: Utc::now(),
                    comment: None,
                });
                t.touch();
                Ok(true)
            })
            .await?;

        if rated {
            info!(ticket_id = %id, stars, "Ticket rated");
            Ok(RatingOutcome::Rated(ticket))
        } else {
            Ok(RatingOutcome::AlreadyRated(ticket))
        }
    }
}
