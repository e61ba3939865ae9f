use chrono::NaiveDate;

use super::model::{Hazard, Position};

/// A candidate hazard report, before any write happens. The session user and
/// position are passed in explicitly so the checks stay independent of the
/// HTTP layer.
#[derive(Debug)]
pub struct HazardSubmission<'a> {
    pub user_id: Option<&'a str>,
    pub position: Option<Position>,
    pub category: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub has_image: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionRejection {
    AuthOrLocationRequired,
    IncompleteFields,
    ImageRequired,
    DailyLimitReached { limit: u32 },
    DuplicateLocation,
}

impl SubmissionRejection {
    pub fn code(&self) -> i32 {
        use crate::utils::error_codes;

        match self {
            Self::AuthOrLocationRequired => error_codes::AUTH_FAILED,
            Self::IncompleteFields | Self::ImageRequired => error_codes::VALIDATION_ERROR,
            Self::DailyLimitReached { .. } => error_codes::DAILY_LIMIT,
            Self::DuplicateLocation => error_codes::DUPLICATE_LOCATION,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::AuthOrLocationRequired => {
                "You need to log in or enable location services to report a hazard".to_string()
            }
            Self::IncompleteFields => {
                "All fields (category, title, description) must be filled out".to_string()
            }
            Self::ImageRequired => "Please upload an image before submitting".to_string(),
            Self::DailyLimitReached { limit } => format!(
                "Daily limit reached: you can only add {} hazard markers per day. Try again tomorrow",
                limit
            ),
            Self::DuplicateLocation => {
                "Duplicate location: you have already reported a hazard at this spot. Please choose a different location"
                    .to_string()
            }
        }
    }
}

/// Runs the pre-write checks in a fixed order: session and position first,
/// then required fields, then the attached image, then the per-day cap, and
/// finally the duplicate-location scan. The cheap checks run before the ones
/// that walk the user's existing markers.
///
/// The duplicate check compares coordinates exactly; GPS jitter makes this
/// under-inclusive, but loosening it is a product decision, not ours.
pub fn validate_submission(
    submission: &HazardSubmission<'_>,
    existing: &[Hazard],
    today: NaiveDate,
    daily_limit: u32,
) -> Result<(), SubmissionRejection> {
    let (user_id, position) = match (submission.user_id, submission.position) {
        (Some(user_id), Some(position)) => (user_id, position),
        _ => return Err(SubmissionRejection::AuthOrLocationRequired),
    };

    if [submission.category, submission.title, submission.description]
        .iter()
        .any(|field| field.trim().is_empty())
    {
        return Err(SubmissionRejection::IncompleteFields);
    }

    if !submission.has_image {
        return Err(SubmissionRejection::ImageRequired);
    }

    let submitted_today = existing
        .iter()
        .filter(|hazard| hazard.user_id == user_id && hazard.created_at.date_naive() == today)
        .count();

    if submitted_today >= daily_limit as usize {
        return Err(SubmissionRejection::DailyLimitReached { limit: daily_limit });
    }

    if existing
        .iter()
        .any(|hazard| hazard.user_id == user_id && hazard.position() == position)
    {
        return Err(SubmissionRejection::DuplicateLocation);
    }

    Ok(())
}

/// Only the user who reported a hazard may delete it.
pub fn authorize_delete(hazard: &Hazard, user_id: &str) -> bool {
    hazard.user_id == user_id
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::*;

    const USER: &str = "user@example.com";
    const TODAY_NOON: &str = "2025-03-14T12:00:00Z";

    fn noon() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(TODAY_NOON)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn today() -> NaiveDate {
        noon().date_naive()
    }

    fn hazard_at(user_id: &str, lat: f64, lng: f64, days_ago: i64) -> Hazard {
        let created_at = noon() - Duration::days(days_ago);
        Hazard {
            hazard_id: format!("{}-{}-{}", user_id, lat, lng),
            user_id: user_id.to_string(),
            category: "hazard".to_string(),
            title: "Pothole".to_string(),
            description: "Deep pothole in the right lane".to_string(),
            latitude: lat,
            longitude: lng,
            image_url: Some("http://localhost:3000/media/x.png".to_string()),
            created_at,
        }
    }

    fn submission<'a>(position: Option<Position>) -> HazardSubmission<'a> {
        HazardSubmission {
            user_id: Some(USER),
            position,
            category: "weather",
            title: "Ice",
            description: "Black ice near bridge",
            has_image: true,
        }
    }

    fn position(lat: f64, lng: f64) -> Position {
        Position { lat, lng }
    }

    #[test]
    fn accepts_a_complete_submission_against_an_empty_list() {
        let result = validate_submission(&submission(Some(position(43.65, -79.38))), &[], today(), 2);
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn rejects_without_a_session() {
        let mut sub = submission(Some(position(43.65, -79.38)));
        sub.user_id = None;
        assert_eq!(
            validate_submission(&sub, &[], today(), 2),
            Err(SubmissionRejection::AuthOrLocationRequired)
        );
    }

    #[test]
    fn rejects_without_a_position() {
        assert_eq!(
            validate_submission(&submission(None), &[], today(), 2),
            Err(SubmissionRejection::AuthOrLocationRequired)
        );
    }

    #[test]
    fn rejects_empty_fields() {
        let mut sub = submission(Some(position(43.65, -79.38)));
        sub.title = "   ";
        assert_eq!(
            validate_submission(&sub, &[], today(), 2),
            Err(SubmissionRejection::IncompleteFields)
        );
    }

    #[test]
    fn rejects_missing_image() {
        let mut sub = submission(Some(position(43.65, -79.38)));
        sub.has_image = false;
        assert_eq!(
            validate_submission(&sub, &[], today(), 2),
            Err(SubmissionRejection::ImageRequired)
        );
    }

    #[test]
    fn empty_fields_are_reported_before_the_daily_cap() {
        // Two markers today put the user at the cap, but the field check
        // must fire first.
        let existing = vec![
            hazard_at(USER, 1.0, 1.0, 0),
            hazard_at(USER, 2.0, 2.0, 0),
        ];
        let mut sub = submission(Some(position(43.65, -79.38)));
        sub.description = "";
        assert_eq!(
            validate_submission(&sub, &existing, today(), 2),
            Err(SubmissionRejection::IncompleteFields)
        );
    }

    #[test]
    fn daily_cap_is_reported_before_duplicate_location() {
        let existing = vec![
            hazard_at(USER, 43.65, -79.38, 0),
            hazard_at(USER, 2.0, 2.0, 0),
        ];
        // Same position as an existing marker AND at the cap.
        assert_eq!(
            validate_submission(
                &submission(Some(position(43.65, -79.38))),
                &existing,
                today(),
                2
            ),
            Err(SubmissionRejection::DailyLimitReached { limit: 2 })
        );
    }

    #[test]
    fn third_submission_today_is_rejected() {
        let existing = vec![
            hazard_at(USER, 1.0, 1.0, 0),
            hazard_at(USER, 2.0, 2.0, 0),
        ];
        assert_eq!(
            validate_submission(
                &submission(Some(position(43.65, -79.38))),
                &existing,
                today(),
                2
            ),
            Err(SubmissionRejection::DailyLimitReached { limit: 2 })
        );
    }

    #[test]
    fn second_submission_today_is_accepted() {
        let existing = vec![hazard_at(USER, 1.0, 1.0, 0)];
        assert_eq!(
            validate_submission(
                &submission(Some(position(43.65, -79.38))),
                &existing,
                today(),
                2
            ),
            Ok(())
        );
    }

    #[test]
    fn yesterdays_markers_do_not_count_toward_the_cap() {
        let existing = vec![
            hazard_at(USER, 1.0, 1.0, 1),
            hazard_at(USER, 2.0, 2.0, 1),
        ];
        assert_eq!(
            validate_submission(
                &submission(Some(position(43.65, -79.38))),
                &existing,
                today(),
                2
            ),
            Ok(())
        );
    }

    #[test]
    fn other_users_markers_do_not_count_toward_the_cap() {
        let existing = vec![
            hazard_at("other@example.com", 1.0, 1.0, 0),
            hazard_at("other@example.com", 2.0, 2.0, 0),
        ];
        assert_eq!(
            validate_submission(
                &submission(Some(position(43.65, -79.38))),
                &existing,
                today(),
                2
            ),
            Ok(())
        );
    }

    #[test]
    fn identical_coordinates_are_rejected_regardless_of_fields() {
        // The existing marker was placed yesterday with different text; the
        // location alone triggers the rejection.
        let existing = vec![hazard_at(USER, 43.65, -79.38, 1)];
        let mut sub = submission(Some(position(43.65, -79.38)));
        sub.category = "construction";
        sub.title = "Crane work";
        sub.description = "Sidewalk closed";
        assert_eq!(
            validate_submission(&sub, &existing, today(), 2),
            Err(SubmissionRejection::DuplicateLocation)
        );
    }

    #[test]
    fn nearby_but_different_coordinates_are_accepted() {
        let existing = vec![hazard_at(USER, 43.65, -79.38, 0)];
        assert_eq!(
            validate_submission(
                &submission(Some(position(43.650001, -79.38))),
                &existing,
                today(),
                2
            ),
            Ok(())
        );
    }

    #[test]
    fn same_coordinates_by_another_user_are_accepted() {
        let existing = vec![hazard_at("other@example.com", 43.65, -79.38, 0)];
        assert_eq!(
            validate_submission(
                &submission(Some(position(43.65, -79.38))),
                &existing,
                today(),
                2
            ),
            Ok(())
        );
    }

    #[test]
    fn only_the_owner_may_delete() {
        let hazard = hazard_at(USER, 43.65, -79.38, 0);
        assert!(authorize_delete(&hazard, USER));
        assert!(!authorize_delete(&hazard, "other@example.com"));
    }
}
