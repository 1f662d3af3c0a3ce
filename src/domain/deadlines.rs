use crate::domain::models::AssignmentEvent;
use chrono::{DateTime, Duration, Utc};

/// `now + span`, clamped to the latest representable instant when the sum (or
/// the span itself) overflows.
pub fn saturating_add(now: DateTime<Utc>, span: Option<Duration>) -> DateTime<Utc> {
    span.and_then(|span| now.checked_add_signed(span))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Events due in `(now, now + lead_hours]`, in input order.
pub fn find_due_events(
    events: &[AssignmentEvent],
    now: DateTime<Utc>,
    lead_hours: u32,
) -> Vec<AssignmentEvent> {
    let limit = saturating_add(now, Duration::try_hours(i64::from(lead_hours)));
    events
        .iter()
        .filter(|event| is_due_within(event, now, limit))
        .cloned()
        .collect()
}

fn is_due_within(event: &AssignmentEvent, now: DateTime<Utc>, limit: DateTime<Utc>) -> bool {
    let due_at = event.due_at();
    now < due_at && due_at <= limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::MoodleCourse;
    use proptest::prelude::*;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-16T00:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn event_due_at(id: i64, due_at: Option<DateTime<Utc>>) -> AssignmentEvent {
        AssignmentEvent {
            id: Some(id),
            name: format!("assignment-{id}"),
            viewurl: format!("https://moodle.example.test/mod/assign/view.php?id={id}"),
            course: Some(MoodleCourse {
                fullname: "CS101".to_string(),
            }),
            timesort: due_at.map(|value| value.timestamp()),
        }
    }

    #[test]
    fn thirteen_hours_out_is_not_due_with_twelve_hour_lead() {
        let now = fixed_time();
        let events = vec![
            event_due_at(1, Some(now + Duration::hours(13))),
            event_due_at(2, Some(now + Duration::hours(11))),
        ];

        let due = find_due_events(&events, now, 12);

        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, Some(2));
    }

    #[test]
    fn window_is_open_at_now_and_closed_at_limit() {
        let now = fixed_time();
        let events = vec![
            event_due_at(1, Some(now)),
            event_due_at(2, Some(now + Duration::hours(12))),
            event_due_at(3, Some(now - Duration::hours(1))),
        ];

        let due = find_due_events(&events, now, 12);

        assert_eq!(due.iter().map(|event| event.id).collect::<Vec<_>>(), vec![Some(2)]);
    }

    #[test]
    fn missing_due_time_is_never_due() {
        let due = find_due_events(&[event_due_at(1, None)], fixed_time(), 24 * 365 * 100);
        assert!(due.is_empty());
    }

    #[test]
    fn huge_lead_counts_every_future_event_as_due() {
        let now = fixed_time();
        let events = vec![
            event_due_at(1, Some(now - Duration::hours(1))),
            event_due_at(2, Some(now + Duration::days(365 * 50))),
        ];

        assert!(find_due_events(&[], now, u32::MAX).is_empty());
        let due = find_due_events(&events, now, u32::MAX);
        assert_eq!(due.iter().map(|event| event.id).collect::<Vec<_>>(), vec![Some(2)]);
    }

    #[test]
    fn saturating_add_clamps_on_overflow() {
        let now = fixed_time();
        assert_eq!(saturating_add(now, Duration::try_hours(2)), now + Duration::hours(2));
        assert_eq!(saturating_add(now, Duration::try_days(i64::MAX)), DateTime::<Utc>::MAX_UTC);
        assert_eq!(
            saturating_add(DateTime::<Utc>::MAX_UTC, Duration::try_hours(1)),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(find_due_events(&[], fixed_time(), 12).is_empty());
    }

    fn arb_events() -> impl Strategy<Value = Vec<(i64, i64)>> {
        prop::collection::vec((0i64..10_000i64, -200_000i64..200_000i64), 0..32)
    }

    // Property: the result is exactly the (now, now + lead] subset, in input order
    proptest! {
        #[test]
        fn property_due_events_match_window_subset(
            raw in arb_events(),
            lead_hours in 1u32..72u32
        ) {
            let now = fixed_time();
            let events: Vec<AssignmentEvent> = raw
                .iter()
                .map(|(id, offset)| event_due_at(*id, Some(now + Duration::seconds(*offset))))
                .collect();

            let due = find_due_events(&events, now, lead_hours);

            let limit = now + Duration::hours(i64::from(lead_hours));
            let expected: Vec<AssignmentEvent> = events
                .iter()
                .filter(|event| event.due_at() > now && event.due_at() <= limit)
                .cloned()
                .collect();
            prop_assert_eq!(due, expected);
        }
    }

    // Property: reordering events outside the window does not change the result
    proptest! {
        #[test]
        fn property_outside_events_do_not_affect_result(
            inside_offsets in prop::collection::vec(1i64..(12 * 3600), 0..8),
            outside_offsets in prop::collection::vec(prop_oneof![-100_000i64..=0i64, (12 * 3600 + 1)..200_000i64], 0..8)
        ) {
            let now = fixed_time();
            let inside: Vec<AssignmentEvent> = inside_offsets
                .iter()
                .enumerate()
                .map(|(index, offset)| event_due_at(index as i64, Some(now + Duration::seconds(*offset))))
                .collect();
            let outside: Vec<AssignmentEvent> = outside_offsets
                .iter()
                .enumerate()
                .map(|(index, offset)| event_due_at(1_000 + index as i64, Some(now + Duration::seconds(*offset))))
                .collect();

            let mut forward = outside.clone();
            forward.extend(inside.iter().cloned());
            let mut reversed: Vec<AssignmentEvent> = outside.into_iter().rev().collect();
            reversed.extend(inside.iter().cloned());

            prop_assert_eq!(find_due_events(&forward, now, 12), inside.clone());
            prop_assert_eq!(find_due_events(&reversed, now, 12), inside);
        }
    }
}
