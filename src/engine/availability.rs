use crate::model::*;

// ── Availability ──────────────────────────────────────────────────

/// Venue-wide availability for a window.
///
/// Every booking on any court of the venue whose span overlaps the window
/// counts as one booked court. The available count is clamped at zero so
/// stray data (bookings on courts beyond `max_courts`) never produces a
/// negative figure.
pub fn venue_availability(venue: &VenueState, window: &Span) -> AvailabilityInfo {
    let booked = venue.overlapping_bookings(window).count();
    let booked_courts = u32::try_from(booked).unwrap_or(u32::MAX);
    AvailabilityInfo {
        venue_id: venue.id,
        venue_name: venue.name.clone(),
        max_courts: venue.max_courts,
        booked_courts,
        available_courts: venue.max_courts.saturating_sub(booked_courts),
        window: *window,
    }
}

/// Free sub-spans of `window` on a single court.
pub fn court_free_spans(court: Option<&CourtSchedule>, window: &Span) -> Vec<Span> {
    let Some(court) = court else {
        return vec![*window];
    };
    // Bookings are sorted by start, so the clamped spans are too.
    let busy: Vec<Span> = court
        .overlapping(window)
        .map(|b| b.span.clamp_to(window))
        .collect();
    let busy = merge_overlapping(&busy);
    subtract_intervals(&[*window], &busy)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// Remove sorted, disjoint `to_remove` spans from sorted, disjoint `base`.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut cursor = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= cursor {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = &to_remove[j];
            if r.start > cursor {
                result.push(Span::new(cursor, r.start));
            }
            cursor = cursor.max(r.end);
            j += 1;
        }

        if cursor < b.end {
            result.push(Span::new(cursor, b.end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const H: Ms = HOUR_MS;

    fn venue(max_courts: u32, bookings: &[(&str, Ms, Ms)]) -> VenueState {
        let mut v = VenueState::new(Ulid::new(), "Arena A".into(), max_courts, 0);
        for &(court, start, end) in bookings {
            v.insert_booking(Booking {
                id: Ulid::new(),
                venue_id: v.id,
                court_number: court.into(),
                span: Span::new(start, end),
                booked_by: "tester".into(),
                booking_date: 0,
            });
        }
        v
    }

    // ── venue_availability ────────────────────────────────

    #[test]
    fn availability_counts_across_courts() {
        let v = venue(2, &[("Court 1", 10 * H, 11 * H), ("Court 2", 10 * H, 11 * H)]);
        let info = venue_availability(&v, &Span::new(10 * H, 11 * H));
        assert_eq!(info.booked_courts, 2);
        assert_eq!(info.available_courts, 0);
        assert_eq!(info.max_courts, 2);
        assert_eq!(info.venue_name, "Arena A");
    }

    #[test]
    fn availability_ignores_touching_bookings() {
        let v = venue(3, &[("Court 1", 9 * H, 10 * H), ("Court 2", 11 * H, 12 * H)]);
        let info = venue_availability(&v, &Span::new(10 * H, 11 * H));
        assert_eq!(info.booked_courts, 0);
        assert_eq!(info.available_courts, 3);
    }

    #[test]
    fn availability_never_negative() {
        let v = venue(
            1,
            &[
                ("Court 1", 10 * H, 11 * H),
                ("Court 2", 10 * H, 11 * H),
                ("Court 3", 10 * H, 11 * H),
            ],
        );
        let info = venue_availability(&v, &Span::new(10 * H, 11 * H));
        assert_eq!(info.booked_courts, 3);
        assert_eq!(info.available_courts, 0);
    }

    #[test]
    fn availability_counts_every_overlapping_booking() {
        // Two short bookings on the same court both overlap a long window.
        let v = venue(4, &[("Court 1", 9 * H, 10 * H), ("Court 1", 14 * H, 15 * H)]);
        let info = venue_availability(&v, &Span::new(8 * H, 17 * H));
        assert_eq!(info.booked_courts, 2);
        assert_eq!(info.available_courts, 2);
    }

    // ── court_free_spans ──────────────────────────────────

    #[test]
    fn free_spans_without_bookings() {
        let window = Span::new(9 * H, 17 * H);
        assert_eq!(court_free_spans(None, &window), vec![window]);
    }

    #[test]
    fn free_spans_punched_by_bookings() {
        let v = venue(1, &[("Court 1", 8 * H, 10 * H), ("Court 1", 12 * H, 13 * H)]);
        let free = court_free_spans(v.courts.get("Court 1"), &Span::new(9 * H, 17 * H));
        assert_eq!(free, vec![Span::new(10 * H, 12 * H), Span::new(13 * H, 17 * H)]);
    }

    #[test]
    fn free_spans_fully_booked() {
        let v = venue(1, &[("Court 1", 9 * H, 12 * H), ("Court 1", 12 * H, 17 * H)]);
        let free = court_free_spans(v.courts.get("Court 1"), &Span::new(9 * H, 17 * H));
        assert!(free.is_empty());
    }

    // ── subtract_intervals ────────────────────────────────

    #[test]
    fn subtract_no_overlap() {
        let base = vec![Span::new(100, 200), Span::new(300, 400)];
        let remove = vec![Span::new(200, 300)];
        assert_eq!(subtract_intervals(&base, &remove), base);
    }

    #[test]
    fn subtract_full_overlap() {
        let base = vec![Span::new(100, 200)];
        let remove = vec![Span::new(50, 250)];
        assert!(subtract_intervals(&base, &remove).is_empty());
    }

    #[test]
    fn subtract_multiple_punches() {
        let base = vec![Span::new(0, 1000)];
        let remove = vec![Span::new(100, 200), Span::new(400, 500), Span::new(800, 900)];
        assert_eq!(
            subtract_intervals(&base, &remove),
            vec![
                Span::new(0, 100),
                Span::new(200, 400),
                Span::new(500, 800),
                Span::new(900, 1000),
            ]
        );
    }

    // ── merge_overlapping ────────────────────────────────

    #[test]
    fn merge_overlapping_basic() {
        let spans = vec![Span::new(100, 300), Span::new(200, 400), Span::new(500, 600)];
        assert_eq!(
            merge_overlapping(&spans),
            vec![Span::new(100, 400), Span::new(500, 600)]
        );
    }

    #[test]
    fn merge_overlapping_adjacent() {
        let spans = vec![Span::new(100, 200), Span::new(200, 300)];
        assert_eq!(merge_overlapping(&spans), vec![Span::new(100, 300)]);
    }
}
