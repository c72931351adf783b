//! Message rendering.
//!
//! Both renderers are pure: the same roster and cancellation always produce
//! byte-identical text, which is what lets the sync engine skip unchanged
//! edits by plain string comparison.
//!
//! Truncation policy: the roster text must fit in [`MESSAGE_LIMIT`]
//! characters. When it does not, waitlist entries are dropped from the end
//! and replaced by a `+N more` line. If the text still does not fit with the
//! whole waitlist hidden, it is cut on a character boundary and ends in `…`.
//! Cancellation reasons are clipped to [`MAX_REASON_CHARS`] so the header
//! line carrying the role marker always survives the cut. The announcement
//! gets the same hard cut.

use std::fmt::Write;

use crate::{CancellationRecord, Roster};

/// Discord's per-message content limit, in characters.
pub const MESSAGE_LIMIT: usize = 2000;

/// Shown when an admin cancels without giving a reason.
pub const DEFAULT_REASON: &str = "No reason provided";

/// Longest cancellation reason shown in a message.
pub const MAX_REASON_CHARS: usize = 200;

const FOOTER: &str = "📍 KMCD Gym | 2-5 PM\n\
🚪 Enter through the double doors (north side)\n\
📝 Please arrive on time — late spots may be given to waitlisters.";

/// Marker that identifies a roster message when scanning channel history.
pub const ROSTER_MARKER: &str = "THM Volleyball Roster";

/// Marker that identifies an announcement message when scanning channel history.
pub const ANNOUNCEMENT_MARKER: &str = "Sunday volleyball";

fn active(cancellation: Option<&CancellationRecord>) -> Option<&CancellationRecord> {
    cancellation.filter(|c| c.cancelled)
}

/// Render the roster channel message.
pub fn render_roster(roster: &Roster, cancellation: Option<&CancellationRecord>) -> String {
    render_roster_within(roster, cancellation, MESSAGE_LIMIT)
}

/// Render the roster message, fitting it into `limit` characters.
pub fn render_roster_within(
    roster: &Roster,
    cancellation: Option<&CancellationRecord>,
    limit: usize,
) -> String {
    let full = compose_roster(roster, cancellation, roster.waitlist.len());
    if full.chars().count() <= limit {
        return full;
    }

    for shown in (0..roster.waitlist.len()).rev() {
        let text = compose_roster(roster, cancellation, shown);
        if text.chars().count() <= limit {
            return text;
        }
    }

    truncate_chars(&compose_roster(roster, cancellation, 0), limit)
}

fn compose_roster(
    roster: &Roster,
    cancellation: Option<&CancellationRecord>,
    waitlist_shown: usize,
) -> String {
    let mut out = String::new();

    if let Some(record) = active(cancellation) {
        let _ = writeln!(
            out,
            "🚫 Sunday volleyball is CANCELLED - {}",
            roster.date.format("%B %d, %Y")
        );
        let _ = writeln!(out, "Reason: {}", clip_reason(record.reason_or_default()));
        out.push('\n');
    }

    let _ = writeln!(
        out,
        "📋 **THM Volleyball Roster - Sunday, {}**",
        roster.date.format("%B %d")
    );
    out.push('\n');

    out.push_str("✅ Confirmed to Play:\n");
    if roster.confirmed.is_empty() {
        out.push_str("None\n");
    }
    for (i, signup) in roster.confirmed.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, signup.name);
    }

    out.push_str("\n⏳ Waitlist:\n");
    if roster.waitlist.is_empty() {
        out.push_str("None\n");
    }
    for (i, signup) in roster.waitlist.iter().take(waitlist_shown).enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, signup.name);
    }
    let hidden = roster.waitlist.len().saturating_sub(waitlist_shown);
    if hidden > 0 {
        let _ = writeln!(out, "+{hidden} more");
    }

    out.push('\n');
    out.push_str(FOOTER);
    out
}

/// Render the announcements channel message.
pub fn render_announcement(roster: &Roster, cancellation: Option<&CancellationRecord>) -> String {
    truncate_chars(&compose_announcement(roster, cancellation), MESSAGE_LIMIT)
}

fn compose_announcement(roster: &Roster, cancellation: Option<&CancellationRecord>) -> String {
    let date = roster.date.format("%B %d, %Y");

    match active(cancellation) {
        Some(record) => {
            let mut out = format!(
                "🛑 **Sunday volleyball has been CANCELLED - {date}**\n📝 Reason: {}",
                clip_reason(record.reason_or_default())
            );
            if let Some(by) = record.cancelled_by.as_deref() {
                let _ = write!(out, "\n👤 By: {by}");
            }
            out
        }
        None => format!(
            "✅ **Sunday volleyball is on - {date}!**\n👥 {}/{} confirmed, {} waitlisted",
            roster.confirmed.len(),
            roster.capacity,
            roster.waitlist.len()
        ),
    }
}

/// A reason cut to [`MAX_REASON_CHARS`].
pub fn clip_reason(reason: &str) -> String {
    truncate_chars(reason, MAX_REASON_CHARS)
}

/// Truncate to at most `max_chars` characters, marking the cut with `…`.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CAPACITY, SignUp};
    use chrono::{NaiveDate, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn sunday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 3).unwrap()
    }

    fn roster_of(names: &[&str]) -> Roster {
        let signups = names
            .iter()
            .map(|n| SignUp {
                name: n.to_string(),
                participation_date: sunday(),
            })
            .collect();
        Roster::partition(sunday(), signups, CAPACITY)
    }

    fn numbered(n: usize) -> Roster {
        let names: Vec<String> = (1..=n).map(|i| format!("Player {i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        roster_of(&refs)
    }

    fn cancelled(reason: Option<&str>) -> CancellationRecord {
        CancellationRecord {
            week_anchor: sunday(),
            cancelled: true,
            reason: reason.map(str::to_string),
            cancelled_by: Some("Coach Kim".to_string()),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_small_roster() {
        let text = render_roster(&roster_of(&["Alice", "Bob"]), None);

        let expected = "📋 **THM Volleyball Roster - Sunday, August 03**\n\
\n\
✅ Confirmed to Play:\n\
1. Alice\n\
2. Bob\n\
\n\
⏳ Waitlist:\n\
None\n\
\n\
📍 KMCD Gym | 2-5 PM\n\
🚪 Enter through the double doors (north side)\n\
📝 Please arrive on time — late spots may be given to waitlisters.";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_render_empty_roster() {
        let text = render_roster(&Roster::empty(sunday()), None);
        assert!(text.contains("✅ Confirmed to Play:\nNone\n"));
        assert!(text.contains("⏳ Waitlist:\nNone\n"));
    }

    #[test]
    fn test_render_waitlist_is_numbered() {
        let text = render_roster(&numbered(23), None);
        assert!(text.contains("21. Player 21\n"));
        assert!(text.contains("⏳ Waitlist:\n1. Player 22\n2. Player 23\n"));
    }

    #[test]
    fn test_render_cancelled_banner_leads() {
        let roster = roster_of(&["Alice"]);
        let record = cancelled(Some("gym closed"));
        let text = render_roster(&roster, Some(&record));

        assert!(text.starts_with(
            "🚫 Sunday volleyball is CANCELLED - August 03, 2025\nReason: gym closed\n\n"
        ));
        assert!(text.contains("1. Alice"));
    }

    #[test]
    fn test_render_cancelled_default_reason() {
        let text = render_roster(&roster_of(&[]), Some(&cancelled(None)));
        assert!(text.contains("Reason: No reason provided"));
    }

    #[test]
    fn test_render_uncancelled_record_matches_absent() {
        let roster = roster_of(&["Alice", "Bob"]);
        let mut record = cancelled(Some("gym closed"));
        record.cancelled = false;

        assert_eq!(
            render_roster(&roster, Some(&record)),
            render_roster(&roster, None)
        );
        assert_eq!(
            render_announcement(&roster, Some(&record)),
            render_announcement(&roster, None)
        );
    }

    #[test]
    fn test_render_announcement_states() {
        let roster = numbered(23);
        assert_eq!(
            render_announcement(&roster, None),
            "✅ **Sunday volleyball is on - August 03, 2025!**\n👥 21/21 confirmed, 2 waitlisted"
        );

        let text = render_announcement(&roster, Some(&cancelled(Some("gym closed"))));
        assert_eq!(
            text,
            "🛑 **Sunday volleyball has been CANCELLED - August 03, 2025**\n📝 Reason: gym closed\n👤 By: Coach Kim"
        );
    }

    #[test]
    fn test_truncates_waitlist_with_marker() {
        let roster = numbered(60);
        let full = render_roster_within(&roster, None, usize::MAX);
        let limit = full.chars().count() - 30;

        let text = render_roster_within(&roster, None, limit);
        assert!(text.chars().count() <= limit);
        assert!(text.contains("1. Player 22\n"));
        assert!(!text.contains("Player 60"));
        assert!(text.contains(" more\n"));
        assert!(text.ends_with("waitlisters."));
    }

    #[test]
    fn test_hard_truncation_when_waitlist_is_not_enough() {
        let text = render_roster_within(&numbered(25), None, 100);
        assert_eq!(text.chars().count(), 100);
        assert!(text.ends_with('…'));
    }

    #[test]
    fn test_long_reason_is_clipped_in_both_messages() {
        let reason = "r".repeat(2500);
        let record = cancelled(Some(&reason));
        let roster = numbered(25);

        let roster_text = render_roster(&roster, Some(&record));
        assert!(roster_text.chars().count() <= MESSAGE_LIMIT);
        assert!(roster_text.contains(ROSTER_MARKER));
        assert!(roster_text.contains(&format!("Reason: {}…\n", "r".repeat(MAX_REASON_CHARS - 1))));
        assert!(roster_text.ends_with("waitlisters."));

        let announcement = render_announcement(&roster, Some(&record));
        assert!(announcement.chars().count() <= MESSAGE_LIMIT);
        assert!(announcement.starts_with("🛑 **Sunday volleyball has been CANCELLED"));
        assert!(announcement.ends_with("👤 By: Coach Kim"));
    }

    #[test]
    fn test_roster_marker_survives_hard_cut() {
        let long = "N".repeat(95);
        let names: Vec<String> = (0..21).map(|i| format!("{long}{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let record = cancelled(Some(&"r".repeat(5000)));

        let text = render_roster(&roster_of(&refs), Some(&record));
        assert_eq!(text.chars().count(), MESSAGE_LIMIT);
        assert!(text.ends_with('…'));
        assert!(text.contains(ROSTER_MARKER));
    }

    #[test]
    fn test_clip_reason() {
        assert_eq!(clip_reason("gym closed"), "gym closed");
        assert_eq!(clip_reason(&"x".repeat(MAX_REASON_CHARS)).chars().count(), MAX_REASON_CHARS);
        let clipped = clip_reason(&"x".repeat(MAX_REASON_CHARS + 1));
        assert_eq!(clipped.chars().count(), MAX_REASON_CHARS);
        assert!(clipped.ends_with('…'));
    }

    #[test]
    fn test_default_limit_fits_long_names() {
        let long = "X".repeat(90);
        let names: Vec<String> = (0..40).map(|i| format!("{long}{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let text = render_roster(&roster_of(&refs), None);
        assert!(text.chars().count() <= MESSAGE_LIMIT);
    }

    proptest! {
        #[test]
        fn render_is_deterministic(
            names in proptest::collection::vec("[A-Za-z ]{1,20}", 0..40),
            reason in proptest::option::of("[a-z ]{0,400}"),
            is_cancelled in any::<bool>(),
        ) {
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let roster = roster_of(&refs);
            let record = CancellationRecord {
                week_anchor: sunday(),
                cancelled: is_cancelled,
                reason,
                cancelled_by: None,
                updated_at: Utc::now(),
            };

            prop_assert_eq!(
                render_roster(&roster, Some(&record)),
                render_roster(&roster.clone(), Some(&record.clone()))
            );
            prop_assert_eq!(
                render_announcement(&roster, Some(&record)),
                render_announcement(&roster.clone(), Some(&record.clone()))
            );
            prop_assert!(render_roster(&roster, Some(&record)).chars().count() <= MESSAGE_LIMIT);
            prop_assert!(render_roster(&roster, Some(&record)).contains(ROSTER_MARKER));
            prop_assert!(render_announcement(&roster, Some(&record)).chars().count() <= MESSAGE_LIMIT);
        }
    }
}
