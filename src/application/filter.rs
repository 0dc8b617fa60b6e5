use gadfly_api_types::Meeting;

/// Meetings whose title contains `query`, ignoring case and surrounding
/// whitespace. A blank query keeps every meeting. Order is preserved.
pub fn filter_meetings(meetings: &[Meeting], query: &str) -> Vec<Meeting> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return meetings.to_vec();
    }
    meetings
        .iter()
        .filter(|meeting| meeting.title.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meeting(title: &str) -> Meeting {
        Meeting {
            id: format!("Orting/{title}.pdf"),
            title: title.to_string(),
            jurisdiction: "Orting".into(),
            date: None,
        }
    }

    fn titles(meetings: &[Meeting]) -> Vec<&str> {
        meetings.iter().map(|m| m.title.as_str()).collect()
    }

    #[test]
    fn matches_case_insensitive_substring() {
        let meetings = [meeting("Budget Hearing"), meeting("Zoning Review")];
        assert_eq!(
            titles(&filter_meetings(&meetings, "budget")),
            vec!["Budget Hearing"]
        );
        assert_eq!(
            titles(&filter_meetings(&meetings, "VIEW")),
            vec!["Zoning Review"]
        );
    }

    #[test]
    fn blank_query_is_identity() {
        let meetings = [meeting("Budget Hearing"), meeting("Zoning Review")];
        assert_eq!(filter_meetings(&meetings, ""), meetings.to_vec());
        assert_eq!(filter_meetings(&meetings, "   "), meetings.to_vec());
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let meetings = [meeting("Budget Hearing"), meeting("Zoning Review")];
        assert_eq!(
            titles(&filter_meetings(&meetings, "  hearing ")),
            vec!["Budget Hearing"]
        );
    }

    #[test]
    fn filtering_is_idempotent() {
        let meetings = [
            meeting("Budget Hearing"),
            meeting("Zoning Review"),
            meeting("Budget Workshop"),
        ];
        let once = filter_meetings(&meetings, "budget");
        assert_eq!(filter_meetings(&once, "budget"), once);
        assert_eq!(titles(&once), vec!["Budget Hearing", "Budget Workshop"]);
    }
}
