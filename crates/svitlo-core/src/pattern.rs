use chrono::{Datelike, NaiveDate};

use crate::domain::SchedulePattern;

/// Ukrainian month names in genitive case, as the source channel writes them.
const MONTHS: [&str; 12] = [
    "січня",
    "лютого",
    "березня",
    "квітня",
    "травня",
    "червня",
    "липня",
    "серпня",
    "вересня",
    "жовтня",
    "листопада",
    "грудня",
];

impl SchedulePattern {
    /// Build the search and caption texts for `date`.
    ///
    /// The day of month carries no leading zero; every date yields a valid
    /// pattern.
    pub fn for_date(date: NaiveDate) -> Self {
        let day = date.day();
        let month = MONTHS[date.month0() as usize];
        Self {
            search_text: format!("⚡️ Київщина: графіки відключень на {day} {month}"),
            caption_text: format!("⚡️ Графіки відключень на {day} {month} по Київщині"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_texts_for_early_may() {
        let p = SchedulePattern::for_date(NaiveDate::from_ymd_opt(2026, 5, 3).unwrap());
        assert_eq!(p.search_text, "⚡️ Київщина: графіки відключень на 3 травня");
        assert_eq!(p.caption_text, "⚡️ Графіки відключень на 3 травня по Київщині");
    }

    #[test]
    fn day_has_no_leading_zero() {
        let p = SchedulePattern::for_date(NaiveDate::from_ymd_opt(2026, 1, 7).unwrap());
        assert!(p.search_text.ends_with("на 7 січня"));
        assert!(p.caption_text.contains("на 7 січня"));
    }

    #[test]
    fn month_table_covers_year_edges() {
        let jan = SchedulePattern::for_date(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap());
        let dec = SchedulePattern::for_date(NaiveDate::from_ymd_opt(2026, 12, 1).unwrap());
        assert!(jan.search_text.contains("31 січня"));
        assert!(dec.search_text.contains("1 грудня"));
    }
}
