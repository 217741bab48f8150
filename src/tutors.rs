// Tutor search: the listing is fetched once and narrowed entirely in
// memory, so typing in a filter never costs a server round-trip.

use crate::models::TutorProfile;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TutorFilters {
    /// Case-insensitive substring match on the tutor's display name.
    pub name: Option<String>,
    /// Case-insensitive substring match on any subject name.
    pub subject: Option<String>,
}

impl TutorFilters {
    pub fn is_empty(&self) -> bool {
        fn blank(field: &Option<String>) -> bool {
            field.as_deref().map_or(true, |s| s.trim().is_empty())
        }
        blank(&self.name) && blank(&self.subject)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TutorSort {
    /// Server order, untouched.
    Recommended,
    /// Highest average rating first.
    RatingHigh,
    /// Cheapest first, by the first listed subject's hourly rate.
    PriceLow,
    /// Most expensive first.
    PriceHigh,
    /// Most years of experience first.
    Experience,
}

impl TutorSort {
    pub fn label(self) -> &'static str {
        match self {
            TutorSort::Recommended => "Recommended",
            TutorSort::RatingHigh => "Highest Rated",
            TutorSort::PriceLow => "Price: Low to High",
            TutorSort::PriceHigh => "Price: High to Low",
            TutorSort::Experience => "Most Experienced",
        }
    }

    pub fn next(self) -> TutorSort {
        match self {
            TutorSort::Recommended => TutorSort::RatingHigh,
            TutorSort::RatingHigh => TutorSort::PriceLow,
            TutorSort::PriceLow => TutorSort::PriceHigh,
            TutorSort::PriceHigh => TutorSort::Experience,
            TutorSort::Experience => TutorSort::Recommended,
        }
    }
}

/// Filter and sort a tutor listing. Pure: no I/O, no hidden state, and
/// identical inputs always produce identical output. Sorts are stable, so
/// ties keep the server's order.
pub fn search(
    tutors: &[TutorProfile],
    filters: &TutorFilters,
    sort: TutorSort,
) -> Vec<TutorProfile> {
    let mut result: Vec<TutorProfile> = tutors
        .iter()
        .filter(|tutor| matches_name(tutor, filters.name.as_deref()))
        .filter(|tutor| matches_subject(tutor, filters.subject.as_deref()))
        .cloned()
        .collect();

    match sort {
        TutorSort::Recommended => {}
        TutorSort::RatingHigh => result.sort_by(|a, b| {
            b.average_rating
                .unwrap_or(0.0)
                .total_cmp(&a.average_rating.unwrap_or(0.0))
        }),
        TutorSort::PriceLow => {
            result.sort_by(|a, b| a.lead_hourly_rate().total_cmp(&b.lead_hourly_rate()))
        }
        TutorSort::PriceHigh => {
            result.sort_by(|a, b| b.lead_hourly_rate().total_cmp(&a.lead_hourly_rate()))
        }
        TutorSort::Experience => result.sort_by(|a, b| {
            b.years_of_experience
                .unwrap_or(0)
                .cmp(&a.years_of_experience.unwrap_or(0))
        }),
    }

    result
}

fn matches_name(tutor: &TutorProfile, filter: Option<&str>) -> bool {
    match filter.map(str::trim) {
        None | Some("") => true,
        Some(term) => tutor
            .display_name()
            .to_lowercase()
            .contains(&term.to_lowercase()),
    }
}

fn matches_subject(tutor: &TutorProfile, filter: Option<&str>) -> bool {
    match filter.map(str::trim) {
        None | Some("") => true,
        Some(term) => {
            let term = term.to_lowercase();
            tutor
                .subjects
                .iter()
                .any(|subject| subject.name.to_lowercase().contains(&term))
        }
    }
}
