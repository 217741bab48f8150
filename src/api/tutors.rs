// Teacher service endpoints: tutor listings, counts, profiles.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::{Subject, TutorProfile};

use super::ApiClient;

/// Server-side listing filters. All optional; the terminal client usually
/// fetches one broad page and filters locally (see `crate::tutors`), but
/// the full parameter surface is kept for callers that want the server to
/// narrow the page.
#[derive(Debug, Clone, Default)]
pub struct TutorQuery {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub min_hourly_rate: Option<f64>,
    pub max_hourly_rate: Option<f64>,
    pub years_of_experience: Option<u32>,
    pub min_rating: Option<f64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl TutorQuery {
    pub fn new() -> Self {
        TutorQuery::default()
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn with_min_rating(mut self, rating: f64) -> Self {
        self.min_rating = Some(rating);
        self
    }

    pub fn with_page(mut self, skip: usize, limit: usize) -> Self {
        self.skip = Some(skip);
        self.limit = Some(limit);
        self
    }

    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(name) = &self.name {
            params.push(("name", name.clone()));
        }
        if let Some(subject) = &self.subject {
            params.push(("subject", subject.clone()));
        }
        if let Some(rate) = self.min_hourly_rate {
            params.push(("min_hourly_rate", rate.to_string()));
        }
        if let Some(rate) = self.max_hourly_rate {
            params.push(("max_hourly_rate", rate.to_string()));
        }
        if let Some(years) = self.years_of_experience {
            params.push(("years_of_experience", years.to_string()));
        }
        if let Some(rating) = self.min_rating {
            params.push(("min_rating", rating.to_string()));
        }
        if let Some(sort_by) = &self.sort_by {
            params.push(("sort_by", sort_by.clone()));
        }
        if let Some(sort_order) = &self.sort_order {
            params.push(("sort_order", sort_order.clone()));
        }
        if let Some(skip) = self.skip {
            params.push(("skip", skip.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        params
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TutorCount {
    pub total: u64,
}

/// Fields a teacher may change on their own profile. Everything is
/// optional; absent fields are left untouched server-side.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TutorProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub years_of_experience: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub education: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teaching_philosophy: Option<String>,
}

impl ApiClient {
    /// Fetch tutor listings, optionally narrowed server-side.
    pub async fn list_tutors(&self, query: &TutorQuery) -> Result<Vec<TutorProfile>, ApiError> {
        self.get_json_query("/api/teachers/teachers", &query.to_params())
            .await
    }

    /// Count tutors matching the query.
    pub async fn tutor_count(&self, query: &TutorQuery) -> Result<TutorCount, ApiError> {
        self.get_json_query("/api/teachers/teachers/count", &query.to_params())
            .await
    }

    /// Fetch one tutor's profile.
    pub async fn get_tutor(&self, tutor_id: i64) -> Result<TutorProfile, ApiError> {
        self.get_json(&format!("/api/teachers/teachers/{}", tutor_id))
            .await
    }

    /// Fetch the current (teacher) user's own profile.
    pub async fn current_tutor_profile(&self) -> Result<TutorProfile, ApiError> {
        self.get_json("/api/teachers/teachers/profile").await
    }

    /// Fetch the current (teacher) user's subjects.
    pub async fn my_subjects(&self) -> Result<Vec<Subject>, ApiError> {
        self.get_json("/api/teachers/teachers/me/subjects").await
    }

    /// Update the current (teacher) user's profile.
    pub async fn update_tutor_profile(
        &self,
        data: &TutorProfileUpdate,
    ) -> Result<TutorProfile, ApiError> {
        self.patch_json("/api/teachers/teachers/profile", data).await
    }
}
