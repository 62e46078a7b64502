//! Doctor directory models.

use serde::{Deserialize, Serialize};

/// Listing entry from the verified doctor directory.
///
/// Decimal fields (fees, ratings) arrive as strings; the server serializes
/// fixed-point values that way and the client only displays them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSummary {
    pub id: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub qualification: Option<String>,
    #[serde(default)]
    pub years_of_experience: Option<u32>,
    #[serde(default)]
    pub consultation_fee: Option<String>,
    #[serde(default)]
    pub clinic_address: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_accepting_new_patients: bool,
    #[serde(default)]
    pub total_reviews: Option<u32>,
    #[serde(default)]
    pub average_rating: Option<String>,
    #[serde(default)]
    pub available_today: bool,
}

impl DoctorSummary {
    /// Name for display, falling back through the available fields.
    pub fn name(&self) -> String {
        if let Some(ref display) = self.display_name {
            if !display.trim().is_empty() {
                return display.clone();
            }
        }
        let joined = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let joined = joined.trim();
        if !joined.is_empty() {
            return format!("Dr. {joined}");
        }
        self.email.clone().unwrap_or_else(|| "(unnamed)".to_string())
    }
}

/// Query filters accepted by the directory endpoint. The server sorts by
/// rating (descending) when no sort is given.
#[derive(Debug, Clone, Default)]
pub struct DoctorQuery {
    pub specialty: Option<String>,
    pub min_fee: Option<f64>,
    pub max_fee: Option<f64>,
    pub min_experience: Option<u32>,
    pub sort: Option<String>,
}

impl DoctorQuery {
    /// Build the query-string pairs, skipping unset filters.
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(ref specialty) = self.specialty {
            pairs.push(("specialty", specialty.clone()));
        }
        if let Some(min_fee) = self.min_fee {
            pairs.push(("min_fee", min_fee.to_string()));
        }
        if let Some(max_fee) = self.max_fee {
            pairs.push(("max_fee", max_fee.to_string()));
        }
        if let Some(min_experience) = self.min_experience {
            pairs.push(("min_experience", min_experience.to_string()));
        }
        if let Some(ref sort) = self.sort {
            pairs.push(("sort", sort.clone()));
        }
        pairs
    }
}
