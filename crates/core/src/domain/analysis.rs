use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    PendingPayment,
    Paid,
    PaymentFailed,
}

impl AnalysisStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
            AnalysisStatus::PendingPayment => "pending_payment",
            AnalysisStatus::Paid => "paid",
            AnalysisStatus::PaymentFailed => "payment_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => AnalysisStatus::Pending,
            "processing" => AnalysisStatus::Processing,
            "completed" => AnalysisStatus::Completed,
            "failed" => AnalysisStatus::Failed,
            "pending_payment" => AnalysisStatus::PendingPayment,
            "paid" => AnalysisStatus::Paid,
            "payment_failed" => AnalysisStatus::PaymentFailed,
            _ => return None,
        })
    }
}

/// One owner's expense statement for one building and billing month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseAnalysis {
    pub id: Uuid,
    pub user_id: Uuid,
    pub building_name: Option<String>,
    pub period: String,
    pub period_date: Option<NaiveDate>,
    pub total_amount: f64,
    pub previous_total: Option<f64>,
    pub status: AnalysisStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    Ok,
    Attention,
    Info,
}

impl CategoryStatus {
    /// Unknown tags are shown as informational.
    pub fn parse(s: &str) -> Self {
        match s {
            "ok" => CategoryStatus::Ok,
            "attention" => CategoryStatus::Attention,
            _ => CategoryStatus::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subcategory {
    pub name: String,
    pub amount: f64,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseCategory {
    pub name: String,
    pub current_amount: f64,
    pub previous_amount: Option<f64>,
    pub status: CategoryStatus,
    pub explanation: Option<String>,
    #[serde(default)]
    pub subcategories: Vec<Subcategory>,
}

/// The slice of an analysis the trend computations need.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisTotal {
    pub user_id: Uuid,
    pub building_name: String,
    pub period: String,
    pub period_date: Option<NaiveDate>,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedLink {
    pub token: String,
    pub analysis_id: Uuid,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SharedLink {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |exp| exp > now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentAuthor {
    Owner,
    Visitor,
}

impl CommentAuthor {
    pub fn as_str(self) -> &'static str {
        match self {
            CommentAuthor::Owner => "owner",
            CommentAuthor::Visitor => "visitor",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisComment {
    pub id: Uuid,
    pub analysis_id: Uuid,
    pub author: CommentAuthor,
    pub author_name: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub analysis_id: Uuid,
    pub author: CommentAuthor,
    pub author_name: Option<String>,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_round_trips_through_db_strings() {
        for s in [
            "pending",
            "processing",
            "completed",
            "failed",
            "pending_payment",
            "paid",
            "payment_failed",
        ] {
            assert_eq!(AnalysisStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(AnalysisStatus::parse("archived").is_none());
    }

    #[test]
    fn shared_link_respects_expiry_and_flag() {
        let now = Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap();
        let mut link = SharedLink {
            token: "abc".to_string(),
            analysis_id: Uuid::new_v4(),
            is_active: true,
            expires_at: None,
        };
        assert!(link.is_usable(now));

        link.expires_at = Some(Utc.with_ymd_and_hms(2026, 1, 9, 0, 0, 0).unwrap());
        assert!(!link.is_usable(now));

        link.expires_at = None;
        link.is_active = false;
        assert!(!link.is_usable(now));
    }
}
