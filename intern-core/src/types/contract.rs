//! Internship contracts

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::common::{ContractId, SiteId, UserId};

/// Internship contract binding a student, a supervising teacher and sites
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub student_id: UserId,
    pub teacher_id: UserId,
    pub site_ids: Vec<SiteId>,
    /// First valid day, inclusive
    pub start_date: NaiveDate,
    /// Last valid day, inclusive
    pub end_date: NaiveDate,
    /// Administrative switch; a suspended contract accepts no punches
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Contract {
    /// Whether the validity period covers `at` (UTC calendar date)
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.start_date <= day && day <= self.end_date
    }

    /// Active flag set and `at` inside the validity period
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.active && self.covers(at)
    }
}

/// Input for creating a contract
#[derive(Debug, Clone)]
pub struct NewContract {
    pub student_id: UserId,
    pub teacher_id: UserId,
    pub site_ids: Vec<SiteId>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}
