//! Users, roles and capabilities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::common::UserId;

/// Capability required by a core operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Clock in/out against one's own contract
    ClockPunch,
    /// Read one's own punches and history
    ViewOwnAttendance,
    /// Read attendance of supervised students
    ViewSupervisedAttendance,
    /// Read attendance of any student
    ViewAllAttendance,
    /// Create and suspend contracts
    ManageContracts,
    /// Register work sites
    ManageSites,
    /// Create users of any role and list users
    ManageUsers,
}

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    Coordinator,
    Admin,
}

impl Role {
    /// Capabilities granted to this role
    pub fn capabilities(&self) -> HashSet<Capability> {
        let mut caps = HashSet::new();

        match self {
            Role::Student => {
                caps.insert(Capability::ClockPunch);
                caps.insert(Capability::ViewOwnAttendance);
            }
            Role::Teacher => {
                caps.insert(Capability::ViewSupervisedAttendance);
            }
            Role::Coordinator => {
                caps.insert(Capability::ViewSupervisedAttendance);
                caps.insert(Capability::ViewAllAttendance);
                caps.insert(Capability::ManageContracts);
                caps.insert(Capability::ManageSites);
                caps.insert(Capability::ManageUsers);
            }
            Role::Admin => {
                caps.insert(Capability::ViewSupervisedAttendance);
                caps.insert(Capability::ViewAllAttendance);
                caps.insert(Capability::ManageContracts);
                caps.insert(Capability::ManageSites);
                caps.insert(Capability::ManageUsers);
            }
        }

        caps
    }

    /// Check a single capability
    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Coordinator => "coordinator",
            Role::Admin => "admin",
        }
    }

    /// Parse role from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "student" | "aluno" => Some(Role::Student),
            "teacher" | "professor" => Some(Role::Teacher),
            "coordinator" | "coordenador" => Some(Role::Coordinator),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Institutional enrollment number, unique
    pub enrollment: String,
    /// Unique e-mail address
    pub email: String,
    pub contact: Option<String>,
    pub class_group: Option<String>,
    pub role: Role,
    /// Opaque credential owned by the auth layer
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub enrollment: String,
    pub email: String,
    pub contact: Option<String>,
    pub class_group: Option<String>,
    pub role: Role,
    pub password_hash: String,
}

/// Authenticated caller, passed explicitly into every core call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerContext {
    pub user_id: UserId,
    pub role: Role,
}

impl CallerContext {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.role.can(capability)
    }

    /// Fail with `Forbidden` unless the caller holds `capability`
    pub fn require(&self, capability: Capability) -> crate::error::CoreResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(crate::error::CoreError::forbidden(format!(
                "role {} lacks capability {:?}",
                self.role, capability
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_student_capabilities() {
        let caps = Role::Student.capabilities();
        assert!(caps.contains(&Capability::ClockPunch));
        assert!(!caps.contains(&Capability::ManageContracts));
    }

    #[test]
    fn test_only_students_punch() {
        assert!(!Role::Teacher.can(Capability::ClockPunch));
        assert!(!Role::Coordinator.can(Capability::ClockPunch));
        assert!(!Role::Admin.can(Capability::ClockPunch));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("Professor"), Some(Role::Teacher));
        assert_eq!(Role::parse("coordinator"), Some(Role::Coordinator));
        assert_eq!(Role::parse("guest"), None);
    }

    #[test]
    fn test_require_capability() {
        let ctx = CallerContext::new(UserId::new(), Role::Teacher);
        assert!(ctx.require(Capability::ViewSupervisedAttendance).is_ok());
        assert!(ctx.require(Capability::ManageSites).is_err());
    }
}
