//! Request and response bodies

use chrono::{DateTime, NaiveDate, Utc};
use intern_core::{
    ContractId, GeoPoint, NewContract, NewSite, PostalAddress, Role, SiteId, SiteLocation, User,
    UserId,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ApiError, ApiResult};

/// Default page size
pub const DEFAULT_PAGE_LIMIT: usize = 50;
/// Largest accepted page size
pub const MAX_PAGE_LIMIT: usize = 200;

// ============ Auth ============

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 32))]
    pub enrollment: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 40))]
    pub contact: Option<String>,
    #[validate(length(max = 40))]
    pub class_group: Option<String>,
    /// Defaults to student
    pub role: Option<String>,
}

impl RegisterRequest {
    pub fn role(&self) -> ApiResult<Role> {
        match self.role.as_deref() {
            None => Ok(Role::Student),
            Some(r) => Role::parse(r)
                .ok_or_else(|| ApiError::Validation(format!("unknown role '{}'", r))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub enrollment: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until expiry
    pub expires_in: u64,
}

/// User without credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub name: String,
    pub enrollment: String,
    pub email: String,
    pub contact: Option<String>,
    pub class_group: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            enrollment: user.enrollment,
            email: user.email,
            contact: user.contact,
            class_group: user.class_group,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

// ============ Listing ============

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl Pagination {
    pub fn skip(&self) -> usize {
        self.skip.unwrap_or(0)
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserListQuery {
    pub role: Option<String>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl UserListQuery {
    pub fn role(&self) -> ApiResult<Option<Role>> {
        self.role
            .as_deref()
            .map(|r| Role::parse(r).ok_or_else(|| ApiError::Validation(format!("unknown role '{}'", r))))
            .transpose()
    }

    pub fn page(&self) -> Pagination {
        Pagination {
            skip: self.skip,
            limit: self.limit,
        }
    }
}

/// Half-open time range `[from, to)`
#[derive(Debug, Clone, Deserialize)]
pub struct RangeQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

// ============ Sites ============

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddressDto {
    #[validate(length(max = 16))]
    pub postal_code: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub street: String,
    #[validate(length(max = 16))]
    pub number: Option<String>,
    #[validate(length(max = 100))]
    pub district: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 50))]
    pub state: String,
}

impl From<AddressDto> for PostalAddress {
    fn from(dto: AddressDto) -> Self {
        Self {
            postal_code: dto.postal_code,
            street: dto.street,
            number: dto.number,
            district: dto.district,
            city: dto.city,
            state: dto.state,
        }
    }
}

/// Either `latitude`/`longitude` or `address` must be given
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSiteRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    pub address: Option<AddressDto>,
    pub radius_m: Option<f64>,
}

impl CreateSiteRequest {
    pub fn into_new_site(self) -> ApiResult<NewSite> {
        let location = match (self.latitude, self.longitude, self.address) {
            (Some(lat), Some(lon), _) => SiteLocation::Coordinates(GeoPoint::new(lat, lon)?),
            (None, None, Some(address)) => {
                address.validate()?;
                SiteLocation::Address(address.into())
            }
            _ => {
                return Err(ApiError::Validation(
                    "provide both latitude and longitude, or an address".to_string(),
                ))
            }
        };
        Ok(NewSite {
            name: self.name,
            location,
            radius_m: self.radius_m,
        })
    }
}

// ============ Contracts ============

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateContractRequest {
    pub student_id: UserId,
    pub teacher_id: UserId,
    #[validate(length(min = 1))]
    pub site_ids: Vec<SiteId>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl From<CreateContractRequest> for NewContract {
    fn from(req: CreateContractRequest) -> Self {
        Self {
            student_id: req.student_id,
            teacher_id: req.teacher_id,
            site_ids: req.site_ids,
            start_date: req.start_date,
            end_date: req.end_date,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractStatusRequest {
    pub active: bool,
}

// ============ Punches ============

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PunchBody {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    /// Defaults to the server clock
    pub reported_at: Option<DateTime<Utc>>,
}

impl PunchBody {
    pub fn location(&self) -> ApiResult<GeoPoint> {
        Ok(GeoPoint::new(self.latitude, self.longitude)?)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LocationCheckBody {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

/// Punches of one contract over a range
#[derive(Debug, Clone, Serialize)]
pub struct PunchListResponse {
    pub contract_id: ContractId,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub punches: Vec<intern_core::Punch>,
}

// ============ Health ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_validation() {
        let req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "name": "Ana",
            "enrollment": "2025001",
            "password": "short",
            "email": "not-an-email"
        }))
        .unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("email"));
        assert_eq!(req.role().unwrap(), Role::Student);
    }

    #[test]
    fn test_site_request_needs_a_location() {
        let req: CreateSiteRequest = serde_json::from_value(serde_json::json!({
            "name": "Office",
            "latitude": 38.7
        }))
        .unwrap();
        assert!(matches!(req.into_new_site(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_site_request_with_address() {
        let req: CreateSiteRequest = serde_json::from_value(serde_json::json!({
            "name": "Office",
            "address": {"street": "Rua Augusta", "city": "Lisboa", "state": "LX"}
        }))
        .unwrap();
        let site = req.into_new_site().unwrap();
        assert!(matches!(site.location, SiteLocation::Address(_)));
        assert!(site.radius_m.is_none());
    }

    #[test]
    fn test_pagination_clamps_limit() {
        let page = Pagination {
            skip: None,
            limit: Some(10_000),
        };
        assert_eq!(page.limit(), MAX_PAGE_LIMIT);
        assert_eq!(page.skip(), 0);
    }
}
