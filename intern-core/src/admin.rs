//! Administration
//!
//! Registration of users, sites and contracts, with the capability checks and
//! policy limits that apply to each.

use std::collections::HashSet;
use std::sync::Arc;

use crate::attendance::can_view_contract;
use crate::clock::Clock;
use crate::config::PolicyConfig;
use crate::error::{CoreError, CoreResult};
use crate::geo::GeoPoint;
use crate::geocode::Geocoder;
use crate::storage::{ContractFilter, ContractRegistry, UserDirectory};
use crate::types::{
    CallerContext, Capability, Contract, ContractId, NewContract, NewSite, NewUser, PostalAddress,
    Role, Site, SiteId, SiteLocation, User, UserId,
};

/// User, site and contract administration
pub struct AdminService {
    users: Arc<dyn UserDirectory>,
    registry: Arc<dyn ContractRegistry>,
    geocoder: Arc<dyn Geocoder>,
    clock: Arc<dyn Clock>,
    policy: PolicyConfig,
}

impl AdminService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        registry: Arc<dyn ContractRegistry>,
        geocoder: Arc<dyn Geocoder>,
        clock: Arc<dyn Clock>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            users,
            registry,
            geocoder,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    // ===== Users =====

    fn check_new_user(new: &NewUser) -> CoreResult<()> {
        if new.name.trim().is_empty() {
            return Err(CoreError::validation("name must not be empty"));
        }
        if new.enrollment.trim().is_empty() {
            return Err(CoreError::validation("enrollment must not be empty"));
        }
        if !new.email.contains('@') {
            return Err(CoreError::validation("e-mail address is malformed"));
        }
        Ok(())
    }

    async fn insert_user(&self, new: NewUser) -> CoreResult<User> {
        Self::check_new_user(&new)?;
        let user = User {
            id: UserId::new(),
            name: new.name,
            enrollment: new.enrollment,
            email: new.email,
            contact: new.contact,
            class_group: new.class_group,
            role: new.role,
            password_hash: new.password_hash,
            created_at: self.clock.now(),
        };
        self.users.create_user(&user).await?;

        tracing::info!(
            user_id = %user.id,
            enrollment = %user.enrollment,
            role = %user.role,
            "User registered"
        );
        Ok(user)
    }

    /// Self-registration; only student accounts
    pub async fn register_user(&self, new: NewUser) -> CoreResult<User> {
        if new.role != Role::Student {
            return Err(CoreError::forbidden(format!(
                "self-registration cannot create {} accounts",
                new.role
            )));
        }
        self.insert_user(new).await
    }

    /// Staff-driven user creation, any role
    pub async fn create_user(&self, ctx: &CallerContext, new: NewUser) -> CoreResult<User> {
        ctx.require(Capability::ManageUsers)?;
        self.insert_user(new).await
    }

    /// Create the initial admin unless its enrollment already exists
    pub async fn bootstrap_admin(&self, mut new: NewUser) -> CoreResult<User> {
        if let Some(existing) = self.users.find_by_enrollment(&new.enrollment).await? {
            return Ok(existing);
        }
        new.role = Role::Admin;
        self.insert_user(new).await
    }

    /// Lookup used by the login flow
    pub async fn find_by_enrollment(&self, enrollment: &str) -> CoreResult<Option<User>> {
        self.users.find_by_enrollment(enrollment).await
    }

    /// Own profile, or anyone's with `ManageUsers`
    pub async fn get_user(&self, ctx: &CallerContext, user_id: &UserId) -> CoreResult<User> {
        if ctx.user_id != *user_id {
            ctx.require(Capability::ManageUsers)?;
        }
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("user {}", user_id)))
    }

    pub async fn list_users(
        &self,
        ctx: &CallerContext,
        role: Option<Role>,
        skip: usize,
        limit: usize,
    ) -> CoreResult<Vec<User>> {
        ctx.require(Capability::ManageUsers)?;
        self.users.list_users(role, skip, limit).await
    }

    // ===== Sites =====

    /// Register a site. Addresses are geocoded here, once.
    pub async fn register_site(&self, ctx: &CallerContext, new: NewSite) -> CoreResult<Site> {
        ctx.require(Capability::ManageSites)?;

        if new.name.trim().is_empty() {
            return Err(CoreError::validation("site name must not be empty"));
        }
        let radius_m = new.radius_m.unwrap_or(self.policy.default_radius_m);
        if !radius_m.is_finite() || radius_m <= 0.0 || radius_m > self.policy.max_radius_m {
            return Err(CoreError::validation(format!(
                "radius must be in (0, {}] meters, got {}",
                self.policy.max_radius_m, radius_m
            )));
        }

        let (center, address) = match new.location {
            SiteLocation::Coordinates(point) => (point, None),
            SiteLocation::Address(address) => {
                let point = self.resolve(&address).await?;
                (point, Some(address))
            }
        };

        let site = Site {
            id: SiteId::new(),
            name: new.name,
            center,
            radius_m,
            address,
            created_at: self.clock.now(),
        };
        // Rejects degenerate geofences before they are stored
        site.geofence()?;
        self.registry.save_site(&site).await?;

        tracing::info!(
            site_id = %site.id,
            latitude = site.center.latitude,
            longitude = site.center.longitude,
            radius_m = site.radius_m,
            "Site registered"
        );
        Ok(site)
    }

    async fn resolve(&self, address: &PostalAddress) -> CoreResult<GeoPoint> {
        match self.geocoder.geocode(address).await? {
            Some(point) => Ok(point),
            None => {
                tracing::warn!(query = %address.to_query(), "Address not resolved");
                Err(CoreError::Geocoding(format!(
                    "no coordinates found for '{}'",
                    address.to_query()
                )))
            }
        }
    }

    pub async fn get_site(&self, site_id: &SiteId) -> CoreResult<Site> {
        self.registry
            .get_site(site_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("site {}", site_id)))
    }

    // ===== Contracts =====

    async fn require_role(&self, user_id: &UserId, role: Role) -> CoreResult<()> {
        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("user {}", user_id)))?;
        if user.role != role {
            return Err(CoreError::validation(format!(
                "user {} is a {}, expected {}",
                user_id, user.role, role
            )));
        }
        Ok(())
    }

    pub async fn create_contract(
        &self,
        ctx: &CallerContext,
        new: NewContract,
    ) -> CoreResult<Contract> {
        ctx.require(Capability::ManageContracts)?;

        if new.start_date > new.end_date {
            return Err(CoreError::validation(format!(
                "start date {} is after end date {}",
                new.start_date, new.end_date
            )));
        }

        let mut seen = HashSet::new();
        let site_ids: Vec<SiteId> = new
            .site_ids
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();
        if site_ids.is_empty() {
            return Err(CoreError::validation("a contract needs at least one site"));
        }
        if site_ids.len() > self.policy.max_sites_per_contract {
            return Err(CoreError::validation(format!(
                "at most {} sites per contract",
                self.policy.max_sites_per_contract
            )));
        }
        for site_id in &site_ids {
            if self.registry.get_site(site_id).await?.is_none() {
                return Err(CoreError::not_found(format!("site {}", site_id)));
            }
        }

        self.require_role(&new.student_id, Role::Student).await?;
        self.require_role(&new.teacher_id, Role::Teacher).await?;

        let contract = Contract {
            id: ContractId::new(),
            student_id: new.student_id,
            teacher_id: new.teacher_id,
            site_ids,
            start_date: new.start_date,
            end_date: new.end_date,
            active: true,
            created_at: self.clock.now(),
        };
        self.registry.save_contract(&contract).await?;

        tracing::info!(
            contract_id = %contract.id,
            student_id = %contract.student_id,
            teacher_id = %contract.teacher_id,
            sites = contract.site_ids.len(),
            "Contract created"
        );
        Ok(contract)
    }

    pub async fn get_contract(
        &self,
        ctx: &CallerContext,
        contract_id: &ContractId,
    ) -> CoreResult<Contract> {
        let contract = self
            .registry
            .get_contract(contract_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("contract {}", contract_id)))?;
        if !can_view_contract(ctx, &contract) && !ctx.can(Capability::ManageContracts) {
            return Err(CoreError::forbidden(format!("no access to contract {}", contract_id)));
        }
        Ok(contract)
    }

    /// Contracts visible to the caller: all for staff, supervised ones for
    /// teachers, own ones for students
    pub async fn list_contracts(
        &self,
        ctx: &CallerContext,
        skip: usize,
        limit: usize,
    ) -> CoreResult<Vec<Contract>> {
        let filter = if ctx.can(Capability::ViewAllAttendance)
            || ctx.can(Capability::ManageContracts)
        {
            ContractFilter::default()
        } else if ctx.can(Capability::ViewSupervisedAttendance) {
            ContractFilter {
                teacher_id: Some(ctx.user_id),
                ..Default::default()
            }
        } else if ctx.can(Capability::ViewOwnAttendance) {
            ContractFilter {
                student_id: Some(ctx.user_id),
                ..Default::default()
            }
        } else {
            return Err(CoreError::forbidden("no contract listing capability"));
        };
        self.registry.list_contracts(filter, skip, limit).await
    }

    /// Activate or suspend a contract
    pub async fn set_contract_status(
        &self,
        ctx: &CallerContext,
        contract_id: &ContractId,
        active: bool,
    ) -> CoreResult<Contract> {
        ctx.require(Capability::ManageContracts)?;
        let mut contract = self
            .registry
            .get_contract(contract_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("contract {}", contract_id)))?;

        if contract.active != active {
            contract.active = active;
            self.registry.save_contract(&contract).await?;
            tracing::info!(contract_id = %contract.id, active, "Contract status changed");
        }
        Ok(contract)
    }
}
