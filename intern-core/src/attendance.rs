//! Attendance Service
//!
//! Entry point for clock-in/out and attendance reads. Validation and append of
//! a punch run under a per-ledger lock, so two submissions on the same
//! (student, contract) ledger are serialized and the second sees the first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::config::PolicyConfig;
use crate::error::{CoreError, CoreResult, PunchRejection};
use crate::geo::GeoPoint;
use crate::history::{HistoryAggregator, WorkedHistory};
use crate::storage::{AttendanceLedger, ContractRegistry};
use crate::types::{
    CallerContext, Capability, Contract, ContractId, LedgerKey, Punch, PunchId, PunchOutcome,
    PunchRequest, SiteId,
};
use crate::validator::{check_ownership, match_sites, PunchValidator};

/// Whether `ctx` may read attendance and details of `contract`
pub fn can_view_contract(ctx: &CallerContext, contract: &Contract) -> bool {
    ctx.can(Capability::ViewAllAttendance)
        || (ctx.can(Capability::ViewSupervisedAttendance) && contract.teacher_id == ctx.user_id)
        || (ctx.can(Capability::ViewOwnAttendance) && contract.student_id == ctx.user_id)
}

/// Dry-run geofence check result
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LocationCheck {
    pub contract_id: ContractId,
    pub inside: bool,
    pub matched_site: Option<SiteId>,
    pub nearest_site: Option<SiteId>,
    /// Distance to the matched site, or to the nearest one when outside
    pub distance_m: f64,
}

type LedgerLock = Arc<tokio::sync::Mutex<()>>;

/// Punch intake and attendance queries
pub struct AttendanceService {
    registry: Arc<dyn ContractRegistry>,
    ledger: Arc<dyn AttendanceLedger>,
    clock: Arc<dyn Clock>,
    validator: PunchValidator,
    history: HistoryAggregator,
    // One entry per ledger that passed the ownership check; never evicted
    locks: Mutex<HashMap<LedgerKey, LedgerLock>>,
}

impl AttendanceService {
    pub fn new(
        registry: Arc<dyn ContractRegistry>,
        ledger: Arc<dyn AttendanceLedger>,
        clock: Arc<dyn Clock>,
        policy: &PolicyConfig,
    ) -> Self {
        Self {
            validator: PunchValidator::new(
                registry.clone(),
                ledger.clone(),
                clock.clone(),
                policy.max_clock_skew(),
            ),
            history: HistoryAggregator::new(ledger.clone(), clock.clone()),
            registry,
            ledger,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn ledger_lock(&self, key: &LedgerKey) -> LedgerLock {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(*key).or_default().clone()
    }

    /// Validate and, if accepted, append a punch.
    ///
    /// Rule failures come back as `CoreError::Rejected` and leave the ledger
    /// untouched.
    pub async fn punch(&self, ctx: &CallerContext, request: PunchRequest) -> CoreResult<Punch> {
        // Rule 1 before taking a lock, so foreign or unknown contracts never get an entry
        let contract = self.registry.get_contract(&request.contract_id).await?;
        check_ownership(ctx, contract.as_ref()).map_err(CoreError::Rejected)?;

        let key = LedgerKey::new(ctx.user_id, request.contract_id);
        let lock = self.ledger_lock(&key);
        let _guard = lock.lock().await;

        // Full validation, rule 1 included, against state seen under the lock
        let (outcome, timestamp) = self.validator.validate(ctx, &request).await?;
        let (site_id, distance_m) = match outcome {
            PunchOutcome::Accepted {
                site_id,
                distance_m,
            } => (site_id, distance_m),
            PunchOutcome::Rejected(reason) => return Err(CoreError::Rejected(reason)),
        };

        let punch = Punch {
            id: PunchId::new(),
            user_id: ctx.user_id,
            contract_id: request.contract_id,
            direction: request.direction,
            timestamp,
            location: request.location,
            site_id,
            distance_m,
        };

        if let Err(e) = self.ledger.append(&punch).await {
            if matches!(e, CoreError::InvariantViolation(_)) {
                tracing::error!(ledger = %key, error = %e, "Validated punch refused by ledger");
            }
            return Err(e);
        }

        tracing::info!(
            punch_id = %punch.id,
            user_id = %punch.user_id,
            contract_id = %punch.contract_id,
            direction = %punch.direction,
            site_id = %punch.site_id,
            distance_m = punch.distance_m,
            "Punch accepted"
        );

        Ok(punch)
    }

    /// Evaluate a request without appending it
    pub async fn validate(
        &self,
        ctx: &CallerContext,
        request: &PunchRequest,
    ) -> CoreResult<PunchOutcome> {
        let (outcome, _) = self.validator.validate(ctx, request).await?;
        Ok(outcome)
    }

    /// Ownership, activity and geofence checks only; direction and time are
    /// ignored and the ledger is never read.
    pub async fn check_location(
        &self,
        ctx: &CallerContext,
        contract_id: &ContractId,
        location: GeoPoint,
    ) -> CoreResult<LocationCheck> {
        let contract = self.registry.get_contract(contract_id).await?;
        let contract = check_ownership(ctx, contract.as_ref()).map_err(CoreError::Rejected)?;
        if !contract.is_active_at(self.clock.now()) {
            return Err(CoreError::Rejected(PunchRejection::ContractInactive));
        }

        let sites = self.registry.get_sites(contract).await?;
        let m = match_sites(&sites, &location);

        Ok(LocationCheck {
            contract_id: contract.id,
            inside: m.inside(),
            matched_site: m.matched_site,
            nearest_site: m.nearest_site,
            distance_m: m.distance_m,
        })
    }

    async fn viewable_ledger(
        &self,
        ctx: &CallerContext,
        contract_id: &ContractId,
    ) -> CoreResult<LedgerKey> {
        let contract = self
            .registry
            .get_contract(contract_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("contract {}", contract_id)))?;

        if !can_view_contract(ctx, &contract) {
            return Err(CoreError::forbidden(format!(
                "no access to attendance of contract {}",
                contract_id
            )));
        }

        Ok(LedgerKey::new(contract.student_id, contract.id))
    }

    /// Punches of a contract's ledger with timestamps in `[from, to)`
    pub async fn query_range(
        &self,
        ctx: &CallerContext,
        contract_id: &ContractId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<Punch>> {
        if from >= to {
            return Err(CoreError::validation("`from` must be before `to`"));
        }
        let key = self.viewable_ledger(ctx, contract_id).await?;
        self.ledger.query_range(&key, from, to).await
    }

    /// Worked duration of a contract's ledger over `[from, to)`
    pub async fn compute_worked_duration(
        &self,
        ctx: &CallerContext,
        contract_id: &ContractId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<WorkedHistory> {
        let key = self.viewable_ledger(ctx, contract_id).await?;
        self.history.compute_worked_duration(&key, from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{MemoryStore, SledStore};
    use crate::types::{Direction, Role, Site, UserId};
    use chrono::{Duration, NaiveDate, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0).unwrap()
    }

    fn office() -> GeoPoint {
        GeoPoint::new(38.7223, -9.1393).unwrap()
    }

    fn nearby() -> GeoPoint {
        GeoPoint::new(38.7224, -9.1393).unwrap()
    }

    struct Harness {
        service: AttendanceService,
        clock: Arc<ManualClock>,
        student: CallerContext,
        teacher: CallerContext,
        contract: Contract,
    }

    impl Harness {
        fn request(&self, direction: Direction, location: GeoPoint) -> PunchRequest {
            PunchRequest {
                contract_id: self.contract.id,
                direction,
                location,
                reported_at: None,
            }
        }

        async fn punch(&self, direction: Direction) -> CoreResult<Punch> {
            self.service
                .punch(&self.student, self.request(direction, nearby()))
                .await
        }
    }

    async fn harness_with<S>(store: Arc<S>) -> Harness
    where
        S: ContractRegistry + AttendanceLedger + 'static,
    {
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let site = Site {
            id: SiteId::new(),
            name: "Office".to_string(),
            center: office(),
            radius_m: 100.0,
            address: None,
            created_at: at(8, 0),
        };
        store.save_site(&site).await.unwrap();

        let student = CallerContext::new(UserId::new(), Role::Student);
        let teacher = CallerContext::new(UserId::new(), Role::Teacher);
        let contract = Contract {
            id: ContractId::new(),
            student_id: student.user_id,
            teacher_id: teacher.user_id,
            site_ids: vec![site.id],
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            active: true,
            created_at: at(8, 0),
        };
        store.save_contract(&contract).await.unwrap();

        Harness {
            service: AttendanceService::new(
                store.clone(),
                store,
                clock.clone(),
                &PolicyConfig::default(),
            ),
            clock,
            student,
            teacher,
            contract,
        }
    }

    async fn harness() -> Harness {
        harness_with(Arc::new(MemoryStore::new())).await
    }

    #[tokio::test]
    async fn test_punch_day() {
        let h = harness().await;

        let clock_in = h.punch(Direction::In).await.unwrap();
        assert_eq!(clock_in.timestamp, at(9, 0));
        assert_eq!(clock_in.site_id, h.contract.site_ids[0]);

        h.clock.set(at(17, 0));
        h.punch(Direction::Out).await.unwrap();

        let history = h
            .service
            .compute_worked_duration(&h.student, &h.contract.id, at(9, 0), at(17, 0))
            .await
            .unwrap();
        assert_eq!(history.total_duration, Duration::hours(8));
        assert!(!history.incomplete_session_warning);
    }

    #[tokio::test]
    async fn test_double_in_rejected_and_ledger_unchanged() {
        let h = harness().await;
        h.punch(Direction::In).await.unwrap();

        h.clock.set(at(9, 5));
        let second = h.punch(Direction::In).await;
        assert!(matches!(
            second,
            Err(CoreError::Rejected(PunchRejection::WrongDirection))
        ));

        let punches = h
            .service
            .query_range(&h.student, &h.contract.id, at(0, 0), at(23, 0))
            .await
            .unwrap();
        assert_eq!(punches.len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_idempotent() {
        let h = harness().await;
        let far = GeoPoint::new(38.7300, -9.1393).unwrap();
        let request = h.request(Direction::In, far);

        let first = h.service.validate(&h.student, &request).await.unwrap();
        let second = h.service.validate(&h.student, &request).await.unwrap();
        assert_eq!(first, second);
        assert!(matches!(
            first.rejection(),
            Some(PunchRejection::OutsideGeofence { .. })
        ));

        let rejected = h.service.punch(&h.student, request).await;
        assert!(matches!(rejected, Err(CoreError::Rejected(_))));
        let punches = h
            .service
            .query_range(&h.student, &h.contract.id, at(0, 0), at(23, 0))
            .await
            .unwrap();
        assert!(punches.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_double_submission() {
        let h = harness().await;

        let (a, b) = tokio::join!(h.punch(Direction::In), h.punch(Direction::In));
        let accepted = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, 1);
        assert!([&a, &b].iter().any(|r| matches!(
            r,
            Err(CoreError::Rejected(PunchRejection::WrongDirection))
        )));
    }

    #[tokio::test]
    async fn test_punch_sequence_alternates() {
        let h = harness().await;
        let mut minute = 0;
        for direction in [
            Direction::In,
            Direction::In,
            Direction::Out,
            Direction::Out,
            Direction::In,
            Direction::Out,
        ] {
            minute += 5;
            h.clock.set(at(9, minute));
            let _ = h.punch(direction).await;
        }

        let punches = h
            .service
            .query_range(&h.student, &h.contract.id, at(0, 0), at(23, 0))
            .await
            .unwrap();
        let directions: Vec<Direction> = punches.iter().map(|p| p.direction).collect();
        assert_eq!(
            directions,
            vec![Direction::In, Direction::Out, Direction::In, Direction::Out]
        );
    }

    #[tokio::test]
    async fn test_reported_time_before_last_punch() {
        let h = harness().await;
        h.clock.set(at(12, 0));
        h.punch(Direction::In).await.unwrap();

        let mut request = h.request(Direction::Out, nearby());
        request.reported_at = Some(at(11, 58));
        let result = h.service.punch(&h.student, request).await;
        assert!(matches!(
            result,
            Err(CoreError::Rejected(PunchRejection::NonMonotonicTime))
        ));
    }

    #[tokio::test]
    async fn test_reported_time_outside_skew_is_refused() {
        let h = harness().await;

        let mut future = h.request(Direction::In, nearby());
        future.reported_at = Some(Utc.with_ymd_and_hms(2025, 6, 30, 23, 0, 0).unwrap());
        let result = h.service.punch(&h.student, future).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));

        let mut backdated = h.request(Direction::In, nearby());
        backdated.reported_at = Some(at(6, 0));
        let result = h.service.punch(&h.student, backdated).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));

        // Nothing was stored, so an honest punch on the server clock goes through
        h.clock.set(at(17, 0));
        let accepted = h.punch(Direction::In).await.unwrap();
        assert_eq!(accepted.timestamp, at(17, 0));
    }

    #[tokio::test]
    async fn test_unauthorized_punches_do_not_grow_lock_map() {
        let h = harness().await;
        h.punch(Direction::In).await.unwrap();
        let tracked = h.service.locks.lock().unwrap().len();
        assert_eq!(tracked, 1);

        for _ in 0..50 {
            let request = PunchRequest {
                contract_id: ContractId::new(),
                ..h.request(Direction::In, nearby())
            };
            let result = h.service.punch(&h.student, request).await;
            assert!(matches!(
                result,
                Err(CoreError::Rejected(PunchRejection::Unauthorized))
            ));
        }

        let foreign = h.service.punch(&h.teacher, h.request(Direction::Out, nearby())).await;
        assert!(matches!(
            foreign,
            Err(CoreError::Rejected(PunchRejection::Unauthorized))
        ));

        assert_eq!(h.service.locks.lock().unwrap().len(), tracked);
    }

    #[tokio::test]
    async fn test_view_authorization() {
        let h = harness().await;
        h.punch(Direction::In).await.unwrap();

        let teacher_view = h
            .service
            .query_range(&h.teacher, &h.contract.id, at(0, 0), at(23, 0))
            .await
            .unwrap();
        assert_eq!(teacher_view.len(), 1);

        let coordinator = CallerContext::new(UserId::new(), Role::Coordinator);
        assert!(h
            .service
            .compute_worked_duration(&coordinator, &h.contract.id, at(0, 0), at(23, 0))
            .await
            .is_ok());

        let other_student = CallerContext::new(UserId::new(), Role::Student);
        let denied = h
            .service
            .query_range(&other_student, &h.contract.id, at(0, 0), at(23, 0))
            .await;
        assert!(matches!(denied, Err(CoreError::Forbidden(_))));

        let other_teacher = CallerContext::new(UserId::new(), Role::Teacher);
        let denied = h
            .service
            .compute_worked_duration(&other_teacher, &h.contract.id, at(0, 0), at(23, 0))
            .await;
        assert!(matches!(denied, Err(CoreError::Forbidden(_))));

        let missing = h
            .service
            .query_range(&coordinator, &ContractId::new(), at(0, 0), at(23, 0))
            .await;
        assert!(matches!(missing, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_check_location() {
        let h = harness().await;

        let inside = h
            .service
            .check_location(&h.student, &h.contract.id, nearby())
            .await
            .unwrap();
        assert!(inside.inside);
        assert!(inside.distance_m < 12.0);

        let far = GeoPoint::new(38.7300, -9.1393).unwrap();
        let outside = h
            .service
            .check_location(&h.student, &h.contract.id, far)
            .await
            .unwrap();
        assert!(!outside.inside);
        assert_eq!(outside.nearest_site, Some(h.contract.site_ids[0]));

        let denied = h
            .service
            .check_location(&h.teacher, &h.contract.id, nearby())
            .await;
        assert!(matches!(
            denied,
            Err(CoreError::Rejected(PunchRejection::Unauthorized))
        ));

        // Location checks never write
        let punches = h
            .service
            .query_range(&h.student, &h.contract.id, at(0, 0), at(23, 0))
            .await
            .unwrap();
        assert!(punches.is_empty());
    }

    #[tokio::test]
    async fn test_inactive_contract_blocks_location_check() {
        let h = harness().await;
        h.clock.set(Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap());

        let result = h
            .service
            .check_location(&h.student, &h.contract.id, nearby())
            .await;
        assert!(matches!(
            result,
            Err(CoreError::Rejected(PunchRejection::ContractInactive))
        ));
    }

    #[tokio::test]
    async fn test_punch_day_on_sled() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let h = harness_with(store).await;

        h.punch(Direction::In).await.unwrap();
        h.clock.set(at(9, 1));
        assert!(h.punch(Direction::In).await.is_err());
        h.clock.set(at(12, 30));
        h.punch(Direction::Out).await.unwrap();

        let history = h
            .service
            .compute_worked_duration(&h.teacher, &h.contract.id, at(0, 0), at(23, 0))
            .await
            .unwrap();
        assert_eq!(history.total_minutes, 210);
        assert_eq!(history.sessions.len(), 1);
    }
}
