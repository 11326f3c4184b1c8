//! Punch Validator
//!
//! Decides whether a clock-in/out request is accepted. Rules are checked in a
//! fixed order and the first failure wins:
//!
//! 1. the contract exists and belongs to the caller (`Unauthorized`)
//! 2. the contract is active at the reported time (`ContractInactive`)
//! 3. the reported time is not before the last accepted punch (`NonMonotonicTime`)
//! 4. the direction alternates, starting with IN (`WrongDirection`)
//! 5. the location lies inside at least one site geofence (`OutsideGeofence`)
//!
//! Validation never mutates the ledger.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult, PunchRejection};
use crate::geo::GeoPoint;
use crate::storage::{AttendanceLedger, ContractRegistry};
use crate::types::{
    CallerContext, Capability, Contract, Direction, LedgerKey, Punch, PunchOutcome, PunchRequest,
    Site, SiteId,
};

/// Nearest site to a location and whether it is inside some geofence
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeofenceMatch {
    /// Closest site whose geofence contains the point, if any
    pub matched_site: Option<SiteId>,
    /// Distance to `matched_site`, or to the nearest site when outside
    pub distance_m: f64,
    /// Nearest site overall
    pub nearest_site: Option<SiteId>,
}

impl GeofenceMatch {
    pub fn inside(&self) -> bool {
        self.matched_site.is_some()
    }
}

/// Match `location` against every site; boundary inclusive
pub fn match_sites(sites: &[Site], location: &GeoPoint) -> GeofenceMatch {
    let mut nearest: Option<(SiteId, f64)> = None;
    let mut matched: Option<(SiteId, f64)> = None;

    for site in sites {
        let distance = site.center.distance_m(location);
        if nearest.map_or(true, |(_, d)| distance < d) {
            nearest = Some((site.id, distance));
        }
        if distance <= site.radius_m && matched.map_or(true, |(_, d)| distance < d) {
            matched = Some((site.id, distance));
        }
    }

    match matched {
        Some((site_id, distance_m)) => GeofenceMatch {
            matched_site: Some(site_id),
            distance_m,
            nearest_site: nearest.map(|(id, _)| id),
        },
        None => GeofenceMatch {
            matched_site: None,
            distance_m: nearest.map(|(_, d)| d).unwrap_or(f64::INFINITY),
            nearest_site: nearest.map(|(id, _)| id),
        },
    }
}

/// Rule 1: the caller is the student bound to the contract
pub(crate) fn check_ownership<'c>(
    ctx: &CallerContext,
    contract: Option<&'c Contract>,
) -> Result<&'c Contract, PunchRejection> {
    match contract {
        Some(c) if ctx.can(Capability::ClockPunch) && c.student_id == ctx.user_id => Ok(c),
        _ => Err(PunchRejection::Unauthorized),
    }
}

/// Inputs of a single validation, as loaded from the registry and ledger
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub ctx: &'a CallerContext,
    pub contract: Option<&'a Contract>,
    pub sites: &'a [Site],
    pub last_punch: Option<&'a Punch>,
    pub direction: Direction,
    pub location: GeoPoint,
    pub reported_at: DateTime<Utc>,
}

/// Apply the validation rules to a loaded snapshot
pub fn evaluate(input: &ValidationInput<'_>) -> PunchOutcome {
    let contract = match check_ownership(input.ctx, input.contract) {
        Ok(c) => c,
        Err(reason) => return PunchOutcome::Rejected(reason),
    };

    if !contract.is_active_at(input.reported_at) {
        return PunchOutcome::Rejected(PunchRejection::ContractInactive);
    }

    if let Some(last) = input.last_punch {
        if input.reported_at < last.timestamp {
            return PunchOutcome::Rejected(PunchRejection::NonMonotonicTime);
        }
    }

    if input.direction != Direction::expected_after(input.last_punch) {
        return PunchOutcome::Rejected(PunchRejection::WrongDirection);
    }

    let geofence = match_sites(input.sites, &input.location);
    match geofence.matched_site {
        Some(site_id) => PunchOutcome::Accepted {
            site_id,
            distance_m: geofence.distance_m,
        },
        None => PunchOutcome::Rejected(PunchRejection::OutsideGeofence {
            distance_m: geofence.distance_m,
        }),
    }
}

/// Loads the validation snapshot from storage and evaluates it
pub struct PunchValidator {
    registry: Arc<dyn ContractRegistry>,
    ledger: Arc<dyn AttendanceLedger>,
    clock: Arc<dyn Clock>,
    max_clock_skew: Duration,
}

impl PunchValidator {
    pub fn new(
        registry: Arc<dyn ContractRegistry>,
        ledger: Arc<dyn AttendanceLedger>,
        clock: Arc<dyn Clock>,
        max_clock_skew: Duration,
    ) -> Self {
        Self {
            registry,
            ledger,
            clock,
            max_clock_skew,
        }
    }

    /// Reported time, defaulting to now.
    ///
    /// A reported time further than `max_clock_skew` from the server clock in
    /// either direction is a `Validation` error.
    pub fn effective_time(&self, request: &PunchRequest) -> CoreResult<DateTime<Utc>> {
        let now = self.clock.now();
        let Some(reported) = request.reported_at else {
            return Ok(now);
        };

        let skew = reported.signed_duration_since(now);
        if skew > self.max_clock_skew || -skew > self.max_clock_skew {
            return Err(CoreError::validation(format!(
                "reported time {} is more than {}s away from server time {}",
                reported,
                self.max_clock_skew.num_seconds(),
                now
            )));
        }
        Ok(reported)
    }

    /// Validate a request against current storage state.
    ///
    /// Returns the outcome together with the reported time used. Storage
    /// failures and out-of-tolerance reported times are errors; rule
    /// failures are `PunchOutcome::Rejected`.
    pub async fn validate(
        &self,
        ctx: &CallerContext,
        request: &PunchRequest,
    ) -> CoreResult<(PunchOutcome, DateTime<Utc>)> {
        let reported_at = self.effective_time(request)?;
        let contract = self.registry.get_contract(&request.contract_id).await?;

        // Skip further loads when rule 1 fails anyway
        let (sites, last_punch) = match check_ownership(ctx, contract.as_ref()) {
            Ok(c) => {
                let sites = self.registry.get_sites(c).await?;
                let last = self
                    .ledger
                    .last_punch(&LedgerKey::new(ctx.user_id, c.id))
                    .await?;
                (sites, last)
            }
            Err(_) => (Vec::new(), None),
        };

        let outcome = evaluate(&ValidationInput {
            ctx,
            contract: contract.as_ref(),
            sites: &sites,
            last_punch: last_punch.as_ref(),
            direction: request.direction,
            location: request.location,
            reported_at,
        });

        if let PunchOutcome::Rejected(reason) = outcome {
            tracing::debug!(
                user_id = %ctx.user_id,
                contract_id = %request.contract_id,
                direction = %request.direction,
                code = reason.code(),
                "Punch rejected"
            );
        }

        Ok((outcome, reported_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContractId, PunchId, Role, UserId};
    use chrono::{NaiveDate, TimeZone};

    fn site(lat: f64, lon: f64, radius_m: f64) -> Site {
        Site {
            id: SiteId::new(),
            name: "Office".to_string(),
            center: GeoPoint::new(lat, lon).unwrap(),
            radius_m,
            address: None,
            created_at: Utc::now(),
        }
    }

    fn contract_for(student: UserId, sites: &[Site]) -> Contract {
        Contract {
            id: ContractId::new(),
            student_id: student,
            teacher_id: UserId::new(),
            site_ids: sites.iter().map(|s| s.id).collect(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            active: true,
            created_at: Utc::now(),
        }
    }

    fn at(month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, month, day, hour, 0, 0).unwrap()
    }

    fn last(contract: &Contract, direction: Direction, timestamp: DateTime<Utc>) -> Punch {
        Punch {
            id: PunchId::new(),
            user_id: contract.student_id,
            contract_id: contract.id,
            direction,
            timestamp,
            location: GeoPoint::new(38.7223, -9.1393).unwrap(),
            site_id: contract.site_ids[0],
            distance_m: 0.0,
        }
    }

    struct Fixture {
        ctx: CallerContext,
        sites: Vec<Site>,
        contract: Contract,
    }

    fn fixture() -> Fixture {
        let student = UserId::new();
        let sites = vec![site(38.7223, -9.1393, 100.0)];
        let contract = contract_for(student, &sites);
        Fixture {
            ctx: CallerContext::new(student, Role::Student),
            sites,
            contract,
        }
    }

    fn input<'a>(
        f: &'a Fixture,
        last_punch: Option<&'a Punch>,
        direction: Direction,
        location: GeoPoint,
        reported_at: DateTime<Utc>,
    ) -> ValidationInput<'a> {
        ValidationInput {
            ctx: &f.ctx,
            contract: Some(&f.contract),
            sites: &f.sites,
            last_punch,
            direction,
            location,
            reported_at,
        }
    }

    #[test]
    fn test_accept_inside_geofence() {
        let f = fixture();
        let near = GeoPoint::new(38.7224, -9.1393).unwrap();
        let outcome = evaluate(&input(&f, None, Direction::In, near, at(3, 10, 9)));
        match outcome {
            PunchOutcome::Accepted {
                site_id,
                distance_m,
            } => {
                assert_eq!(site_id, f.sites[0].id);
                assert!(distance_m < 12.0);
            }
            other => panic!("expected accepted, got {:?}", other),
        }
    }

    #[test]
    fn test_reject_outside_geofence() {
        let f = fixture();
        let far = GeoPoint::new(38.7300, -9.1393).unwrap();
        let outcome = evaluate(&input(&f, None, Direction::In, far, at(3, 10, 9)));
        match outcome.rejection() {
            Some(PunchRejection::OutsideGeofence { distance_m }) => {
                assert!((distance_m - 856.0).abs() < 10.0)
            }
            other => panic!("expected outside geofence, got {:?}", other),
        }
    }

    #[test]
    fn test_reject_foreign_contract() {
        let f = fixture();
        let intruder = CallerContext::new(UserId::new(), Role::Student);
        let outcome = evaluate(&ValidationInput {
            ctx: &intruder,
            ..input(&f, None, Direction::In, f.sites[0].center, at(3, 10, 9))
        });
        assert_eq!(outcome.rejection(), Some(PunchRejection::Unauthorized));
    }

    #[test]
    fn test_reject_missing_contract() {
        let f = fixture();
        let outcome = evaluate(&ValidationInput {
            contract: None,
            ..input(&f, None, Direction::In, f.sites[0].center, at(3, 10, 9))
        });
        assert_eq!(outcome.rejection(), Some(PunchRejection::Unauthorized));
    }

    #[test]
    fn test_reject_non_student_role() {
        let f = fixture();
        let as_teacher = CallerContext::new(f.ctx.user_id, Role::Teacher);
        let outcome = evaluate(&ValidationInput {
            ctx: &as_teacher,
            ..input(&f, None, Direction::In, f.sites[0].center, at(3, 10, 9))
        });
        assert_eq!(outcome.rejection(), Some(PunchRejection::Unauthorized));
    }

    #[test]
    fn test_reject_after_validity_period() {
        let f = fixture();
        let outcome = evaluate(&input(&f, None, Direction::In, f.sites[0].center, at(7, 1, 9)));
        assert_eq!(outcome.rejection(), Some(PunchRejection::ContractInactive));
    }

    #[test]
    fn test_reject_time_going_backwards() {
        let f = fixture();
        let prev = last(&f.contract, Direction::In, at(3, 10, 12));
        let outcome = evaluate(&input(
            &f,
            Some(&prev),
            Direction::Out,
            f.sites[0].center,
            at(3, 10, 11),
        ));
        assert_eq!(outcome.rejection(), Some(PunchRejection::NonMonotonicTime));
    }

    #[test]
    fn test_equal_timestamp_is_monotonic() {
        let f = fixture();
        let prev = last(&f.contract, Direction::In, at(3, 10, 12));
        let outcome = evaluate(&input(
            &f,
            Some(&prev),
            Direction::Out,
            f.sites[0].center,
            at(3, 10, 12),
        ));
        assert!(outcome.is_accepted());
    }

    #[test]
    fn test_direction_rules() {
        let f = fixture();
        let center = f.sites[0].center;

        let first_out = evaluate(&input(&f, None, Direction::Out, center, at(3, 10, 9)));
        assert_eq!(first_out.rejection(), Some(PunchRejection::WrongDirection));

        let prev = last(&f.contract, Direction::In, at(3, 10, 9));
        let double_in = evaluate(&input(&f, Some(&prev), Direction::In, center, at(3, 10, 10)));
        assert_eq!(double_in.rejection(), Some(PunchRejection::WrongDirection));
    }

    #[test]
    fn test_rule_order_first_failure_wins() {
        let f = fixture();
        let far = GeoPoint::new(10.0, 10.0).unwrap();
        let prev = last(&f.contract, Direction::In, at(3, 10, 12));
        // Inactive, backwards, wrong direction and outside: inactive is reported
        let outcome = evaluate(&input(&f, Some(&prev), Direction::In, far, at(7, 1, 9)));
        assert_eq!(outcome.rejection(), Some(PunchRejection::ContractInactive));
    }

    #[test]
    fn test_boundary_is_inside() {
        let center = GeoPoint::new(38.7223, -9.1393).unwrap();
        let edge = GeoPoint::new(38.7230, -9.1393).unwrap();
        let s = site(center.latitude, center.longitude, center.distance_m(&edge));
        let m = match_sites(std::slice::from_ref(&s), &edge);
        assert!(m.inside());
    }

    #[test]
    fn test_nearest_containing_site_wins() {
        let wide = site(38.7223, -9.1393, 2_000.0);
        let close = site(38.7300, -9.1393, 100.0);
        let location = GeoPoint::new(38.7301, -9.1393).unwrap();
        let m = match_sites(&[wide.clone(), close.clone()], &location);
        assert_eq!(m.matched_site, Some(close.id));
        assert_eq!(m.nearest_site, Some(close.id));
    }

    #[test]
    fn test_reported_time_bounded_by_clock_skew() {
        use crate::clock::ManualClock;
        use crate::storage::MemoryStore;

        let now = at(3, 10, 9);
        let store = Arc::new(MemoryStore::new());
        let validator = PunchValidator::new(
            store.clone(),
            store,
            Arc::new(ManualClock::new(now)),
            Duration::minutes(5),
        );
        let request = |reported_at: Option<DateTime<Utc>>| PunchRequest {
            contract_id: ContractId::new(),
            direction: Direction::In,
            location: GeoPoint::new(38.7223, -9.1393).unwrap(),
            reported_at,
        };

        assert_eq!(validator.effective_time(&request(None)).unwrap(), now);
        let slightly_late = now + Duration::minutes(5);
        assert_eq!(
            validator.effective_time(&request(Some(slightly_late))).unwrap(),
            slightly_late
        );
        let slightly_early = now - Duration::minutes(5);
        assert_eq!(
            validator.effective_time(&request(Some(slightly_early))).unwrap(),
            slightly_early
        );

        let future = now + Duration::days(100);
        assert!(matches!(
            validator.effective_time(&request(Some(future))),
            Err(CoreError::Validation(_))
        ));
        let backdated = now - Duration::hours(3);
        assert!(matches!(
            validator.effective_time(&request(Some(backdated))),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_no_sites_is_outside() {
        let m = match_sites(&[], &GeoPoint::new(0.0, 0.0).unwrap());
        assert!(!m.inside());
        assert!(m.nearest_site.is_none());
    }
}
