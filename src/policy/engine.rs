//! Tightening Policy Engine
//!
//! Converts (model, evidence, options) into one decision per examined object.
//! Pure and deterministic: iteration follows model order, then snapshot order,
//! and rationale codes are recorded in the order the checks run.
//!
//! Missing evidence is never an error. It yields an `evidence-missing`
//! rationale and, where nothing else supports the action, no action.

use crate::models::{AttributeModel, EntityModel, Model, ReferentialAction, RelationshipModel};
use crate::policy::decisions::{
    ForeignKeyDecision, IndexCoordinate, NullabilityDecision, PolicyDecisionSet,
    PredicateTelemetry, UniqueIndexDecision,
};
use crate::policy::options::{TighteningMode, TighteningOptions};
use crate::policy::rationale;
use crate::snapshot::evidence::column_set_key;
use crate::snapshot::{ColumnCoordinate, ColumnProfile, EvidenceIndex, ProfileSnapshot};
use std::collections::HashSet;
use tracing::{debug, info};

/// Ordered, duplicate-free rationale list for one decision
#[derive(Debug, Default)]
struct Trace {
    codes: Vec<String>,
}

impl Trace {
    fn push(&mut self, code: &str) {
        if !self.codes.iter().any(|c| c == code) {
            self.codes.push(code.to_string());
        }
    }

    fn into_codes(mut self) -> Vec<String> {
        if self.codes.is_empty() {
            self.codes.push(rationale::NO_ACTION.to_string());
        }
        self.codes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Verdict {
    apply: bool,
    remediation: bool,
}

impl Verdict {
    const NONE: Verdict = Verdict { apply: false, remediation: false };
    const APPLY: Verdict = Verdict { apply: true, remediation: false };
    const REMEDIATE: Verdict = Verdict { apply: true, remediation: true };
}

/// What the profiler tells us about an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Evidence {
    /// Profiled and the data already satisfies the constraint
    Clean,
    /// Profiled and the data violates the constraint
    Violated,
    /// Not profiled
    Missing,
    /// Profiled, but the profiler flagged the object as not fully evidenced
    Untrusted,
}

impl Evidence {
    fn is_insufficient(self) -> bool {
        matches!(self, Evidence::Missing | Evidence::Untrusted)
    }
}

/// The tightening policy
pub struct TighteningPolicy;

impl TighteningPolicy {
    /// Decide every column, unique candidate and relationship of every
    /// included entity.
    pub fn decide(model: &Model, profile: &ProfileSnapshot, options: &TighteningOptions) -> PolicyDecisionSet {
        let evidence = EvidenceIndex::new(profile);
        let mut predicates = PredicateTelemetry::default();
        let mut nullability = Vec::new();
        let mut unique_indexes = Vec::new();
        let mut foreign_keys = Vec::new();

        let included = model
            .entities()
            .filter(|e| e.is_active && options.scope.includes(&e.module));

        for entity in included {
            for attribute in entity.attributes.iter().filter(|a| a.is_active) {
                nullability.push(Self::decide_column(entity, attribute, &evidence, options, &mut predicates));
            }

            unique_indexes.extend(Self::decide_unique_indexes(entity, &evidence, options, &mut predicates));

            for relationship in &entity.relationships {
                foreign_keys.push(Self::decide_foreign_key(
                    model,
                    entity,
                    relationship,
                    &evidence,
                    options,
                    &mut predicates,
                ));
            }
        }

        info!(
            "Tightening policy ({:?}): {} columns ({} tightened), {} unique candidates ({} enforced), {} relationships ({} created)",
            options.policy.mode,
            nullability.len(),
            nullability.iter().filter(|d| d.make_not_null).count(),
            unique_indexes.len(),
            unique_indexes.iter().filter(|d| d.enforce_unique).count(),
            foreign_keys.len(),
            foreign_keys.iter().filter(|d| d.create_constraint).count(),
        );

        PolicyDecisionSet {
            nullability,
            unique_indexes,
            foreign_keys,
            anomalies: profile.anomalies.clone(),
            predicates,
        }
    }

    // =========================================================================
    // NULLABILITY
    // =========================================================================

    fn decide_column(
        entity: &EntityModel,
        attribute: &AttributeModel,
        evidence: &EvidenceIndex<'_>,
        options: &TighteningOptions,
        predicates: &mut PredicateTelemetry,
    ) -> NullabilityDecision {
        let coordinate = ColumnCoordinate::new(&entity.schema, &entity.physical_name, &attribute.column_name);
        let mut trace = Trace::default();

        let decision = |coordinate, verdict: Verdict, trace: Trace| NullabilityDecision {
            module: entity.module.clone(),
            column: coordinate,
            make_not_null: verdict.apply,
            requires_remediation: verdict.remediation,
            rationales: trace.into_codes(),
        };

        if !options.nullability.enabled {
            trace.push(rationale::NULLABILITY_DISABLED);
            return decision(coordinate, Verdict::NONE, trace);
        }

        let profile = evidence.column(&coordinate);
        if profile.is_some_and(|p| p.is_computed) {
            predicates.record(rationale::COMPUTED_COLUMN);
            trace.push(rationale::COMPUTED_COLUMN);
            return decision(coordinate, Verdict::NONE, trace);
        }

        let is_primary_key = attribute.is_identifier || profile.is_some_and(|p| p.is_primary_key);
        let physical_not_null = profile.is_some_and(|p| !p.is_nullable_physical);
        let declared = attribute.is_mandatory;

        if is_primary_key {
            predicates.record(rationale::PRIMARY_KEY);
            trace.push(rationale::PRIMARY_KEY);
        }
        if physical_not_null {
            predicates.record(rationale::PHYSICAL_NOT_NULL);
            trace.push(rationale::PHYSICAL_NOT_NULL);
        }
        if declared {
            predicates.record(rationale::MODEL_DECLARED_MANDATORY);
            trace.push(rationale::MODEL_DECLARED_MANDATORY);
        }

        let nulls = Self::null_evidence(&coordinate, profile, evidence, &mut trace);
        let mode = options.policy.mode;

        let verdict = if is_primary_key || physical_not_null {
            Verdict::APPLY
        } else if declared {
            Self::declared_verdict(nulls, mode)
        } else {
            match nulls {
                Evidence::Clean if mode == TighteningMode::Cautious => {
                    trace.push(rationale::CAUTIOUS_MODE);
                    Verdict::NONE
                }
                Evidence::Clean => Verdict::APPLY,
                Evidence::Violated => {
                    let within_budget = profile.is_some_and(|p| Self::within_null_budget(p, options));
                    if mode == TighteningMode::Aggressive && within_budget {
                        trace.push(rationale::NULL_BUDGET_SATISFIED);
                        Verdict::REMEDIATE
                    } else {
                        Verdict::NONE
                    }
                }
                Evidence::Missing | Evidence::Untrusted => {
                    trace.push(rationale::INSUFFICIENT_EVIDENCE);
                    Verdict::NONE
                }
            }
        };

        let verdict = Self::finalize(verdict, physical_not_null, options, &mut trace);
        debug!("Column {}: not null = {} ({:?})", coordinate, verdict.apply, trace.codes);
        decision(coordinate, verdict, trace)
    }

    fn null_evidence(
        coordinate: &ColumnCoordinate,
        profile: Option<&ColumnProfile>,
        evidence: &EvidenceIndex<'_>,
        trace: &mut Trace,
    ) -> Evidence {
        if evidence.anomaly(coordinate).is_some() {
            trace.push(rationale::COVERAGE_ANOMALY);
            return Evidence::Untrusted;
        }
        match profile {
            None => {
                trace.push(rationale::EVIDENCE_MISSING);
                Evidence::Missing
            }
            Some(p) if p.null_count == 0 => {
                trace.push(rationale::ALL_VALUES_NON_NULL);
                Evidence::Clean
            }
            Some(_) => {
                trace.push(rationale::NULLS_OBSERVED);
                Evidence::Violated
            }
        }
    }

    fn within_null_budget(profile: &ColumnProfile, options: &TighteningOptions) -> bool {
        if profile.row_count == 0 {
            return false;
        }
        (profile.null_count as f64 / profile.row_count as f64) <= options.policy.null_budget
    }

    // =========================================================================
    // UNIQUENESS
    // =========================================================================

    fn decide_unique_indexes(
        entity: &EntityModel,
        evidence: &EvidenceIndex<'_>,
        options: &TighteningOptions,
        predicates: &mut PredicateTelemetry,
    ) -> Vec<UniqueIndexDecision> {
        struct Candidate {
            name: Option<String>,
            columns: Vec<String>,
            declared: bool,
        }

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for index in entity.indexes.iter().filter(|i| i.is_unique && !i.is_primary) {
            if seen.insert(column_set_key(&entity.schema, &entity.physical_name, &index.columns)) {
                candidates.push(Candidate {
                    name: Some(index.name.clone()),
                    columns: index.columns.clone(),
                    declared: true,
                });
            }
        }
        for profiled in evidence.unique_candidates_for(&entity.schema, &entity.physical_name) {
            let columns = vec![profiled.column.clone()];
            if seen.insert(column_set_key(&entity.schema, &entity.physical_name, &columns)) {
                candidates.push(Candidate { name: None, columns, declared: false });
            }
        }
        for profiled in evidence.composite_candidates_for(&entity.schema, &entity.physical_name) {
            if seen.insert(column_set_key(&entity.schema, &entity.physical_name, &profiled.columns)) {
                candidates.push(Candidate {
                    name: None,
                    columns: profiled.columns.clone(),
                    declared: false,
                });
            }
        }

        candidates
            .into_iter()
            .filter(|candidate| {
                let empty = candidate.columns.is_empty();
                if empty {
                    debug!(
                        "Skipping unique candidate {} on {}.{}: no columns",
                        candidate.name.as_deref().unwrap_or("(profiled)"),
                        entity.schema,
                        entity.physical_name
                    );
                }
                !empty
            })
            .map(|candidate| {
                let index_name = candidate.name.unwrap_or_else(|| {
                    format!("UIX_{}_{}", entity.physical_name, candidate.columns.join("_")).to_uppercase()
                });
                Self::decide_unique(entity, index_name, candidate.columns, candidate.declared, evidence, options, predicates)
            })
            .collect()
    }

    fn decide_unique(
        entity: &EntityModel,
        index_name: String,
        columns: Vec<String>,
        declared: bool,
        evidence: &EvidenceIndex<'_>,
        options: &TighteningOptions,
        predicates: &mut PredicateTelemetry,
    ) -> UniqueIndexDecision {
        let mut trace = Trace::default();
        let composite = columns.len() > 1;
        let coordinates: Vec<ColumnCoordinate> = columns
            .iter()
            .map(|c| ColumnCoordinate::new(&entity.schema, &entity.physical_name, c))
            .collect();

        let enabled = if composite {
            options.uniqueness.enforce_multi_column
        } else {
            options.uniqueness.enforce_single_column
        };

        let verdict = if !enabled {
            trace.push(rationale::UNIQUENESS_DISABLED);
            Verdict::NONE
        } else {
            if declared {
                predicates.record(rationale::MODEL_DECLARED_UNIQUE);
                trace.push(rationale::MODEL_DECLARED_UNIQUE);
            }

            let physical_unique = !composite
                && coordinates
                    .first()
                    .and_then(|c| evidence.column(c))
                    .is_some_and(|p| p.is_unique_key || p.is_primary_key);

            let duplicates = if coordinates.iter().any(|c| evidence.anomaly(c).is_some()) {
                trace.push(rationale::COVERAGE_ANOMALY);
                Evidence::Untrusted
            } else {
                let has_duplicate = if composite {
                    evidence
                        .composite(&entity.schema, &entity.physical_name, &columns)
                        .map(|c| c.has_duplicate)
                } else {
                    coordinates.first().and_then(|c| evidence.unique(c)).map(|c| c.has_duplicate)
                };
                match has_duplicate {
                    Some(false) => {
                        trace.push(rationale::NO_DUPLICATE_VALUES);
                        Evidence::Clean
                    }
                    Some(true) => {
                        trace.push(rationale::DUPLICATE_VALUES_OBSERVED);
                        Evidence::Violated
                    }
                    None => {
                        trace.push(rationale::EVIDENCE_MISSING);
                        Evidence::Missing
                    }
                }
            };

            let mode = options.policy.mode;
            if physical_unique {
                predicates.record(rationale::PHYSICAL_UNIQUE);
                trace.push(rationale::PHYSICAL_UNIQUE);
                Verdict::APPLY
            } else if declared {
                Self::declared_verdict(duplicates, mode)
            } else {
                match duplicates {
                    Evidence::Clean if mode == TighteningMode::Cautious => {
                        trace.push(rationale::CAUTIOUS_MODE);
                        Verdict::NONE
                    }
                    Evidence::Clean => {
                        trace.push(rationale::PROFILE_DISCOVERED_UNIQUE);
                        Verdict::APPLY
                    }
                    Evidence::Violated => Verdict::NONE,
                    Evidence::Missing | Evidence::Untrusted => {
                        trace.push(rationale::INSUFFICIENT_EVIDENCE);
                        Verdict::NONE
                    }
                }
            }
        };

        let already_enforced = trace.codes.iter().any(|c| c == rationale::PHYSICAL_UNIQUE);
        let verdict = Self::finalize(verdict, already_enforced, options, &mut trace);

        UniqueIndexDecision {
            module: entity.module.clone(),
            index: IndexCoordinate {
                schema: entity.schema.clone(),
                table: entity.physical_name.clone(),
                index: index_name,
            },
            columns,
            enforce_unique: verdict.apply,
            requires_remediation: verdict.remediation,
            rationales: trace.into_codes(),
        }
    }

    // =========================================================================
    // FOREIGN KEYS
    // =========================================================================

    fn decide_foreign_key(
        model: &Model,
        entity: &EntityModel,
        relationship: &RelationshipModel,
        evidence: &EvidenceIndex<'_>,
        options: &TighteningOptions,
        predicates: &mut PredicateTelemetry,
    ) -> ForeignKeyDecision {
        let mut trace = Trace::default();
        let column_name = entity
            .attribute(&relationship.via_attribute)
            .map(|a| a.column_name.clone())
            .unwrap_or_else(|| relationship.via_attribute.clone());
        let coordinate = ColumnCoordinate::new(&entity.schema, &entity.physical_name, column_name);

        let target = model.find_entity(&relationship.target_entity);
        let referenced_table = match target {
            Some(t) => t.qualified_name(),
            None => format!("{}.{}", entity.schema, relationship.target_physical_name),
        };
        let declared = relationship.has_db_constraint;

        if declared {
            predicates.record(rationale::MODEL_DECLARED_RELATIONSHIP);
            trace.push(rationale::MODEL_DECLARED_RELATIONSHIP);
        }

        let mut already_enforced = false;
        let verdict = if relationship.is_constraint_backed() {
            predicates.record(rationale::DB_CONSTRAINT_PRESENT);
            trace.push(rationale::DB_CONSTRAINT_PRESENT);
            already_enforced = true;
            Verdict::APPLY
        } else if !options.foreign_keys.enable_creation {
            trace.push(rationale::FOREIGN_KEY_CREATION_DISABLED);
            Verdict::NONE
        } else if relationship.delete_rule == ReferentialAction::Ignore {
            predicates.record(rationale::DELETE_RULE_IGNORE);
            trace.push(rationale::DELETE_RULE_IGNORE);
            Verdict::NONE
        } else if let Some(target) = target {
            let cross_schema = !target.schema.eq_ignore_ascii_case(&entity.schema);
            if cross_schema {
                predicates.record(rationale::CROSS_SCHEMA_REFERENCE);
                trace.push(rationale::CROSS_SCHEMA_REFERENCE);
            }
            if cross_schema && !options.foreign_keys.allow_cross_schema {
                trace.push(rationale::CROSS_SCHEMA_BLOCKED);
                Verdict::NONE
            } else {
                let orphans = Self::orphan_evidence(&coordinate, evidence, &mut trace);
                let mode = options.policy.mode;
                if declared {
                    Self::declared_verdict(orphans, mode)
                } else {
                    match orphans {
                        Evidence::Clean if mode == TighteningMode::Cautious => {
                            trace.push(rationale::CAUTIOUS_MODE);
                            Verdict::NONE
                        }
                        Evidence::Clean => Verdict::APPLY,
                        Evidence::Violated => Verdict::NONE,
                        Evidence::Missing | Evidence::Untrusted => {
                            trace.push(rationale::INSUFFICIENT_EVIDENCE);
                            Verdict::NONE
                        }
                    }
                }
            }
        } else {
            trace.push(rationale::TARGET_ENTITY_MISSING);
            Verdict::NONE
        };

        let verdict = Self::finalize(verdict, already_enforced, options, &mut trace);

        ForeignKeyDecision {
            module: entity.module.clone(),
            column: coordinate,
            referenced_table,
            create_constraint: verdict.apply,
            requires_remediation: verdict.remediation,
            rationales: trace.into_codes(),
        }
    }

    fn orphan_evidence(coordinate: &ColumnCoordinate, evidence: &EvidenceIndex<'_>, trace: &mut Trace) -> Evidence {
        if evidence.anomaly(coordinate).is_some() {
            trace.push(rationale::COVERAGE_ANOMALY);
            return Evidence::Untrusted;
        }
        match evidence.foreign_key(coordinate) {
            None => {
                trace.push(rationale::EVIDENCE_MISSING);
                Evidence::Missing
            }
            Some(reality) if reality.has_orphan => {
                trace.push(rationale::ORPHANS_OBSERVED);
                Evidence::Violated
            }
            Some(_) => {
                trace.push(rationale::NO_ORPHANS_OBSERVED);
                Evidence::Clean
            }
        }
    }

    // =========================================================================
    // SHARED
    // =========================================================================

    /// The model declares the constraint; evidence decides whether it can be
    /// applied blindly.
    fn declared_verdict(evidence: Evidence, mode: TighteningMode) -> Verdict {
        match evidence {
            Evidence::Clean => Verdict::APPLY,
            Evidence::Violated => Verdict::REMEDIATE,
            _ if evidence.is_insufficient() && mode == TighteningMode::Aggressive => Verdict::APPLY,
            _ => Verdict::REMEDIATE,
        }
    }

    /// Apply remediation options and record the remediation rationale.
    fn finalize(
        mut verdict: Verdict,
        already_enforced: bool,
        options: &TighteningOptions,
        trace: &mut Trace,
    ) -> Verdict {
        if verdict.apply && !verdict.remediation && !already_enforced && options.remediation.force {
            verdict.remediation = true;
            trace.push(rationale::REMEDIATION_FORCED);
        }
        if verdict.apply && verdict.remediation {
            trace.push(rationale::REMEDIATE_BEFORE_TIGHTEN);
            if !options.remediation.report_enforce_intent {
                verdict.apply = false;
                trace.push(rationale::ENFORCEMENT_DEFERRED);
            }
        }
        verdict
    }
}
