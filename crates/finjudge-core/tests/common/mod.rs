//! Shared show fixture for finjudge-core integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use finjudge_core::{Competition, CriteriaErrorInput, CriterionSpec, JudgingConfig};
use finjudge_state::fakes::MemoryCompetitionStore;
use finjudge_state::{
    CategoryId, CategoryRecord, CompetitionStore, CriterionId, EntryId, EntryRecord,
    RefereeAssignment, RefereeId, RegistrationRoundRecord, RoundId, RoundRecord, RoundType,
    Severity, TankId, TankRecord,
};

/// A category with rounds Preliminary 1, Evaluation 1 and 2, Final 1, three
/// tanks and Body/Pattern criteria (0.5 each) for the weighted round types.
pub struct Show<S = MemoryCompetitionStore> {
    pub engine: Competition<S>,
    pub category: CategoryId,
    pub prelim: RoundId,
    pub eval1: RoundId,
    pub eval2: RoundId,
    pub final1: RoundId,
    /// Exclusive tank
    pub solo: TankId,
    /// Capacity 2
    pub pair: TankId,
    /// Unbounded
    pub pond: TankId,
}

impl<S: CompetitionStore> Show<S> {
    pub fn store(&self) -> &Arc<S> {
        self.engine.store()
    }

    pub fn body(&self, round_type: RoundType) -> CriterionId {
        CriterionId::from(format!("{}-body", round_type))
    }

    pub fn pattern(&self, round_type: RoundType) -> CriterionId {
        CriterionId::from(format!("{}-pattern", round_type))
    }
}

pub async fn show(config: JudgingConfig, requires_tanks: bool) -> Show {
    show_on(Arc::new(MemoryCompetitionStore::new()), config, requires_tanks).await
}

pub async fn show_on<S: CompetitionStore>(
    store: Arc<S>,
    config: JudgingConfig,
    requires_tanks: bool,
) -> Show<S> {
    let category = CategoryId::from("showa-sansai");
    store
        .put_category(CategoryRecord {
            category_id: category.clone(),
            name: "Showa Sansai".to_string(),
            requires_tanks,
        })
        .await
        .unwrap();

    let mut ids = Vec::new();
    for (round_type, order, name) in [
        (RoundType::Preliminary, 1, "Preliminary"),
        (RoundType::Evaluation, 1, "Evaluation A"),
        (RoundType::Evaluation, 2, "Evaluation B"),
        (RoundType::Final, 1, "Final"),
    ] {
        let round = RoundRecord::new(category.clone(), round_type, order, name);
        ids.push(round.round_id.clone());
        store.put_round(round).await.unwrap();
    }

    for (id, capacity, exclusive) in [
        ("solo", None, true),
        ("pair", Some(2), false),
        ("pond", None, false),
    ] {
        store
            .put_tank(TankRecord {
                tank_id: TankId::from(id),
                category_id: category.clone(),
                label: id.to_uppercase(),
                capacity,
                exclusive,
            })
            .await
            .unwrap();
    }

    let engine = Competition::new(store, config).unwrap();
    for round_type in [RoundType::Evaluation, RoundType::Final] {
        engine
            .catalog
            .define_criteria(
                &category,
                round_type,
                vec![
                    CriterionSpec {
                        criterion_id: Some(CriterionId::from(format!("{round_type}-body"))),
                        name: "Body".to_string(),
                        weight: 0.5,
                    },
                    CriterionSpec {
                        criterion_id: Some(CriterionId::from(format!("{round_type}-pattern"))),
                        name: "Pattern".to_string(),
                        weight: 0.5,
                    },
                ],
            )
            .await
            .unwrap();
    }

    Show {
        engine,
        category,
        prelim: ids[0].clone(),
        eval1: ids[1].clone(),
        eval2: ids[2].clone(),
        final1: ids[3].clone(),
        solo: TankId::from("solo"),
        pair: TankId::from("pair"),
        pond: TankId::from("pond"),
    }
}

/// Register new entries and place them in `round`.
pub async fn enter<S: CompetitionStore>(
    show: &Show<S>,
    round: &RoundId,
    regnos: &[&str],
) -> Vec<RegistrationRoundRecord> {
    let mut rows = Vec::new();
    for regno in regnos {
        let entry = EntryRecord {
            entry_id: EntryId::new(),
            category_id: show.category.clone(),
            registration_number: regno.to_string(),
            name: format!("Koi {regno}"),
        };
        show.store().put_entry(entry.clone()).await.unwrap();
        rows.push(
            show.store()
                .create_registration_round(round, &entry.entry_id)
                .await
                .unwrap(),
        );
    }
    rows
}

/// Put every row in the unbounded tank and publish the round.
pub async fn publish<S: CompetitionStore>(
    show: &Show<S>,
    round: &RoundId,
    rows: &[RegistrationRoundRecord],
) {
    for row in rows {
        show.engine
            .tanks
            .assign_tank(&row.registration_round_id, &show.pond)
            .await
            .unwrap();
    }
    show.engine.progression.publish_round(round).await.unwrap();
}

pub async fn roster<S: CompetitionStore>(
    show: &Show<S>,
    round: &RoundId,
    referees: &[(&str, &str)],
) {
    for (referee, role) in referees {
        show.store()
            .assign_referee(RefereeAssignment {
                round_id: round.clone(),
                referee_id: RefereeId::from(*referee),
                role: role.to_string(),
            })
            .await
            .unwrap();
    }
}

pub fn deduction(criterion: CriterionId, severity: Severity, percentage: f64) -> CriteriaErrorInput {
    CriteriaErrorInput {
        criterion_id: criterion,
        error_type_id: None,
        severity,
        percentage,
    }
}

pub fn referee(id: &str) -> RefereeId {
    RefereeId::from(id)
}
